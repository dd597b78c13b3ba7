//! TCP listener for the inbound mail feed.
//!
//! The feed protocol is as simple as it gets: a peer connects, sends one
//! whole mail, and closes its side. Nothing is ever written back.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    net::{TcpListener, TcpStream},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use super::{
    notification::NotificationKind,
    parser::{MailParser, MalformedNotification},
};
use crate::{
    base::types::{Res, Void},
    service::sink::EventSink,
};

// Errors.

/// Reasons a single connection was dropped without an announcement.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("failed to read payload: {0}")]
    Read(#[from] std::io::Error),
    #[error("peer did not close the connection within {0:?}")]
    TimedOut(Duration),
    #[error("payload exceeds {0} bytes")]
    TooLarge(u64),
    #[error("payload is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),
    #[error("malformed notification: {0}")]
    Malformed(#[from] MalformedNotification),
}

// Types.

/// What happened to the payload of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A notification was handed to the sink.
    Published(NotificationKind),
    /// The payload was read, but there was nothing to announce.
    Ignored,
    /// Shutdown was requested before the peer finished sending.
    Cancelled,
}

/// Default cap on the size of a single mail.
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Pause after a failed accept. A persistent failure (e.g. out of file descriptors) must not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bounds applied to every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// How long a peer may take to send its mail and close; `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Largest accepted mail, in bytes.
    pub max_payload_bytes: u64,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            read_timeout: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Accepts mail feed connections and announces what they carry.
pub struct MailListener {
    listener: TcpListener,
    parser: Arc<MailParser>,
    sink: EventSink,
    limits: ConnectionLimits,
}

impl MailListener {
    /// Binds the listener; failing to bind is fatal for the caller.
    #[instrument(name = "MailListener::bind", skip(parser, sink))]
    pub async fn bind(addr: &str, parser: Arc<MailParser>, sink: EventSink, limits: ConnectionLimits) -> Res<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind mail listener to {}: {}", addr, e))?;

        info!("Mail listener bound to {}", listener.local_addr()?);

        Ok(Self {
            listener,
            parser,
            sink,
            limits,
        })
    }

    pub fn local_addr(&self) -> Res<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` is cancelled, then waits for the
    /// in-flight connections to wind down.
    pub async fn serve(self, shutdown: CancellationToken) -> Void {
        let tracker = TaskTracker::new();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted mail feed connection from {}", peer);
                    handle_connection(&tracker, stream, peer, self.parser.clone(), self.sink.clone(), self.limits, shutdown.clone());
                }
                Err(e) => {
                    warn!("Failed to accept mail feed connection: {}", e);

                    if back_off_after_accept_error(&shutdown).await {
                        break;
                    }
                }
            }
        }

        info!("Mail listener shutting down, waiting for {} connection(s) ...", tracker.len());

        tracker.close();
        tracker.wait().await;

        Ok(())
    }
}

/// Sleeps for [`ACCEPT_ERROR_BACKOFF`], returning `true` if shutdown was requested meanwhile.
async fn back_off_after_accept_error(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => false,
    }
}

/// Handles a connection on its own task, logging whatever goes wrong.
fn handle_connection(
    tracker: &TaskTracker,
    stream: TcpStream,
    peer: SocketAddr,
    parser: Arc<MailParser>,
    sink: EventSink,
    limits: ConnectionLimits,
    shutdown: CancellationToken,
) {
    let span = info_span!("mail_connection", %peer);

    tracker.spawn(
        async move {
            // Process the connection.
            let result = process_connection(stream, &parser, &sink, limits, &shutdown).await;

            // Log the outcome.
            match result {
                Ok(Delivery::Published(kind)) => info!("Announced {} bug notification.", kind),
                Ok(Delivery::Ignored) => debug!("Nothing to announce."),
                Ok(Delivery::Cancelled) => debug!("Connection abandoned during shutdown."),
                Err(ConnectionError::Malformed(err)) => warn!("Dropping mail: {}", err),
                Err(err) => error!("Error while handling: {}", err),
            }
        }
        .instrument(span),
    );
}

/// Reads one mail from `stream` and publishes the notification it carries, if any.
///
/// The stream is consumed and closed on every path.
pub async fn process_connection<S>(
    stream: S,
    parser: &MailParser,
    sink: &EventSink,
    limits: ConnectionLimits,
    shutdown: &CancellationToken,
) -> Result<Delivery, ConnectionError>
where
    S: AsyncRead + Unpin,
{
    let mut payload = Vec::new();

    // One byte past the cap tells an oversized mail apart from one that fits exactly.
    let mut stream = stream.take(limits.max_payload_bytes.saturating_add(1));

    let read = async {
        match limits.read_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, stream.read_to_end(&mut payload)).await {
                Ok(read) => read.map_err(ConnectionError::from),
                Err(_) => Err(ConnectionError::TimedOut(timeout)),
            },
            None => stream.read_to_end(&mut payload).await.map_err(ConnectionError::from),
        }
    };

    tokio::select! {
        _ = shutdown.cancelled() => return Ok(Delivery::Cancelled),
        read = read => read?,
    };

    drop(stream);

    if payload.len() as u64 > limits.max_payload_bytes {
        return Err(ConnectionError::TooLarge(limits.max_payload_bytes));
    }

    let text = String::from_utf8(payload)?;

    match parser.parse(&text)? {
        Some(notification) => {
            let kind = notification.kind();
            sink.publish(notification);
            Ok(Delivery::Published(kind))
        }
        None => Ok(Delivery::Ignored),
    }
}

// Tests.
