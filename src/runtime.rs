//! Runtime services and shared state for the bug-announcer.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    mail::{
        listener::{ConnectionLimits, MailListener},
        parser::MailParser,
    },
    service::{chat::ChatClient, sink::EventSink, tracker::TrackerClient},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the configuration, the mail parser, and the service clients.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The parser for inbound mail.
    pub parser: Arc<MailParser>,
    /// The bug tracker client instance.
    pub tracker: TrackerClient,
    /// The chat client instance.
    pub chat: ChatClient,
    /// Where parsed notifications are announced.
    pub sink: EventSink,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the mail parser.
        let parser = Arc::new(MailParser::new(&config.tracker_classification, &config.tracker_base_url)?);

        // Initialize the tracker client.
        let tracker = TrackerClient::bugzilla(&config);

        // Initialize the slack client.
        let chat = ChatClient::slack(&config, tracker.clone()).await?;

        // Announcements go to the configured channel.
        let sink = EventSink::chat(chat.clone(), config.announce_channel_id.clone());

        Ok(Self {
            config,
            parser,
            tracker,
            chat,
            sink,
        })
    }

    /// Runs the mail listener next to the chat client until either stops or Ctrl-C is pressed.
    pub async fn start(&self) -> Void {
        // A port that is already taken is fatal.
        let limits = ConnectionLimits {
            read_timeout: self.config.read_timeout(),
            max_payload_bytes: self.config.max_payload_bytes,
        };
        let listener = MailListener::bind(&self.config.listen_address, self.parser.clone(), self.sink.clone(), limits).await?;

        let shutdown = CancellationToken::new();
        let mail = tokio::spawn(listener.serve(shutdown.clone()));

        let result = tokio::select! {
            result = self.chat.start() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down ...");
                Ok(())
            }
        };

        shutdown.cancel();
        mail.await??;

        result
    }
}
