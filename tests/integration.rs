#![cfg(test)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use bug_announcer::{
    base::{
        config::{Config, ConfigInner},
        types::Void,
    },
    mail::{
        listener::{ConnectionLimits, MailListener},
        notification::{Notification, NotificationKind},
        parser::MailParser,
    },
    runtime::Runtime,
    service::{
        chat::{ChatClient, GenericChatClient},
        sink::{EventSink, GenericEventSink},
        tracker::TrackerClient,
    },
};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

// Fakes.

/// Sink that forwards every published notification to a channel.
struct ChannelSink {
    tx: UnboundedSender<Notification>,
}

impl GenericEventSink for ChannelSink {
    fn publish(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }
}

/// Chat client that records posted messages and runs until told to stop.
struct FakeChat {
    posted: UnboundedSender<(String, String)>,
    stop: CancellationToken,
}

#[async_trait]
impl GenericChatClient for FakeChat {
    fn bot_user_id(&self) -> &str {
        "U12345"
    }

    async fn start(&self) -> Void {
        self.stop.cancelled().await;
        Ok(())
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Void {
        let _ = self.posted.send((channel_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn reply_in_thread(&self, channel_id: &str, _thread_ts: &str, text: &str) -> Void {
        self.post_message(channel_id, text).await
    }
}

// Helpers.

fn new_bug_mail(id: &str, title: &str) -> String {
    format!(
        "From: bugzilla_noreply@novell.com\nSubject: [Bug {id}] New: {title}\nX-Bugzilla-Type: new\nX-Bugzilla-Classification: openSUSE\nX-Bugzilla-Status: NEW\n\nhttps://bugzilla.novell.com/show_bug.cgi?id={id}\n"
    )
}

fn closed_bug_mail(id: &str, title: &str, actor: &str) -> String {
    format!(
        "From: bugzilla_noreply@novell.com\nSubject: [Bug {id}] {title}\nX-Bugzilla-Type: changed\nX-Bugzilla-Classification: openSUSE\nX-Bugzilla-Status: CLOSED\nX-Bugzilla-Changed-Fields: Status Resolution\n\nhttps://bugzilla.novell.com/show_bug.cgi?id={id}\n\n\n{actor} <someone@example.org> changed:\n\n           What    |Removed |Added\n"
    )
}

async fn start_listener(limits: ConnectionLimits) -> (SocketAddr, UnboundedReceiver<Notification>, CancellationToken, JoinHandle<Void>) {
    let (tx, rx) = unbounded_channel();
    let sink = EventSink::new(Arc::new(ChannelSink { tx }));

    let listener = MailListener::bind("127.0.0.1:0", Arc::new(MailParser::default()), sink, limits)
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(listener.serve(shutdown.clone()));

    (addr, rx, shutdown, handle)
}

async fn send_mail(addr: SocketAddr, mail: &str) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(mail.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();
}

async fn expect_notification(rx: &mut UnboundedReceiver<Notification>) -> Notification {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timed out waiting for a notification")
        .expect("Sink channel closed")
}

async fn expect_nothing(rx: &mut UnboundedReceiver<Notification>) {
    let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(result.is_err(), "No notification should have been published");
}

// Tests.

#[tokio::test]
async fn test_concurrent_connections_publish_once_each() {
    let (addr, mut rx, shutdown, handle) = start_listener(ConnectionLimits::default()).await;

    // Open both connections before either finishes sending.
    let mut first = TcpStream::connect(addr).await.unwrap();
    let mut second = TcpStream::connect(addr).await.unwrap();

    let new_mail = new_bug_mail("12345", "disk fills up");
    let closed_mail = closed_bug_mail("842123", "zypper crashes on refresh", "Jane Doe");

    first.write_all(&new_mail.as_bytes()[..20]).await.unwrap();
    second.write_all(closed_mail.as_bytes()).await.unwrap();
    first.write_all(&new_mail.as_bytes()[20..]).await.unwrap();

    second.shutdown().await.unwrap();
    first.shutdown().await.unwrap();

    let mut received = vec![expect_notification(&mut rx).await, expect_notification(&mut rx).await];
    received.sort_by_key(|n| n.id().to_string());

    assert_eq!(received[0].kind(), NotificationKind::NewReport);
    assert_eq!(received[0].id(), "12345");
    assert_eq!(received[0].summary(), "disk fills up");
    assert_eq!(received[0].actor(), None);

    assert_eq!(received[1].kind(), NotificationKind::ClosedReport);
    assert_eq!(received[1].id(), "842123");
    assert_eq!(received[1].summary(), "zypper crashes on refresh");
    assert_eq!(received[1].actor(), Some("Jane Doe"));

    expect_nothing(&mut rx).await;

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_empty_connection_publishes_nothing() {
    let (addr, mut rx, shutdown, handle) = start_listener(ConnectionLimits::default()).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    drop(stream);

    expect_nothing(&mut rx).await;

    // The listener keeps serving afterwards.
    send_mail(addr, &new_bug_mail("1", "still alive")).await;
    assert_eq!(expect_notification(&mut rx).await.summary(), "still alive");

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_malformed_mail_does_not_affect_other_connections() {
    let (addr, mut rx, shutdown, handle) = start_listener(ConnectionLimits::default()).await;

    let malformed = closed_bug_mail("7", "thing", "Jane Doe").replace("\n\n\nJane Doe", "\nJane Doe");
    send_mail(addr, &malformed).await;
    send_mail(addr, "just some noise").await;

    expect_nothing(&mut rx).await;

    send_mail(addr, &new_bug_mail("8", "next one")).await;
    assert_eq!(expect_notification(&mut rx).await.id(), "8");

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stalled_peer_does_not_block_others() {
    let (addr, mut rx, shutdown, handle) = start_listener(ConnectionLimits::default()).await;

    let mut stalled = TcpStream::connect(addr).await.unwrap();
    stalled.write_all(b"X-Bugzilla-Classification: openSUSE\n").await.unwrap();

    send_mail(addr, &new_bug_mail("9", "not blocked")).await;
    assert_eq!(expect_notification(&mut rx).await.summary(), "not blocked");

    // Shutdown does not wait for the stalled peer to close.
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("Listener did not shut down")
        .unwrap()
        .unwrap();

    drop(stalled);
}

#[tokio::test]
async fn test_read_timeout_drops_stalled_peer() {
    let (addr, mut rx, shutdown, handle) = start_listener(ConnectionLimits {
        read_timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    })
    .await;

    let mut stalled = TcpStream::connect(addr).await.unwrap();
    stalled.write_all(new_bug_mail("10", "too slow").as_bytes()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    stalled.shutdown().await.ok();

    expect_nothing(&mut rx).await;

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_oversized_mail_is_dropped_and_listener_keeps_serving() {
    let (addr, mut rx, shutdown, handle) = start_listener(ConnectionLimits {
        max_payload_bytes: 256,
        ..Default::default()
    })
    .await;

    let padded = format!("{}{}", new_bug_mail("11", "too big"), "x".repeat(1024));
    let mut stream = TcpStream::connect(addr).await.unwrap();
    // The listener may close before everything is written.
    stream.write_all(padded.as_bytes()).await.ok();
    stream.shutdown().await.ok();

    expect_nothing(&mut rx).await;

    send_mail(addr, &new_bug_mail("12", "small enough")).await;
    assert_eq!(expect_notification(&mut rx).await.id(), "12");

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_runtime_announces_mail_in_channel() {
    // Reserve a free port for the runtime to bind.
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

    let config = Config {
        inner: Arc::new(ConfigInner {
            slack_app_token: "xapp-test".to_string(),
            slack_bot_token: "xoxb-test".to_string(),
            announce_channel_id: "C12345".to_string(),
            listen_address: format!("127.0.0.1:{port}"),
            tracker_base_url: "https://bugzilla.novell.com".to_string(),
            tracker_classification: "openSUSE".to_string(),
            max_payload_bytes: 64 * 1024,
            ..Default::default()
        }),
    };

    let (posted_tx, mut posted_rx) = unbounded_channel();
    let stop = CancellationToken::new();

    let chat = ChatClient::new(Arc::new(FakeChat {
        posted: posted_tx,
        stop: stop.clone(),
    }));
    let parser = Arc::new(MailParser::new(&config.tracker_classification, &config.tracker_base_url).unwrap());
    let tracker = TrackerClient::bugzilla(&config);
    let sink = EventSink::chat(chat.clone(), config.announce_channel_id.clone());

    let runtime = Runtime {
        config,
        parser,
        tracker,
        chat,
        sink,
    };

    let handle = tokio::spawn(async move { runtime.start().await });

    // Wait for the listener to come up.
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let mut stream = None;
    for _ in 0..50 {
        if let Ok(s) = TcpStream::connect(addr).await {
            stream = Some(s);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let mut stream = stream.expect("Runtime never started listening");

    stream.write_all(new_bug_mail("12345", "disk fills up").as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();

    let (channel_id, text) = tokio::time::timeout(Duration::from_secs(5), posted_rx.recv()).await.unwrap().unwrap();
    assert_eq!(channel_id, "C12345");
    assert_eq!(
        text,
        "We have new bug! It's number is 12345 and it is about 'disk fills up'. Who is up for the challenge?"
    );

    // Stopping the chat client stops the runtime.
    stop.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap().unwrap();
}
