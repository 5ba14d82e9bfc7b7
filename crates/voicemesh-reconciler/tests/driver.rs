//! Integration tests for the client driver against a scripted relay.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use voicemesh_protocol::{ConnectId, UserId};
use voicemesh_reconciler::{
    ClientDriver, MediaEvent, MemoryMedia, Outcome, Page, ReconcilerConfig,
};

type RelaySide = WebSocketStream<tokio::net::TcpStream>;

// =========================================================================
// Helpers
// =========================================================================

/// Starts a one-shot relay and a driver pointed at it.
async fn start(
    media: MemoryMedia,
) -> (
    RelaySide,
    tokio::task::JoinHandle<Outcome>,
    mpsc::UnboundedSender<MediaEvent<voicemesh_reconciler::MemoryCall>>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let driver = ClientDriver::new(media, events_rx, ReconcilerConfig::default());
    let task = tokio::spawn(async move {
        driver
            .run(&format!("ws://{addr}/"), &ConnectId::from("T1"))
            .await
            .unwrap()
    });

    let (tcp, _) = listener.accept().await.unwrap();
    let relay = tokio_tungstenite::accept_async(tcp).await.unwrap();
    (relay, task, events_tx)
}

async fn next_text(relay: &mut RelaySide) -> String {
    let msg = tokio::time::timeout(Duration::from_secs(2), relay.next())
        .await
        .expect("timed out waiting for client frame")
        .expect("client closed")
        .expect("socket error");
    match msg {
        Message::Text(t) => t.as_str().to_owned(),
        other => panic!("expected text, got {other:?}"),
    }
}

async fn say(relay: &mut RelaySide, text: &str) {
    relay.send(Message::text(text)).await.unwrap();
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_client_presents_connect_id() {
    let (mut relay, task, _events) = start(MemoryMedia::auto_open()).await;

    assert_eq!(next_text(&mut relay).await, "I am a user, connect id: T1");

    relay.close(None).await.unwrap();
    assert_eq!(task.await.unwrap(), Outcome::Ended(Page::ConnectionLost));
}

#[tokio::test]
async fn test_heartbeat_and_peer_report() {
    let media = MemoryMedia::auto_open();
    let (mut relay, task, _events) = start(media.clone()).await;
    next_text(&mut relay).await;

    say(&mut relay, "Welcome, your user id: U1 and your username is: Alice").await;
    say(&mut relay, "Heartbeat").await;
    assert_eq!(next_text(&mut relay).await, "Heartbeat response");

    say(&mut relay, "Connect to A").await;
    say(&mut relay, "peersinfo").await;
    assert_eq!(
        next_text(&mut relay).await,
        "connected-peers true 1 / 1 / 1"
    );
    assert_eq!(media.calls_to(&UserId::from("A")), 1);

    relay.close(None).await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_incoming_call_counts_toward_report() {
    let media = MemoryMedia::auto_open();
    let (mut relay, task, events) = start(media.clone()).await;
    next_text(&mut relay).await;

    say(&mut relay, "Wait for B").await;
    say(&mut relay, "peersinfo").await;
    assert_eq!(
        next_text(&mut relay).await,
        "connected-peers false 0 / 0 / 1"
    );

    events
        .send(MediaEvent::Incoming(media.incoming(&UserId::from("B"))))
        .unwrap();

    // The event and the relay socket race inside the driver; ask until the
    // answered call shows up.
    let mut report = String::new();
    for _ in 0..20 {
        say(&mut relay, "peersinfo").await;
        report = next_text(&mut relay).await;
        if report == "connected-peers true 1 / 1 / 1" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(report, "connected-peers true 1 / 1 / 1");

    relay.close(None).await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_disconnect_of_unknown_peer_warns_relay() {
    let (mut relay, task, _events) = start(MemoryMedia::auto_open()).await;
    next_text(&mut relay).await;

    say(&mut relay, "Disconnect Z").await;
    assert_eq!(
        next_text(&mut relay).await,
        "Warning Tried to disconnect user that wasn't here: Z"
    );

    relay.close(None).await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_connected_elsewhere_closes_with_reason() {
    let media = MemoryMedia::auto_open();
    let (mut relay, task, _events) = start(media.clone()).await;
    next_text(&mut relay).await;

    say(&mut relay, "Connect to A").await;
    say(&mut relay, "You connected elsewhere").await;

    let msg = tokio::time::timeout(Duration::from_secs(2), relay.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match msg {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.reason.as_str(), "connected-elsewhere");
        }
        other => panic!("expected close frame, got {other:?}"),
    }

    assert_eq!(
        task.await.unwrap(),
        Outcome::Ended(Page::ConnectedElsewhere)
    );
    assert_eq!(media.open_calls_with(&UserId::from("A")), 0);
}

#[tokio::test]
async fn test_invalid_link_ends_session() {
    let (mut relay, task, _events) = start(MemoryMedia::new()).await;
    next_text(&mut relay).await;

    say(&mut relay, "Invalid link").await;

    assert_eq!(task.await.unwrap(), Outcome::Ended(Page::InvalidLink));
}

#[tokio::test]
async fn test_reload_requests_fresh_session() {
    let (mut relay, task, _events) = start(MemoryMedia::new()).await;
    next_text(&mut relay).await;

    say(&mut relay, "Reload").await;

    assert_eq!(task.await.unwrap(), Outcome::Reload);
}

#[tokio::test]
async fn test_unreachable_relay_shows_connection_lost() {
    // Bind then drop so the port is very likely closed.
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let (_events_tx, events_rx) = mpsc::unbounded_channel();
    let driver = ClientDriver::new(MemoryMedia::new(), events_rx, ReconcilerConfig::default());

    let outcome = driver
        .run(&format!("ws://{addr}/"), &ConnectId::from("T1"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Ended(Page::ConnectionLost));
}

#[tokio::test]
async fn test_malformed_relay_url_is_an_error() {
    let (_events_tx, events_rx) = mpsc::unbounded_channel();
    let driver = ClientDriver::new(MemoryMedia::new(), events_rx, ReconcilerConfig::default());

    let err = driver
        .run("ftp://127.0.0.1/", &ConnectId::from("T1"))
        .await
        .unwrap_err();

    assert!(matches!(err, voicemesh_reconciler::ReconcileError::RelayUrl(_)));
}
