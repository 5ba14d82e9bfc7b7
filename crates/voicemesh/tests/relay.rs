//! Integration tests for the relay: handshakes, routing and close handling
//! over real WebSocket connections.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use voicemesh::prelude::*;

// =========================================================================
// Helpers
// =========================================================================

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Relay on an ephemeral loopback port, accepting in the background.
async fn start_relay() -> String {
    let relay = RelayServer::builder().bind("127.0.0.1:0").build().await.unwrap();
    let addr = relay.local_addr().unwrap().to_string();
    tokio::spawn(relay.run());
    addr
}

async fn connect(addr: &str) -> Ws {
    tokio_tungstenite::connect_async(format!("ws://{addr}/")).await.unwrap().0
}

async fn say(ws: &mut Ws, text: &str) {
    ws.send(Message::text(text)).await.expect("send");
}

/// Lets the relay finish processing frames sent on other sockets.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Next frame of any kind, or `None` if nothing arrives in time.
async fn next_message(ws: &mut Ws, wait: Duration) -> Option<Message> {
    match tokio::time::timeout(wait, ws.next()).await {
        Ok(Some(Ok(msg))) => Some(msg),
        _ => None,
    }
}

async fn expect_text(ws: &mut Ws) -> String {
    match next_message(ws, Duration::from_secs(2)).await {
        Some(Message::Text(t)) => t.as_str().to_owned(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn expect_silence(ws: &mut Ws) {
    if let Some(msg) = next_message(ws, Duration::from_millis(150)).await {
        panic!("expected no frame, got {msg:?}");
    }
}

/// Connects plugin `server_id` and mints `connect_id` for `user_id`.
async fn plugin_with_token(addr: &str, server_id: &str, connect_id: &str, user_id: &str) -> Ws {
    let mut plugin = connect(addr).await;
    say(&mut plugin, &format!("I am a server with id {server_id}")).await;
    say(
        &mut plugin,
        &format!("New connect id: {connect_id} with user id {user_id} and with username: Alice"),
    )
    .await;
    settle().await;
    plugin
}

/// Connects a browser with `connect_id` and consumes its welcome.
async fn browser(addr: &str, connect_id: &str) -> Ws {
    let mut ws = connect(addr).await;
    say(&mut ws, &format!("I am a user, connect id: {connect_id}")).await;
    let welcome = expect_text(&mut ws).await;
    assert!(welcome.starts_with("Welcome, your user id: "), "got {welcome}");
    ws
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_token_redemption_welcomes_and_notifies() {
    let addr = start_relay().await;
    let mut plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;

    let mut alice = connect(&addr).await;
    say(&mut alice, "I am a user, connect id: T1").await;

    assert_eq!(
        expect_text(&mut alice).await,
        "Welcome, your user id: U1 and your username is: Alice"
    );
    assert_eq!(
        expect_text(&mut plugin).await,
        "User connected with id: U1 and username: Alice"
    );
}

#[tokio::test]
async fn test_unknown_token_is_invalid_link_and_closed() {
    let addr = start_relay().await;
    let _plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;

    let mut stranger = connect(&addr).await;
    say(&mut stranger, "I am a user, connect id: T404").await;

    assert_eq!(expect_text(&mut stranger).await, "Invalid link");
    assert!(matches!(
        next_message(&mut stranger, Duration::from_secs(2)).await,
        Some(Message::Close(_)) | None
    ));
}

#[tokio::test]
async fn test_token_of_offline_server_is_invalid_link() {
    let addr = start_relay().await;
    let mut plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;
    plugin.close(None).await.unwrap();
    settle().await;

    let mut alice = connect(&addr).await;
    say(&mut alice, "I am a user, connect id: T1").await;

    assert_eq!(expect_text(&mut alice).await, "Invalid link");
}

#[tokio::test]
async fn test_noise_before_handshake_is_ignored() {
    let addr = start_relay().await;
    let mut plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;

    let mut alice = connect(&addr).await;
    say(&mut alice, "hello?").await;
    expect_silence(&mut alice).await;

    say(&mut alice, "I am a user, connect id: T1").await;
    assert!(expect_text(&mut alice).await.starts_with("Welcome"));
    assert!(expect_text(&mut plugin).await.starts_with("User connected"));
}

#[tokio::test]
async fn test_broker_path_is_refused() {
    let addr = start_relay().await;

    let result = tokio_tungstenite::connect_async(format!("ws://{addr}/peer/peerjs")).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_silent_tcp_peer_does_not_stall_handshakes() {
    let addr = start_relay().await;
    let _idle = tokio::net::TcpStream::connect(&addr).await.unwrap();
    settle().await;

    let mut plugin = tokio::time::timeout(Duration::from_secs(2), async {
        plugin_with_token(&addr, "S1", "T1", "U1").await
    })
    .await
    .expect("plugin should connect while another peer idles");
    let mut alice = connect(&addr).await;
    say(&mut alice, "I am a user, connect id: T1").await;

    assert!(expect_text(&mut alice).await.starts_with("Welcome"));
    assert!(expect_text(&mut plugin).await.starts_with("User connected"));
}

#[tokio::test]
async fn test_silent_tcp_peer_is_dropped_after_upgrade_timeout() {
    use tokio::io::AsyncReadExt;

    let relay = RelayServer::builder()
        .bind("127.0.0.1:0")
        .upgrade_timeout(Duration::from_secs(1))
        .build()
        .await
        .unwrap();
    let addr = relay.local_addr().unwrap();
    tokio::spawn(relay.run());

    let mut idle = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(3), idle.read(&mut buf))
        .await
        .expect("relay should hang up on a silent peer");
    assert!(matches!(read, Ok(0) | Err(_)));
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn test_to_forwards_payload_to_user() {
    let addr = start_relay().await;
    let mut plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;
    let mut alice = browser(&addr, "T1").await;
    expect_text(&mut plugin).await;

    say(&mut plugin, "To U1: Connect to U2").await;
    say(&mut plugin, "To U1: Volume: U2: 0.5").await;

    assert_eq!(expect_text(&mut alice).await, "Connect to U2");
    assert_eq!(expect_text(&mut alice).await, "Volume: U2: 0.5");
}

#[tokio::test]
async fn test_to_unknown_user_is_dropped() {
    let addr = start_relay().await;
    let mut plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;
    let mut alice = browser(&addr, "T1").await;
    expect_text(&mut plugin).await;

    say(&mut plugin, "To U9: Connect to U1").await;

    expect_silence(&mut alice).await;
    expect_silence(&mut plugin).await;
}

#[tokio::test]
async fn test_peersinfo_round_trip() {
    let addr = start_relay().await;
    let mut plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;
    let mut alice = browser(&addr, "T1").await;
    expect_text(&mut plugin).await;

    say(&mut plugin, "peersinfo").await;
    assert_eq!(expect_text(&mut alice).await, "peersinfo");

    say(&mut alice, "connected-peers true 0 / 0 / 0").await;
    assert_eq!(
        expect_text(&mut plugin).await,
        "Peer info from U1: true 0 / 0 / 0"
    );
}

#[tokio::test]
async fn test_resync_reaches_every_browser() {
    let addr = start_relay().await;
    let mut plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;
    say(&mut plugin, "New connect id: T2 with user id U2 and with username: Bob").await;
    settle().await;

    let mut alice = browser(&addr, "T1").await;
    let mut bob = browser(&addr, "T2").await;

    say(&mut plugin, "resync").await;

    assert_eq!(expect_text(&mut alice).await, "resync");
    assert_eq!(expect_text(&mut bob).await, "resync");
}

#[tokio::test]
async fn test_browser_reports_are_tagged() {
    let addr = start_relay().await;
    let mut plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;
    let mut alice = browser(&addr, "T1").await;
    expect_text(&mut plugin).await;

    say(&mut alice, "Warning desync (1 / 0 / 1)").await;
    say(&mut alice, "Heartbeat response").await;

    assert_eq!(
        expect_text(&mut plugin).await,
        "Warning from user U1: desync (1 / 0 / 1)"
    );
    assert_eq!(
        expect_text(&mut plugin).await,
        "Heartbeat response from U1"
    );
}

// =========================================================================
// Close handling
// =========================================================================

#[tokio::test]
async fn test_browser_close_notifies_plugin() {
    let addr = start_relay().await;
    let mut plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;
    let mut alice = browser(&addr, "T1").await;
    expect_text(&mut plugin).await;

    alice.close(None).await.unwrap();

    assert_eq!(expect_text(&mut plugin).await, "User disconnected U1");
}

#[tokio::test]
async fn test_superseded_browser_close_is_silent() {
    let addr = start_relay().await;
    let mut plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;
    let mut old_tab = browser(&addr, "T1").await;
    expect_text(&mut plugin).await;
    let mut new_tab = browser(&addr, "T1").await;
    expect_text(&mut plugin).await;

    // The plugin addresses the oldest session first.
    say(&mut plugin, "To U1: You connected elsewhere").await;
    assert_eq!(expect_text(&mut old_tab).await, "You connected elsewhere");

    old_tab
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: SUPERSEDED_CLOSE_REASON.to_owned().into(),
        }))
        .await
        .unwrap();
    expect_silence(&mut plugin).await;

    // The new tab is still routed to.
    say(&mut plugin, "To U1: Heartbeat").await;
    assert_eq!(expect_text(&mut new_tab).await, "Heartbeat");
}

#[tokio::test]
async fn test_plugin_reconnect_takes_over() {
    let addr = start_relay().await;
    let mut old_plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;
    let mut alice = browser(&addr, "T1").await;
    expect_text(&mut old_plugin).await;

    let mut new_plugin = connect(&addr).await;
    say(&mut new_plugin, "I am a server with id S1").await;

    assert_eq!(expect_text(&mut alice).await, "Has plugin connection? true");
    assert!(matches!(
        next_message(&mut old_plugin, Duration::from_secs(2)).await,
        Some(Message::Close(_)) | None
    ));

    // Closing the superseded socket does not take the new one offline.
    drop(old_plugin);
    settle().await;
    expect_silence(&mut alice).await;
    say(&mut alice, "Heartbeat response").await;
    assert_eq!(
        expect_text(&mut new_plugin).await,
        "Heartbeat response from U1"
    );

    new_plugin.close(None).await.unwrap();
    assert_eq!(expect_text(&mut alice).await, "Has plugin connection? false");
}

#[tokio::test]
async fn test_tokens_survive_plugin_reconnect() {
    let addr = start_relay().await;
    let mut plugin = plugin_with_token(&addr, "S1", "T1", "U1").await;
    plugin.close(None).await.unwrap();
    settle().await;

    let mut plugin = connect(&addr).await;
    say(&mut plugin, "I am a server with id S1").await;
    settle().await;

    let _alice = browser(&addr, "T1").await;
    assert_eq!(
        expect_text(&mut plugin).await,
        "User connected with id: U1 and username: Alice"
    );
}
