//! Listener and connection behaviour over real loopback sockets.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::Message;
    use tokio::io::AsyncReadExt;
    use voicemesh_transport::{
        Connection, Received, Transport, TransportError, Upgrade, WebSocketConnection,
        WebSocketTransport,
    };

    type Peer = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Accepts one socket on a fresh listener while a client dials `path`.
    async fn pair(path: &str) -> (WebSocketConnection, Peer) {
        let mut listener = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = tokio::spawn(async move { listener.accept().await?.upgrade().await });

        let (peer, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
            .await
            .unwrap();
        let conn = accepted.await.unwrap().unwrap();
        (conn, peer)
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (conn, mut peer) = pair("/").await;
        assert_eq!(conn.path(), "/");

        conn.send("Has plugin connection? true").await.unwrap();
        let got = peer.next().await.unwrap().unwrap();
        assert_eq!(got.to_text().unwrap(), "Has plugin connection? true");

        peer.send(Message::text("Heartbeat response")).await.unwrap();
        assert_eq!(
            conn.recv().await.unwrap(),
            Received::Frame("Heartbeat response".into())
        );
    }

    #[tokio::test]
    async fn test_binary_frames_are_read_as_text() {
        let (conn, mut peer) = pair("/").await;

        peer.send(Message::binary(b"peersinfo".to_vec())).await.unwrap();

        assert_eq!(conn.recv().await.unwrap(), Received::Frame("peersinfo".into()));
    }

    #[tokio::test]
    async fn test_close_reason_reaches_reader() {
        let (conn, mut peer) = pair("/").await;

        peer.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "connected-elsewhere".into(),
        })))
        .await
        .unwrap();

        assert_eq!(
            conn.recv().await.unwrap(),
            Received::Closed {
                reason: Some("connected-elsewhere".into())
            }
        );
    }

    #[tokio::test]
    async fn test_bare_close_has_no_reason() {
        let (conn, mut peer) = pair("/").await;

        peer.close(None).await.unwrap();

        assert_eq!(conn.recv().await.unwrap(), Received::Closed { reason: None });
    }

    #[tokio::test]
    async fn test_server_close_reason_reaches_client() {
        let (conn, mut peer) = pair("/").await;

        conn.close(Some("connected-elsewhere")).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), peer.next())
            .await
            .unwrap();
        match frame {
            Some(Ok(Message::Close(Some(close)))) => {
                assert_eq!(close.reason.as_str(), "connected-elsewhere");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sockets_get_distinct_ids() {
        let (a, _pa) = pair("/").await;
        let (b, _pb) = pair("/").await;
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_broker_upgrade_is_refused() {
        let listener = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut listener = listener.with_broker_prefix("/peer");
        let accepted = tokio::spawn(async move { listener.accept().await?.upgrade().await });

        let dial = tokio_tungstenite::connect_async(format!("ws://{addr}/peer/peerjs")).await;
        assert!(dial.is_err());

        match accepted.await.unwrap() {
            Err(TransportError::RouteRejected(path)) => assert_eq!(path, "/peer/peerjs"),
            other => panic!("expected route rejection, got {:?}", other.map(|c| c.id())),
        }
    }

    #[tokio::test]
    async fn test_bind_on_taken_port_names_the_address() {
        let taken = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let err = WebSocketTransport::bind(&addr).await.err().unwrap();

        assert!(matches!(err, TransportError::Bind { addr: ref a, .. } if *a == addr));
    }

    #[tokio::test]
    async fn test_silent_peer_does_not_block_the_next_accept() {
        let listener = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut listener = listener.with_upgrade_timeout(Duration::from_millis(200));

        let mut silent = tokio::net::TcpStream::connect(addr).await.unwrap();
        let silent_pending = listener.accept().await.unwrap();
        let silent_upgrade = tokio::spawn(silent_pending.upgrade());

        let accepted = tokio::spawn(async move { listener.accept().await?.upgrade().await });
        let (_peer, _) = tokio::time::timeout(
            Duration::from_secs(2),
            tokio_tungstenite::connect_async(format!("ws://{addr}/")),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(accepted.await.unwrap().is_ok());

        let timed_out = silent_upgrade.await.unwrap();
        assert!(matches!(timed_out, Err(TransportError::UpgradeTimedOut(_))));

        // The silent peer's socket is closed once its upgrade is abandoned.
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), silent.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
