//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::{
    Connection, ConnectionId, Received, Route, Transport, TransportError, Upgrade,
    DEFAULT_BROKER_PREFIX,
};

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// How long a freshly accepted TCP peer gets to finish its upgrade.
pub const DEFAULT_UPGRADE_TIMEOUT: Duration = Duration::from_secs(10);

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// Upgrade requests under the broker prefix are refused with `404` so a
/// reverse proxy in front of the listener can hand them to the broker.
pub struct WebSocketTransport {
    listener: TcpListener,
    broker_prefix: String,
    upgrade_timeout: Duration,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        tracing::info!(addr, "relay listener bound");
        Ok(Self {
            listener,
            broker_prefix: DEFAULT_BROKER_PREFIX.to_string(),
            upgrade_timeout: DEFAULT_UPGRADE_TIMEOUT,
        })
    }

    /// Sets the path prefix reserved for the peer-connection broker.
    pub fn with_broker_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.broker_prefix = prefix.into();
        self
    }

    pub fn with_upgrade_timeout(mut self, timeout: Duration) -> Self {
        self.upgrade_timeout = timeout;
        self
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Pending = PendingUpgrade;
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<PendingUpgrade, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        tracing::trace!(%addr, "tcp peer accepted");
        Ok(PendingUpgrade {
            stream,
            addr,
            broker_prefix: self.broker_prefix.clone(),
            timeout: self.upgrade_timeout,
        })
    }
}

/// A TCP peer that has not finished its WebSocket upgrade yet.
pub struct PendingUpgrade {
    stream: TcpStream,
    addr: SocketAddr,
    broker_prefix: String,
    timeout: Duration,
}

impl PendingUpgrade {
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Upgrade for PendingUpgrade {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn upgrade(self) -> Result<WebSocketConnection, TransportError> {
        let Self {
            stream,
            addr,
            broker_prefix,
            timeout,
        } = self;
        let prefix = broker_prefix.as_str();
        let mut path = String::new();
        let callback = |req: &Request,
                        resp: Response|
         -> Result<Response, ErrorResponse> {
            path = req.uri().path().to_string();
            match Route::for_path(&path, prefix) {
                Route::Relay => Ok(resp),
                Route::Broker => {
                    let mut rejection = ErrorResponse::new(Some(
                        "served by the peer-connection broker".to_string(),
                    ));
                    *rejection.status_mut() = StatusCode::NOT_FOUND;
                    Err(rejection)
                }
            }
        };
        let handshake = tokio::time::timeout(
            timeout,
            tokio_tungstenite::accept_hdr_async(stream, callback),
        )
        .await;

        let ws = match handshake {
            Ok(Ok(ws)) => ws,
            Err(_) => return Err(TransportError::UpgradeTimedOut(addr)),
            Ok(Err(_)) if Route::for_path(&path, prefix) == Route::Broker => {
                return Err(TransportError::RouteRejected(path));
            }
            Ok(Err(e)) => return Err(TransportError::Upgrade(e.to_string())),
        };

        let id = ConnectionId::next();
        tracing::debug!(%id, %addr, %path, "socket upgraded");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            path,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// A single WebSocket connection.
///
/// The socket is split so a writer never waits behind a pending read.
pub struct WebSocketConnection {
    id: ConnectionId,
    path: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    /// The request path the client upgraded on.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, frame: &str) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .send(Message::text(frame))
            .await
            .map_err(|e| TransportError::Write {
                id: self.id,
                reason: e.to_string(),
            })
    }

    async fn recv(&self) -> Result<Received, Self::Error> {
        loop {
            let msg = self.stream.lock().await.next().await;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Received::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Received::Frame(
                        String::from_utf8_lossy(&data).into_owned(),
                    ));
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|r| !r.is_empty());
                    return Ok(Received::Closed { reason });
                }
                None => return Ok(Received::Closed { reason: None }),
                // tungstenite answers pings itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(TransportError::Read {
                        id: self.id,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    async fn close(&self, reason: Option<&str>) -> Result<(), Self::Error> {
        let frame = reason.map(|r| CloseFrame {
            code: CloseCode::Normal,
            reason: r.to_owned().into(),
        });
        self.sink
            .lock()
            .await
            .send(Message::Close(frame))
            .await
            .map_err(|e| TransportError::Write {
                id: self.id,
                reason: e.to_string(),
            })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
