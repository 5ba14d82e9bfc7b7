//! Socket layer for the Voicemesh relay.
//!
//! The relay only ever exchanges single-line text frames, so the
//! [`Connection`] trait is shaped around exactly that: send a line, receive
//! a line or a close, close with an optional reason. [`Transport`] hands out
//! raw peers, [`Upgrade`] turns one into a connection, and [`Route`]
//! decides which upgrade paths are ours at all.
//!
//! # Feature Flags
//!
//! - `websocket` (default): listener and connections over `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
mod route;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use route::{Route, DEFAULT_BROKER_PREFIX};
#[cfg(feature = "websocket")]
pub use websocket::{
    PendingUpgrade, WebSocketConnection, WebSocketTransport, DEFAULT_UPGRADE_TIMEOUT,
};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique socket number. The registry keys every binding on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw number. Tests use this to fabricate sockets.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next unused id.
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What [`Connection::recv`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// One text frame. Binary frames are decoded lossily.
    Frame(String),
    /// The peer closed the socket. `reason` is the close-frame reason, if
    /// the peer sent a non-empty one.
    Closed { reason: Option<String> },
}

/// Source of new sockets.
///
/// Accepting and upgrading are separate steps so the accept loop never
/// waits on a slow or silent peer; each [`Upgrade`] runs in its own task.
pub trait Transport: Send + Sync + 'static {
    type Pending: Upgrade<Connection = Self::Connection, Error = Self::Error>;
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next raw peer.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;
}

/// A peer between accept and a usable [`Connection`].
pub trait Upgrade: Send + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Completes the handshake. A peer that stays silent past the
    /// transport's deadline fails instead of hanging.
    async fn upgrade(self) -> Result<Self::Connection, Self::Error>;
}

/// One upgraded socket carrying text frames.
///
/// Sending and receiving must not block each other: the relay writes to a
/// connection from one task while another task sits in `recv`.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, frame: &str) -> Result<(), Self::Error>;

    /// Next text frame or close. Control frames are swallowed.
    async fn recv(&self) -> Result<Received, Self::Error>;

    /// Sends a close frame. A `reason` is carried with a normal close code.
    async fn close(&self, reason: Option<&str>) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;
}
