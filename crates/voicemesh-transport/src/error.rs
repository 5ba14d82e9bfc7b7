use crate::ConnectionId;

/// Socket-level failures. None of these are protocol problems; a frame the
/// relay cannot parse still arrives as [`Received::Frame`](crate::Received).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tcp accept: {0}")]
    Accept(#[source] std::io::Error),

    /// The client went away or spoke something other than WebSocket
    /// before the upgrade finished.
    #[error("websocket upgrade: {0}")]
    Upgrade(String),

    /// The peer connected but did not finish its upgrade in time.
    #[error("websocket upgrade from {0} timed out")]
    UpgradeTimedOut(std::net::SocketAddr),

    /// The upgrade request targeted the broker's path prefix.
    #[error("upgrade for {0} belongs to the peer-connection broker")]
    RouteRejected(String),

    /// Writing to the socket failed. The writer should stop.
    #[error("{id}: write failed: {reason}")]
    Write { id: ConnectionId, reason: String },

    /// Reading from the socket failed without a close frame.
    #[error("{id}: read failed: {reason}")]
    Read { id: ConnectionId, reason: String },
}
