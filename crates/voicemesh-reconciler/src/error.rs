//! Error types for the client side.

/// Errors that can occur while driving a client session.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The media backend could not originate a call.
    #[error("media backend failed: {0}")]
    Media(String),

    /// The relay address is not a WebSocket URL.
    #[error("bad relay url: {0}")]
    RelayUrl(#[source] tokio_tungstenite::tungstenite::Error),
}
