//! Unified error type for the Voicemesh relay.

use voicemesh_protocol::ProtocolError;
use voicemesh_reconciler::ReconcileError;
use voicemesh_registry::RegistryError;
use voicemesh_transport::TransportError;

/// Errors from loading a [`RelayConfig`](crate::RelayConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `WEB_PORT` is set but is not a port number.
    #[error("invalid port {0:?}")]
    InvalidPort(String),

    /// The JSON config could not be parsed.
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates `From` impls, so the
/// `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum VoicemeshError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame did not match the grammar.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A registry lookup failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The browser side failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// The relay configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
