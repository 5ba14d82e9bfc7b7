//! Error types for the registry layer.

use voicemesh_protocol::{ConnectId, ServerId, UserId};
use voicemesh_transport::ConnectionId;

/// Errors that can occur during registry operations.
///
/// None of these are fatal to the relay. Each one maps to a well-defined
/// reaction in the connection handler: an `Invalid link` reply, a logged
/// drop, or nothing at all.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No token with this id was ever minted.
    #[error("unknown connect id {0}")]
    UnknownToken(ConnectId),

    /// The token exists but the plugin that minted it is not connected.
    /// Tokens are only redeemable while their server is online.
    #[error("server {0} is offline")]
    ServerOffline(ServerId),

    /// A plugin addressed a user that has no session on that server.
    #[error("user {user_id} is not connected to server {server_id}")]
    UnknownRecipient { server_id: ServerId, user_id: UserId },

    /// A plugin socket spoke after a newer handshake took its server over.
    #[error("{conn_id} no longer speaks for server {server_id}")]
    Superseded {
        server_id: ServerId,
        conn_id: ConnectionId,
    },

    /// The connection is not bound to a session of the right kind.
    #[error("{0} is not bound to a session")]
    NotBound(ConnectionId),
}
