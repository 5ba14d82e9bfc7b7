//! Handshake and dispatch: turns one inbound text frame into registry calls.
//!
//! A socket starts unclassified. Its first recognised frame decides its
//! role for good:
//!
//! ```text
//!   Unclassified ──"I am a server with id S"──▶ Server(S)
//!        │
//!        └──"I am a user, connect id: T"──▶ Client(U)     (token valid)
//!                                      └──▶ "Invalid link" + close
//! ```
//!
//! After that, frames are parsed against the grammar of the socket's role
//! only. Frames that match nothing are dropped with a debug event.

use tracing::{debug, info, warn};
use voicemesh_protocol::{
    ClientDirective, Handshake, ProtocolError, ServerDirective, ServerId, ToClient, UserId,
};
use voicemesh_registry::{Binding, Registry, RegistryError, SocketHandle};

/// The role a socket has taken on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Unclassified,
    Server(ServerId),
    Client { server_id: ServerId, user_id: UserId },
}

/// What happened to one frame.
#[derive(Debug)]
pub enum Dispatched {
    /// The frame completed a handshake.
    Classified(HandshakeState),
    /// The frame was a directive and was applied.
    Routed,
    /// The frame was a directive the registry could not apply.
    Failed(RegistryError),
    /// A browser presented an unusable connect id. It was told
    /// `Invalid link` and its socket is closing.
    Rejected(RegistryError),
    /// The frame matched nothing this socket may say.
    Ignored(ProtocolError),
}

/// Applies `frame`, received on `handle`'s socket, to the registry.
pub fn dispatch(registry: &mut Registry, handle: &SocketHandle, frame: &str) -> Dispatched {
    let conn_id = handle.id();
    match registry.binding(conn_id).cloned() {
        Some(Binding::Server(server_id)) => match frame.parse::<ServerDirective>() {
            Ok(directive) => match registry.handle_server_directive(conn_id, directive) {
                Ok(()) => Dispatched::Routed,
                Err(e @ RegistryError::Superseded { .. }) => {
                    debug!(%conn_id, %server_id, "frame from replaced server socket dropped");
                    Dispatched::Failed(e)
                }
                Err(e) => {
                    warn!(%server_id, error = %e, "server directive dropped");
                    Dispatched::Failed(e)
                }
            },
            Err(e) => ignore(conn_id, e),
        },
        Some(Binding::Client { .. }) => match frame.parse::<ClientDirective>() {
            Ok(directive) => match registry.handle_client_directive(conn_id, directive) {
                Ok(()) => Dispatched::Routed,
                Err(e) => {
                    warn!(%conn_id, error = %e, "user directive dropped");
                    Dispatched::Failed(e)
                }
            },
            Err(e) => ignore(conn_id, e),
        },
        None => match frame.parse::<Handshake>() {
            Ok(Handshake::Server { server_id }) => {
                registry.register_server(server_id.clone(), handle.clone());
                Dispatched::Classified(HandshakeState::Server(server_id))
            }
            Ok(Handshake::User { connect_id }) => {
                match registry.redeem_token(&connect_id, handle.clone()) {
                    Ok(redeemed) => Dispatched::Classified(HandshakeState::Client {
                        server_id: redeemed.server_id,
                        user_id: redeemed.user_id,
                    }),
                    Err(e) => {
                        info!(%conn_id, %connect_id, reason = %e, "rejecting connect id");
                        handle.send(ToClient::InvalidLink);
                        handle.close(None);
                        Dispatched::Rejected(e)
                    }
                }
            }
            Err(e) => {
                debug!(%conn_id, error = %e, "unrecognised handshake frame");
                Dispatched::Ignored(e)
            }
        },
    }
}

fn ignore(conn_id: voicemesh_transport::ConnectionId, error: ProtocolError) -> Dispatched {
    debug!(%conn_id, %error, "unrecognised frame");
    Dispatched::Ignored(error)
}
