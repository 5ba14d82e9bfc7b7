//! Session types: the relay's records of plugins, browsers and invitations.
//!
//! - A [`ServerSession`] exists per plugin identity for the whole life of
//!   the relay process. Its socket handle comes and goes.
//! - A [`ClientSession`] exists per connected browser and belongs to exactly
//!   one server session.
//! - A [`ConnectToken`] is an invitation a plugin minted for one user. It is
//!   redeemable while the plugin that minted it is online.

use voicemesh_protocol::{ConnectId, ServerId, UserId};
use voicemesh_transport::ConnectionId;

use crate::SocketHandle;

// ---------------------------------------------------------------------------
// ServerSession
// ---------------------------------------------------------------------------

/// One game-server plugin.
///
/// ```text
///   (created) ──▶ Online{handle} ──(socket closed)──▶ Offline
///                      ▲                                 │
///                      └────────(handshake again)────────┘
/// ```
///
/// A second handshake for the same id while online closes the previous
/// socket and takes over; there is never more than one live handle.
#[derive(Debug)]
pub struct ServerSession {
    id: ServerId,
    handle: Option<SocketHandle>,
    clients: Vec<ClientSession>,
}

impl ServerSession {
    pub(crate) fn new(id: ServerId) -> Self {
        Self {
            id,
            handle: None,
            clients: Vec::new(),
        }
    }

    /// The plugin's stable id.
    pub fn id(&self) -> &ServerId {
        &self.id
    }

    /// The plugin's current socket, if any.
    pub fn handle(&self) -> Option<&SocketHandle> {
        self.handle.as_ref()
    }

    /// Whether the plugin currently has an open socket.
    pub fn is_online(&self) -> bool {
        self.handle.as_ref().is_some_and(SocketHandle::is_open)
    }

    /// Browser sessions owned by this server, in connection order.
    pub fn clients(&self) -> &[ClientSession] {
        &self.clients
    }

    pub(crate) fn install_handle(&mut self, handle: SocketHandle) {
        self.handle = Some(handle);
    }

    /// Clears the handle only if it still refers to `conn_id`. Returns
    /// whether it did.
    pub(crate) fn clear_handle_if(&mut self, conn_id: ConnectionId) -> bool {
        if self.handle.as_ref().is_some_and(|h| h.id() == conn_id) {
            self.handle = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn push_client(&mut self, client: ClientSession) {
        self.clients.push(client);
    }

    pub(crate) fn remove_client(&mut self, conn_id: ConnectionId) -> Option<ClientSession> {
        let index = self.clients.iter().position(|c| c.handle.id() == conn_id)?;
        Some(self.clients.remove(index))
    }

    /// First session for `user_id`. During a same-user reconnect the older
    /// session comes first.
    pub fn client_by_user(&self, user_id: &UserId) -> Option<&ClientSession> {
        self.clients.iter().find(|c| &c.user_id == user_id)
    }

    /// Sends a frame to the plugin if it is online.
    pub(crate) fn notify(&self, frame: impl std::fmt::Display) -> bool {
        match &self.handle {
            Some(handle) if handle.is_open() => handle.send(frame),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientSession
// ---------------------------------------------------------------------------

/// One connected browser.
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub(crate) user_id: UserId,
    pub(crate) username: String,
    pub(crate) handle: SocketHandle,
}

impl ClientSession {
    /// The user id taken from the redeemed token.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Display name taken from the redeemed token.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The browser's socket.
    pub fn handle(&self) -> &SocketHandle {
        &self.handle
    }
}

// ---------------------------------------------------------------------------
// ConnectToken
// ---------------------------------------------------------------------------

/// An invitation minted by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectToken {
    /// The token string the browser presents.
    pub connect_id: ConnectId,
    /// User id the browser will be known by.
    pub user_id: UserId,
    /// Display name shown to the browser.
    pub username: String,
    /// The plugin that minted it.
    pub server_id: ServerId,
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// What a classified socket is bound to.
///
/// Exactly two roles exist, and a socket never changes role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// The socket is a plugin's.
    Server(ServerId),
    /// The socket is a browser's, owned by `server_id`.
    Client { server_id: ServerId, user_id: UserId },
}

/// Identity handed back to a browser after a successful redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redeemed {
    pub user_id: UserId,
    pub username: String,
    pub server_id: ServerId,
}

/// What a closed socket had been bound to, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closed {
    /// A plugin socket closed. `was_current` is false when the socket had
    /// already been superseded by a newer handshake.
    Server { server_id: ServerId, was_current: bool },
    /// A browser socket closed. `notified` says whether the plugin was
    /// told `User disconnected`.
    Client { server_id: ServerId, user_id: UserId, notified: bool },
    /// The socket never completed a handshake.
    Unbound,
}
