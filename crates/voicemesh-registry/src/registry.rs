//! The connection registry: every plugin, token and browser the relay knows.
//!
//! # Concurrency note
//!
//! `Registry` is NOT thread-safe by itself. It is a plain struct of
//! `HashMap`s, owned by the relay state behind a single mutex. Every
//! operation runs to completion under that lock, so a token redemption and
//! a close on the same server can never interleave. Operations only push
//! onto socket channels (see [`SocketHandle`]); they never wait on I/O.

use std::collections::HashMap;

use voicemesh_protocol::{
    ClientDirective, ConnectId, ServerDirective, ServerId, ToClient, ToServer,
    UserId, SUPERSEDED_CLOSE_REASON,
};
use voicemesh_transport::ConnectionId;

use crate::{
    Binding, ClientSession, Closed, ConnectToken, Redeemed, RegistryError,
    ServerSession, SocketHandle,
};

/// All live relay state.
///
/// ## Lifecycle of a browser
///
/// ```text
/// plugin: New connect id ──▶ mint token
/// browser: I am a user ──▶ redeem_token() ──▶ [ClientSession bound]
///                                                   │
///                                    socket closed ─┴─▶ on_close()
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    /// Every plugin that ever completed a handshake. Never shrinks.
    servers: HashMap<ServerId, ServerSession>,

    /// Every token ever minted.
    ///
    /// Tokens are kept after redemption and after their server goes away,
    /// so this grows for the life of the process. Whether tokens should be
    /// single-use is undecided; see DESIGN.md.
    tokens: HashMap<ConnectId, ConnectToken>,

    /// Dispatch index from a classified socket to its session.
    bindings: HashMap<ConnectionId, Binding>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // =====================================================================
    // Handshakes
    // =====================================================================

    /// Binds `handle` as the socket of plugin `server_id`.
    ///
    /// Creates the server session on first sight. If the session already
    /// has an open socket, that socket is closed before the new one is
    /// installed.
    pub fn register_server(&mut self, server_id: ServerId, handle: SocketHandle) {
        let conn_id = handle.id();
        let server = self
            .servers
            .entry(server_id.clone())
            .or_insert_with(|| {
                tracing::info!(%server_id, "new server session");
                ServerSession::new(server_id.clone())
            });

        if let Some(previous) = server.handle().filter(|h| h.is_open()) {
            tracing::info!(
                %server_id,
                old = %previous.id(),
                new = %conn_id,
                "server reconnected, closing previous socket"
            );
            previous.close(None);
        }
        server.install_handle(handle);

        // Browsers that stayed while the plugin was away learn it is back.
        for client in server.clients() {
            client.handle().send(ToClient::HasPluginConnection(true));
        }

        self.bindings.insert(conn_id, Binding::Server(server_id.clone()));
        tracing::info!(%server_id, %conn_id, "server registered");
    }

    /// Redeems `connect_id` for the browser on `handle`.
    ///
    /// On success the browser is bound to the token's server, the plugin
    /// is told `User connected …` and the browser is told `Welcome …`.
    ///
    /// # Errors
    /// - [`RegistryError::UnknownToken`]: no such token
    /// - [`RegistryError::ServerOffline`]: the minting plugin has no open
    ///   socket
    ///
    /// On error nothing is bound; the caller replies `Invalid link` and
    /// closes the socket.
    pub fn redeem_token(
        &mut self,
        connect_id: &ConnectId,
        handle: SocketHandle,
    ) -> Result<Redeemed, RegistryError> {
        let token = self
            .tokens
            .get(connect_id)
            .ok_or_else(|| RegistryError::UnknownToken(connect_id.clone()))?;

        let server = self
            .servers
            .get_mut(&token.server_id)
            .filter(|s| s.is_online())
            .ok_or_else(|| RegistryError::ServerOffline(token.server_id.clone()))?;

        let conn_id = handle.id();
        let redeemed = Redeemed {
            user_id: token.user_id.clone(),
            username: token.username.clone(),
            server_id: token.server_id.clone(),
        };

        server.push_client(ClientSession {
            user_id: redeemed.user_id.clone(),
            username: redeemed.username.clone(),
            handle: handle.clone(),
        });
        self.bindings.insert(
            conn_id,
            Binding::Client {
                server_id: redeemed.server_id.clone(),
                user_id: redeemed.user_id.clone(),
            },
        );

        server.notify(ToServer::UserConnected {
            user_id: redeemed.user_id.clone(),
            username: redeemed.username.clone(),
        });
        handle.send(ToClient::Welcome {
            user_id: redeemed.user_id.clone(),
            username: redeemed.username.clone(),
        });

        tracing::info!(
            server_id = %redeemed.server_id,
            user_id = %redeemed.user_id,
            %conn_id,
            "user connected"
        );
        Ok(redeemed)
    }

    // =====================================================================
    // Bound-socket traffic
    // =====================================================================

    /// What `conn_id` is bound to, if anything.
    pub fn binding(&self, conn_id: ConnectionId) -> Option<&Binding> {
        self.bindings.get(&conn_id)
    }

    /// Applies a directive from the plugin socket `conn_id`.
    ///
    /// Only the server's current socket may speak for it. A socket that
    /// was replaced by a newer handshake stays bound until it closes, but
    /// everything it sends is refused.
    ///
    /// # Errors
    /// - [`RegistryError::NotBound`]: `conn_id` is not a plugin socket
    /// - [`RegistryError::Superseded`]: another socket now owns the server
    /// - [`RegistryError::UnknownRecipient`]: a `To` names a user with no
    ///   session on this server. The payload is dropped and the plugin is
    ///   not told.
    pub fn handle_server_directive(
        &mut self,
        conn_id: ConnectionId,
        directive: ServerDirective,
    ) -> Result<(), RegistryError> {
        let Some(Binding::Server(server_id)) = self.bindings.get(&conn_id) else {
            return Err(RegistryError::NotBound(conn_id));
        };
        let server_id = server_id.clone();
        let current = self
            .servers
            .get(&server_id)
            .and_then(ServerSession::handle)
            .map(SocketHandle::id);
        if current != Some(conn_id) {
            return Err(RegistryError::Superseded { server_id, conn_id });
        }
        let server_id = &server_id;

        match directive {
            ServerDirective::To { user_id, payload } => {
                let client = self
                    .servers
                    .get(server_id)
                    .and_then(|s| s.client_by_user(&user_id))
                    .ok_or_else(|| RegistryError::UnknownRecipient {
                        server_id: server_id.clone(),
                        user_id: user_id.clone(),
                    })?;
                tracing::debug!(%server_id, %user_id, "forwarding to user");
                client.handle().send(payload);
            }
            ServerDirective::NewConnectId {
                connect_id,
                user_id,
                username,
            } => {
                self.mint_token(ConnectToken {
                    connect_id,
                    user_id,
                    username,
                    server_id: server_id.clone(),
                });
            }
            ServerDirective::Resync => {
                self.send_to_all(server_id, &ToClient::Resync);
            }
            ServerDirective::PeersInfo => {
                self.send_to_all(server_id, &ToClient::PeersInfo);
            }
        }
        Ok(())
    }

    /// Applies a directive from the browser on `conn_id`.
    ///
    /// Everything a browser says is forwarded to its plugin, tagged with
    /// the browser's user id. Nothing is forwarded while the plugin is
    /// offline.
    pub fn handle_client_directive(
        &mut self,
        conn_id: ConnectionId,
        directive: ClientDirective,
    ) -> Result<(), RegistryError> {
        let Some(Binding::Client { server_id, user_id }) = self.bindings.get(&conn_id)
        else {
            return Err(RegistryError::NotBound(conn_id));
        };
        let Some(server) = self.servers.get(server_id) else {
            return Err(RegistryError::NotBound(conn_id));
        };

        let user_id = user_id.clone();
        let notice = match directive {
            ClientDirective::Warning { text } => {
                tracing::debug!(%server_id, %user_id, %text, "warning from user");
                ToServer::WarningFromUser { user_id, text }
            }
            ClientDirective::ConnectedPeers { report } => {
                ToServer::PeerInfo { user_id, report }
            }
            ClientDirective::HeartbeatResponse => {
                ToServer::HeartbeatResponseFrom { user_id }
            }
        };
        if !server.notify(&notice) {
            tracing::debug!(%server_id, "server offline, dropping user notice");
        }
        Ok(())
    }

    /// Sends `frame` to every browser of `server_id` whose socket is open.
    ///
    /// Closed sockets are skipped; nothing is buffered. Returns how many
    /// browsers the frame was queued for.
    pub fn send_to_all(&self, server_id: &ServerId, frame: &ToClient) -> usize {
        let Some(server) = self.servers.get(server_id) else {
            return 0;
        };
        let mut delivered = 0;
        for client in server.clients() {
            if client.handle().is_open() && client.handle().send(frame) {
                delivered += 1;
            }
        }
        delivered
    }

    // =====================================================================
    // Teardown
    // =====================================================================

    /// Cleans up after the socket `conn_id` closed.
    ///
    /// - Browser: removed from its server. The plugin is told
    ///   `User disconnected <id>` unless `reason` is the supersession
    ///   reason, in which case a newer session for the same user is
    ///   already in place and the notice would be wrong.
    /// - Plugin: the session stays but loses its handle, and its browsers
    ///   are told `Has plugin connection? false`. A socket that had
    ///   already been superseded by a newer handshake changes nothing.
    pub fn on_close(&mut self, conn_id: ConnectionId, reason: Option<&str>) -> Closed {
        let Some(binding) = self.bindings.remove(&conn_id) else {
            tracing::debug!(%conn_id, "unclassified socket closed");
            return Closed::Unbound;
        };

        match binding {
            Binding::Client { server_id, user_id } => {
                let Some(server) = self.servers.get_mut(&server_id) else {
                    return Closed::Unbound;
                };
                server.remove_client(conn_id);

                let superseded = reason == Some(SUPERSEDED_CLOSE_REASON);
                let notified = !superseded
                    && server.notify(ToServer::UserDisconnected {
                        user_id: user_id.clone(),
                    });
                tracing::info!(
                    %server_id, %user_id, %conn_id, superseded,
                    "user disconnected"
                );
                Closed::Client {
                    server_id,
                    user_id,
                    notified,
                }
            }
            Binding::Server(server_id) => {
                let Some(server) = self.servers.get_mut(&server_id) else {
                    return Closed::Unbound;
                };
                let was_current = server.clear_handle_if(conn_id);
                if was_current {
                    tracing::info!(%server_id, %conn_id, "server went offline");
                    self.send_to_all(&server_id, &ToClient::HasPluginConnection(false));
                } else {
                    tracing::debug!(%server_id, %conn_id, "superseded server socket closed");
                }
                Closed::Server {
                    server_id,
                    was_current,
                }
            }
        }
    }

    // =====================================================================
    // Queries
    // =====================================================================

    /// Looks up a server session.
    pub fn server(&self, server_id: &ServerId) -> Option<&ServerSession> {
        self.servers.get(server_id)
    }

    /// Number of server sessions (online or not).
    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Looks up a token.
    pub fn token(&self, connect_id: &ConnectId) -> Option<&ConnectToken> {
        self.tokens.get(connect_id)
    }

    /// Number of tokens ever minted and still held.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Number of browser sessions on `server_id`.
    pub fn client_count(&self, server_id: &ServerId) -> usize {
        self.servers.get(server_id).map_or(0, |s| s.clients().len())
    }

    /// Whether `user_id` has at least one session on `server_id`.
    pub fn has_client(&self, server_id: &ServerId, user_id: &UserId) -> bool {
        self.servers
            .get(server_id)
            .is_some_and(|s| s.client_by_user(user_id).is_some())
    }

    fn mint_token(&mut self, token: ConnectToken) {
        // First token minted under an id wins.
        if self.tokens.contains_key(&token.connect_id) {
            tracing::warn!(
                connect_id = %token.connect_id,
                server_id = %token.server_id,
                "connect id already minted, keeping the first"
            );
            return;
        }
        tracing::debug!(
            connect_id = %token.connect_id,
            user_id = %token.user_id,
            server_id = %token.server_id,
            "connect id minted"
        );
        self.tokens.insert(token.connect_id.clone(), token);
    }
}

// =========================================================================
// Tests
// =========================================================================
