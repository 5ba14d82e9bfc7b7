//! Relay startup and the accept loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use voicemesh_registry::Registry;
use voicemesh_transport::{Transport, TransportError, Upgrade, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{RelayConfig, VoicemeshError};

/// Shared relay state passed to each connection handler task.
///
/// Every registry operation runs under this one lock, so handshakes,
/// routing and close handling never interleave.
pub(crate) struct RelayState {
    pub(crate) registry: Mutex<Registry>,
}

/// Collects a [`RelayConfig`] piecewise, then binds it.
pub struct RelayServerBuilder {
    config: RelayConfig,
}

impl RelayServerBuilder {
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the relay to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the path prefix left to the peer-connection broker.
    pub fn broker_prefix(mut self, prefix: &str) -> Self {
        self.config.broker_prefix = prefix.to_string();
        self
    }

    /// Sets how long a new peer may take to finish its upgrade.
    pub fn upgrade_timeout(mut self, timeout: Duration) -> Self {
        self.config.upgrade_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Binds the listener. The relay starts accepting on
    /// [`RelayServer::run`].
    pub async fn build(self) -> Result<RelayServer, VoicemeshError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr)
            .await?
            .with_broker_prefix(self.config.broker_prefix)
            .with_upgrade_timeout(Duration::from_secs(self.config.upgrade_timeout_secs));

        let state = Arc::new(RelayState {
            registry: Mutex::new(Registry::new()),
        });

        Ok(RelayServer { transport, state })
    }
}

impl Default for RelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A relay whose listener is bound but not yet accepting.
pub struct RelayServer {
    transport: WebSocketTransport,
    state: Arc<RelayState>,
}

impl RelayServer {
    pub fn builder() -> RelayServerBuilder {
        RelayServerBuilder::new()
    }

    /// Returns the local address the relay is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Accepts sockets forever, one handler task each. Failed upgrades are
    /// logged and do not stop the loop.
    pub async fn run(mut self) -> Result<(), VoicemeshError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "relay accepting");

        loop {
            let pending = match self.transport.accept().await {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    continue;
                }
            };
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let peer = pending.peer_addr();
                let conn = match pending.upgrade().await {
                    Ok(conn) => conn,
                    Err(TransportError::RouteRejected(path)) => {
                        tracing::info!(%peer, %path, "refused upgrade on broker path");
                        return;
                    }
                    Err(e) => {
                        tracing::debug!(%peer, error = %e, "upgrade failed");
                        return;
                    }
                };
                if let Err(e) = handle_connection(conn, state).await {
                    tracing::debug!(error = %e, "socket handler failed");
                }
            });
        }
    }
}
