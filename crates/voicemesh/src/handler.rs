//! Per-connection handler: reader loop, writer task and close cleanup.
//!
//! Each accepted socket gets two Tokio tasks:
//!   1. The reader (this handler) receives frames and dispatches them
//!      under the registry lock.
//!   2. The writer drains the socket's [`OutboundReceiver`], so anything
//!      holding a [`SocketHandle`] can send without awaiting.
//!
//! When the reader stops, the close guard tells the registry.

use std::sync::Arc;

use voicemesh_registry::{Closed, Outbound, OutboundReceiver, SocketHandle};
use voicemesh_transport::{Connection, ConnectionId, Received, WebSocketConnection};

use crate::dispatch::{dispatch, Dispatched};
use crate::server::RelayState;
use crate::VoicemeshError;

/// Drop guard that runs registry close handling when the handler exits.
///
/// Since `Drop` is synchronous, we spawn a fire-and-forget task for the
/// async lock.
struct CloseGuard {
    conn_id: ConnectionId,
    reason: Option<String>,
    state: Arc<RelayState>,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let reason = self.reason.take();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let closed = state
                .registry
                .lock()
                .await
                .on_close(conn_id, reason.as_deref());
            match closed {
                Closed::Server {
                    server_id,
                    was_current,
                } => tracing::info!(%conn_id, %server_id, was_current, "server socket closed"),
                Closed::Client {
                    server_id,
                    user_id,
                    notified,
                } => tracing::info!(%conn_id, %server_id, %user_id, notified, "user socket closed"),
                Closed::Unbound => tracing::debug!(%conn_id, "unbound socket closed"),
            }
        });
    }
}

/// Handles a single socket from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<RelayState>,
) -> Result<(), VoicemeshError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, path = conn.path(), "handling new connection");

    let (handle, outbound) = SocketHandle::channel(conn_id);
    tokio::spawn(write_outbound(Arc::clone(&conn), outbound));

    let mut guard = CloseGuard {
        conn_id,
        reason: None,
        state: Arc::clone(&state),
    };

    loop {
        let frame = match conn.recv().await {
            Ok(Received::Frame(frame)) => frame,
            Ok(Received::Closed { reason }) => {
                tracing::debug!(%conn_id, ?reason, "connection closed");
                guard.reason = reason;
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Err(e.into());
            }
        };

        // Registry sends only enqueue, so the lock is never held across
        // socket I/O.
        let outcome = {
            let mut registry = state.registry.lock().await;
            dispatch(&mut registry, &handle, &frame)
        };

        match outcome {
            Dispatched::Classified(role) => tracing::debug!(%conn_id, ?role, "socket classified"),
            Dispatched::Rejected(_) => break,
            Dispatched::Routed | Dispatched::Failed(_) | Dispatched::Ignored(_) => {}
        }
    }

    // guard drops here → registry close handling fires.
    Ok(())
}

/// Drains `outbound` onto the socket until the relay closes it, the
/// socket fails, or every handle is gone.
async fn write_outbound(conn: Arc<WebSocketConnection>, mut outbound: OutboundReceiver) {
    let conn_id = conn.id();
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(frame) => {
                if let Err(e) = conn.send(&frame).await {
                    tracing::debug!(%conn_id, error = %e, "send failed, stopping writer");
                    break;
                }
            }
            Outbound::Close(reason) => {
                if let Err(e) = conn.close(reason.as_deref()).await {
                    tracing::debug!(%conn_id, error = %e, "close failed");
                }
                break;
            }
        }
    }
}
