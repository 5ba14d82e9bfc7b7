//! Socket handles: how the registry talks to a connection it does not own.
//!
//! The connection handler owns the real socket. The registry only holds a
//! [`SocketHandle`], which pushes [`Outbound`] items onto an unbounded
//! channel drained by that connection's writer task. Pushing never blocks,
//! so registry operations can send while holding the registry lock.
//!
//! A handle is "open" for as long as its writer task is alive. Once the
//! writer exits (socket closed, errored, or closed by the relay) the
//! receiver is dropped and every further send is skipped.

use std::fmt;

use tokio::sync::mpsc;
use voicemesh_transport::ConnectionId;

/// Work item for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send one text frame.
    Frame(String),
    /// Close the socket with an optional reason, then stop writing.
    Close(Option<String>),
}

/// Receiving half handed to a connection's writer task.
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// Cloneable, non-owning reference to one live socket.
#[derive(Clone)]
pub struct SocketHandle {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SocketHandle {
    /// Creates a handle and the receiver its writer task should drain.
    pub fn channel(id: ConnectionId) -> (Self, OutboundReceiver) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (Self { id, outbound }, rx)
    }

    /// The connection this handle refers to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the socket's writer is still accepting frames.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queues a frame. Returns `false` (and drops the frame) if the socket
    /// is no longer open.
    pub fn send(&self, frame: impl fmt::Display) -> bool {
        self.outbound.send(Outbound::Frame(frame.to_string())).is_ok()
    }

    /// Asks the writer to close the socket.
    pub fn close(&self, reason: Option<&str>) {
        let _ = self.outbound.send(Outbound::Close(reason.map(str::to_owned)));
    }
}

impl fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandle")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_while_receiver_alive_queues_frame() {
        let (handle, mut rx) = SocketHandle::channel(ConnectionId::new(1));
        assert!(handle.is_open());
        assert!(handle.send("resync"));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Frame("resync".into()));
    }

    #[test]
    fn test_send_after_receiver_dropped_is_skipped() {
        let (handle, rx) = SocketHandle::channel(ConnectionId::new(1));
        drop(rx);
        assert!(!handle.is_open());
        assert!(!handle.send("resync"));
    }

    #[test]
    fn test_close_queues_reason() {
        let (handle, mut rx) = SocketHandle::channel(ConnectionId::new(3));
        handle.close(Some("superseded"));
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Close(Some("superseded".into()))
        );
    }
}
