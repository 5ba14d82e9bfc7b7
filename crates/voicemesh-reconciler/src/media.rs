//! The seam between the reconciler and whatever carries audio.
//!
//! The reconciler decides *which* peers to talk to. A [`PeerMedia`]
//! backend does the talking: it places outbound calls, answers inbound
//! ones with the local microphone, and reports calls that end through
//! [`MediaEvent`]s.

use std::fmt;

use voicemesh_protocol::UserId;

use crate::ReconcileError;

/// Opaque identifier of one call, unique within a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// One bidirectional audio call with a remote peer.
pub trait MediaCall: Send + 'static {
    /// The backend's id for this call.
    fn id(&self) -> CallId;

    /// The remote peer's user id.
    fn peer(&self) -> &UserId;

    /// Whether media is currently flowing.
    fn is_open(&self) -> bool;

    /// Sets the playback gain for the remote audio.
    fn set_gain(&mut self, gain: f32);

    /// Ends the call. Calling it twice is harmless.
    fn close(&mut self);
}

/// A peer-to-peer media backend.
pub trait PeerMedia: Send + 'static {
    type Call: MediaCall;

    /// Originates a call to `peer` carrying the local microphone.
    fn call(&mut self, peer: &UserId) -> Result<Self::Call, ReconcileError>;
}

/// Something the backend observed on its own.
#[derive(Debug)]
pub enum MediaEvent<C> {
    /// A remote peer called us and the backend answered.
    Incoming(C),
    /// A call ended from the remote side or the network.
    Closed { peer: UserId, call: CallId },
}
