//! In-process media backend.
//!
//! Calls carry no audio. Their open/closed state and gain are shared with
//! the [`MemoryMedia`] that made them, so a test or a headless client can
//! inspect and steer them.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use voicemesh_protocol::UserId;

use crate::{CallId, MediaCall, PeerMedia, ReconcileError};

#[derive(Debug)]
struct CallState {
    id: CallId,
    peer: UserId,
    outbound: bool,
    open: AtomicBool,
    gain: AtomicU32,
}

#[derive(Debug, Default)]
struct Shared {
    next_id: AtomicU64,
    auto_open: AtomicBool,
    unreachable: Mutex<Vec<UserId>>,
    calls: Mutex<Vec<Arc<CallState>>>,
}

/// Media backend that keeps every call in memory.
///
/// Cloning yields another handle to the same backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedia {
    shared: Arc<Shared>,
}

/// A call made or answered by [`MemoryMedia`].
#[derive(Debug)]
pub struct MemoryCall {
    state: Arc<CallState>,
}

impl MemoryMedia {
    /// Creates a backend whose outbound calls start closed, as if the
    /// remote side had not answered yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose outbound calls are open immediately.
    pub fn auto_open() -> Self {
        let media = Self::default();
        media.shared.auto_open.store(true, Ordering::Relaxed);
        media
    }

    fn record(&self, peer: &UserId, outbound: bool, open: bool) -> MemoryCall {
        let id = CallId(self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let state = Arc::new(CallState {
            id,
            peer: peer.clone(),
            outbound,
            open: AtomicBool::new(open),
            gain: AtomicU32::new(0f32.to_bits()),
        });
        lock(&self.shared.calls).push(Arc::clone(&state));
        MemoryCall { state }
    }

    /// Simulates `peer` calling us. The returned call is already answered.
    pub fn incoming(&self, peer: &UserId) -> MemoryCall {
        self.record(peer, false, true)
    }

    /// Makes future outbound calls to `peer` fail.
    pub fn set_unreachable(&self, peer: &UserId) {
        lock(&self.shared.unreachable).push(peer.clone());
    }

    /// Opens or closes every call to `peer`.
    pub fn set_open(&self, peer: &UserId, open: bool) {
        for call in lock(&self.shared.calls).iter() {
            if &call.peer == peer {
                call.open.store(open, Ordering::Relaxed);
            }
        }
    }

    /// Number of outbound calls ever placed to `peer`.
    pub fn calls_to(&self, peer: &UserId) -> usize {
        lock(&self.shared.calls)
            .iter()
            .filter(|c| c.outbound && &c.peer == peer)
            .count()
    }

    /// Number of calls with `peer` that are currently open.
    pub fn open_calls_with(&self, peer: &UserId) -> usize {
        lock(&self.shared.calls)
            .iter()
            .filter(|c| &c.peer == peer && c.open.load(Ordering::Relaxed))
            .count()
    }

    /// Gain of the most recent call with `peer`.
    pub fn gain_of(&self, peer: &UserId) -> Option<f32> {
        lock(&self.shared.calls)
            .iter()
            .rev()
            .find(|c| &c.peer == peer)
            .map(|c| f32::from_bits(c.gain.load(Ordering::Relaxed)))
    }
}

impl PeerMedia for MemoryMedia {
    type Call = MemoryCall;

    fn call(&mut self, peer: &UserId) -> Result<MemoryCall, ReconcileError> {
        if lock(&self.shared.unreachable).contains(peer) {
            return Err(ReconcileError::Media(format!("peer {peer} is unreachable")));
        }
        let open = self.shared.auto_open.load(Ordering::Relaxed);
        Ok(self.record(peer, true, open))
    }
}

impl MediaCall for MemoryCall {
    fn id(&self) -> CallId {
        self.state.id
    }

    fn peer(&self) -> &UserId {
        &self.state.peer
    }

    fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Relaxed)
    }

    fn set_gain(&mut self, gain: f32) {
        self.state.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    fn close(&mut self) {
        self.state.open.store(false, Ordering::Relaxed);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
