//! Reconciliation of live peer links against the plugin's expectations.
//!
//! The plugin tells the browser who it should be talking to (`Connect to`,
//! `Wait for`, `Disconnect`). The browser keeps two collections:
//!
//! - the **expected** set, rebuilt from those directives, and
//! - the **live** links, one per remote peer, built from actual calls.
//!
//! Every audit compares the two. A converged audit has as many live links
//! as expected peers and every one of them open. Anything else is a
//! desync; it gets reported upstream at most once per report window, and
//! links whose call is no longer open are dropped in the same pass so
//! the plugin's next `Connect to` can rebuild them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use voicemesh_protocol::{ClientDirective, UserId};

use crate::{CallId, MediaCall, PeerMedia, ReconcilerConfig};

/// Channel carrying directives back to the relay.
pub type UpstreamSender = mpsc::UnboundedSender<ClientDirective>;

// ---------------------------------------------------------------------------
// PeerLink
// ---------------------------------------------------------------------------

/// A live media link with one remote peer.
#[derive(Debug)]
pub struct PeerLink<C> {
    call: C,
    gain: f32,
}

impl<C: MediaCall> PeerLink<C> {
    fn new(mut call: C) -> Self {
        // Remote audio stays silent until the plugin sends a volume.
        call.set_gain(0.0);
        Self { call, gain: 0.0 }
    }

    /// The underlying call.
    pub fn call(&self) -> &C {
        &self.call
    }

    /// Current playback gain.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Whether media is flowing on this link.
    pub fn is_open(&self) -> bool {
        self.call.is_open()
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
        self.call.set_gain(gain);
    }

    fn close(mut self) {
        self.call.close();
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Counts taken by one audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Audit {
    /// Live links.
    pub live: usize,
    /// Live links whose call is open.
    pub open: usize,
    /// Expected peers.
    pub expected: usize,
}

impl Audit {
    /// Whether live links, open calls and expectations all agree.
    pub fn converged(&self) -> bool {
        self.live == self.expected && self.open == self.expected
    }

    /// The payload of a `connected-peers` report.
    pub fn report(&self) -> String {
        format!(
            "{} {} / {} / {}",
            self.converged(),
            self.live,
            self.open,
            self.expected
        )
    }
}

impl fmt::Display for Audit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} / {}", self.live, self.open, self.expected)
    }
}

// ---------------------------------------------------------------------------
// Report window
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ReportWindow {
    last: Instant,
    interval: Duration,
}

impl ReportWindow {
    fn new(now: Instant, interval: Duration) -> Self {
        Self {
            last: now,
            interval,
        }
    }

    /// Pushes the window forward, suppressing reports for a full interval.
    fn defer(&mut self, now: Instant) {
        self.last = now;
    }

    /// Claims the window if a full interval has passed.
    fn claim(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) > self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Browser-side peer state.
pub struct Reconciler<M: PeerMedia> {
    media: M,
    upstream: UpstreamSender,
    expected: BTreeSet<UserId>,
    live: BTreeMap<UserId, PeerLink<M::Call>>,
    plugin_connected: bool,
    report_requested: bool,
    desync: ReportWindow,
}

impl<M: PeerMedia> fmt::Debug for Reconciler<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("expected", &self.expected)
            .field("live", &self.live.keys().collect::<Vec<_>>())
            .field("plugin_connected", &self.plugin_connected)
            .finish_non_exhaustive()
    }
}

impl<M: PeerMedia> Reconciler<M> {
    pub fn new(
        media: M,
        upstream: UpstreamSender,
        config: &ReconcilerConfig,
        now: Instant,
    ) -> Self {
        Self {
            media,
            upstream,
            expected: BTreeSet::new(),
            live: BTreeMap::new(),
            plugin_connected: false,
            report_requested: false,
            desync: ReportWindow::new(now, config.desync_report_interval),
        }
    }

    /// `Connect to <peer>`: expect the peer and originate a call.
    pub fn connect_to(&mut self, peer: UserId, now: Instant) {
        self.expected.insert(peer.clone());
        self.desync.defer(now);
        match self.media.call(&peer) {
            Ok(call) => {
                if self.replace_link(call) {
                    self.warn_upstream(format!(
                        "Connecting a user that already exists, replacing it: {peer}"
                    ));
                }
                debug!(%peer, "calling peer");
            }
            Err(e) => self.warn_upstream(format!("Could not call {peer}: {e}")),
        }
    }

    /// `Wait for <peer>`: expect the peer without calling.
    pub fn wait_for(&mut self, peer: UserId, now: Instant) {
        debug!(%peer, "waiting for peer to call");
        self.expected.insert(peer);
        self.desync.defer(now);
    }

    /// `Disconnect <peer>`: stop expecting the peer and tear its link down.
    pub fn disconnect(&mut self, peer: &UserId) {
        self.expected.remove(peer);
        match self.live.remove(peer) {
            Some(link) => {
                debug!(%peer, "disconnecting peer");
                link.close();
            }
            None => self.warn_upstream(format!(
                "Tried to disconnect user that wasn't here: {peer}"
            )),
        }
    }

    /// `Volume: <peer>: <gain>`: retune an existing link. Unknown peers are
    /// ignored.
    pub fn set_volume(&mut self, peer: &UserId, gain: f32) {
        match self.live.get_mut(peer) {
            Some(link) => link.set_gain(gain),
            None => debug!(%peer, "volume for unknown peer ignored"),
        }
    }

    /// `Has plugin connection? <bool>`.
    pub fn set_plugin_connected(&mut self, connected: bool) {
        if self.plugin_connected != connected {
            info!(connected, "plugin connection changed");
        }
        self.plugin_connected = connected;
    }

    /// `resync`: tear everything down. The plugin re-issues directives
    /// afterwards.
    pub fn resync(&mut self) {
        info!(
            live = self.live.len(),
            expected = self.expected.len(),
            "resync requested, dropping all links"
        );
        self.close_all();
        self.expected.clear();
    }

    /// `peersinfo`: the next audit reports its counts upstream.
    pub fn request_report(&mut self) {
        self.report_requested = true;
    }

    /// A remote peer called and the backend answered. Any existing link to
    /// that peer is torn down first.
    pub fn accept_incoming(&mut self, call: M::Call) {
        let peer = call.peer().clone();
        if self.replace_link(call) {
            self.warn_upstream(format!(
                "Got call for already connected user, replacing them: {peer}"
            ));
        }
        debug!(%peer, "answered call");
    }

    /// A call ended on its own. Only the link still carrying that call is
    /// removed; a call that was already replaced is ignored.
    pub fn call_closed(&mut self, peer: &UserId, call_id: CallId) {
        match self.live.get(peer) {
            Some(link) if link.call.id() == call_id => {
                debug!(%peer, %call_id, "call ended, dropping link");
                if let Some(link) = self.live.remove(peer) {
                    link.close();
                }
            }
            Some(_) => debug!(%peer, %call_id, "replaced call ended"),
            None => self.warn_upstream(format!(
                "Tried to disconnect user that wasn't here: {peer}"
            )),
        }
    }

    /// Runs one consistency audit.
    pub fn audit(&mut self, now: Instant) -> Audit {
        let audit = Audit {
            live: self.live.len(),
            open: self.live.values().filter(|l| l.is_open()).count(),
            expected: self.expected.len(),
        };

        if self.report_requested {
            self.report_requested = false;
            self.send_upstream(ClientDirective::ConnectedPeers {
                report: audit.report(),
            });
        }

        if !audit.converged() {
            debug!(%audit, "peers out of sync");
            if self.desync.claim(now) {
                self.warn_upstream(format!(
                    "desync ({audit}): connected: {} | expected: {}",
                    join(self.live.keys()),
                    join(self.expected.iter())
                ));
                self.prune_dead_links();
            }
        }

        audit
    }

    /// Closes every link. Expectations are kept.
    pub fn close_all(&mut self) {
        for (_, link) in std::mem::take(&mut self.live) {
            link.close();
        }
    }

    /// Peers the plugin expects, sorted.
    pub fn expected(&self) -> impl Iterator<Item = &UserId> {
        self.expected.iter()
    }

    /// Peers with a live link, sorted.
    pub fn live_peers(&self) -> impl Iterator<Item = &UserId> {
        self.live.keys()
    }

    /// The live link for `peer`.
    pub fn link(&self, peer: &UserId) -> Option<&PeerLink<M::Call>> {
        self.live.get(peer)
    }

    /// Last known state of the plugin's relay socket.
    pub fn plugin_connected(&self) -> bool {
        self.plugin_connected
    }

    /// The media backend.
    pub fn media(&self) -> &M {
        &self.media
    }

    pub(crate) fn send_upstream(&self, directive: ClientDirective) {
        if self.upstream.send(directive).is_err() {
            debug!("upstream closed, directive dropped");
        }
    }

    fn warn_upstream(&self, text: String) {
        warn!("{text}");
        self.send_upstream(ClientDirective::Warning { text });
    }

    /// Installs a link for the call's peer, closing any previous one.
    /// Returns whether a previous link existed.
    fn replace_link(&mut self, call: M::Call) -> bool {
        let peer = call.peer().clone();
        let replaced = match self.live.remove(&peer) {
            Some(old) => {
                old.close();
                true
            }
            None => false,
        };
        self.live.insert(peer, PeerLink::new(call));
        replaced
    }

    fn prune_dead_links(&mut self) {
        let dead: Vec<UserId> = self
            .live
            .iter()
            .filter(|(_, link)| !link.is_open())
            .map(|(peer, _)| peer.clone())
            .collect();
        for peer in dead {
            if let Some(link) = self.live.remove(&peer) {
                link.close();
            }
            self.warn_upstream(format!("{peer} was not connected, removing them."));
        }
    }
}

fn join<'a>(ids: impl Iterator<Item = &'a UserId>) -> String {
    ids.map(UserId::as_str).collect::<Vec<_>>().join(", ")
}
