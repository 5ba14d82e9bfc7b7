//! Browser session state: the reconciler plus the page and identity.
//!
//! [`ClientState`] consumes relay frames and media events and tells the
//! driver what to do with the socket. It performs no I/O itself.

use tokio::time::Instant;
use tracing::{debug, info};
use voicemesh_protocol::{ClientDirective, ToClient, UserId, SUPERSEDED_CLOSE_REASON};

use crate::{Audit, MediaEvent, Page, PeerMedia, Reconciler};

/// What the driver should do after a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Keep going.
    Continue,
    /// Close the relay socket with the given reason and stop.
    Close { reason: Option<&'static str> },
    /// Stop and start a fresh session.
    Reload,
}

/// Everything the browser knows about its session.
#[derive(Debug)]
pub struct ClientState<M: PeerMedia> {
    reconciler: Reconciler<M>,
    page: Page,
    identity: Option<(UserId, String)>,
}

impl<M: PeerMedia> ClientState<M> {
    pub fn new(reconciler: Reconciler<M>) -> Self {
        Self {
            reconciler,
            page: Page::Loading,
            identity: None,
        }
    }

    /// The relay socket is being opened.
    pub fn connecting(&mut self) {
        if self.page == Page::Loading {
            self.page = Page::Connecting;
        }
    }

    /// Parses and applies one relay frame. Unknown frames are ignored.
    pub fn on_frame(&mut self, frame: &str, now: Instant) -> Effect {
        match frame.parse::<ToClient>() {
            Ok(msg) => self.apply(msg, now),
            Err(e) => {
                debug!(error = %e, "ignoring relay frame");
                Effect::Continue
            }
        }
    }

    /// Applies one relay message.
    pub fn apply(&mut self, msg: ToClient, now: Instant) -> Effect {
        match msg {
            ToClient::Welcome { user_id, username } => {
                info!(%user_id, %username, "welcomed by relay");
                self.identity = Some((user_id, username));
                self.reconciler.set_plugin_connected(true);
                if self.page == Page::Connecting {
                    self.page = Page::Ready;
                }
            }
            ToClient::HasPluginConnection(connected) => {
                self.reconciler.set_plugin_connected(connected);
            }
            ToClient::ConnectTo(peer) => self.reconciler.connect_to(peer, now),
            ToClient::WaitFor(peer) => self.reconciler.wait_for(peer, now),
            ToClient::Disconnect(peer) => self.reconciler.disconnect(&peer),
            ToClient::Volume { user_id, volume } => {
                self.reconciler.set_volume(&user_id, volume.value());
            }
            ToClient::Heartbeat => {
                self.reconciler
                    .send_upstream(ClientDirective::HeartbeatResponse);
            }
            ToClient::Resync => self.reconciler.resync(),
            ToClient::PeersInfo => {
                self.reconciler.request_report();
                self.reconciler.audit(now);
            }
            ToClient::Reload => return Effect::Reload,
            ToClient::InvalidLink => return self.finish(Page::InvalidLink, None),
            ToClient::LeftTheGame => return self.finish(Page::LeftTheGame, None),
            ToClient::NotOnServer => return self.finish(Page::NotOnServer, None),
            ToClient::ConnectedElsewhere => {
                return self.finish(Page::ConnectedElsewhere, Some(SUPERSEDED_CLOSE_REASON));
            }
        }
        Effect::Continue
    }

    /// Applies an event reported by the media backend.
    pub fn on_media_event(&mut self, event: MediaEvent<M::Call>) {
        if self.page.is_terminal() {
            return;
        }
        match event {
            MediaEvent::Incoming(call) => self.reconciler.accept_incoming(call),
            MediaEvent::Closed { peer, call } => self.reconciler.call_closed(&peer, call),
        }
    }

    /// Runs one consistency audit.
    pub fn audit(&mut self, now: Instant) -> Audit {
        self.reconciler.audit(now)
    }

    /// The relay socket dropped without a terminal directive.
    pub fn on_connection_lost(&mut self) {
        let page = self.page.after_connection_lost();
        if page != self.page {
            info!(from = %self.page, "relay connection lost");
            self.page = page;
        }
        self.reconciler.close_all();
    }

    /// The page currently shown.
    pub fn page(&self) -> Page {
        self.page
    }

    /// Id and username from the relay's welcome.
    pub fn identity(&self) -> Option<(&UserId, &str)> {
        self.identity.as_ref().map(|(id, name)| (id, name.as_str()))
    }

    /// The peer reconciler.
    pub fn reconciler(&self) -> &Reconciler<M> {
        &self.reconciler
    }

    fn finish(&mut self, page: Page, reason: Option<&'static str>) -> Effect {
        info!(%page, "session ended by relay");
        self.page = page;
        self.reconciler.close_all();
        Effect::Close { reason }
    }
}
