//! Runs one browser session against a relay.
//!
//! The driver owns the relay socket and multiplexes four sources in a
//! single `tokio::select!` loop:
//!
//! - relay frames, applied to [`ClientState`],
//! - directives the state queued for the relay,
//! - events from the media backend,
//! - the [`AuditSchedule`].

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};
use voicemesh_protocol::{ConnectId, Handshake};

use crate::{
    AuditSchedule, ClientState, Effect, MediaEvent, Page, PeerMedia, ReconcileError,
    Reconciler, ReconcilerConfig,
};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The session is over and this page is showing.
    Ended(Page),
    /// The relay asked for a fresh session.
    Reload,
}

/// Drives a [`ClientState`] over a relay socket.
pub struct ClientDriver<M: PeerMedia> {
    media: M,
    media_events: mpsc::UnboundedReceiver<MediaEvent<M::Call>>,
    config: ReconcilerConfig,
}

impl<M: PeerMedia> ClientDriver<M> {
    /// `media_events` is where the backend reports incoming and ended
    /// calls.
    pub fn new(
        media: M,
        media_events: mpsc::UnboundedReceiver<MediaEvent<M::Call>>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            media,
            media_events,
            config,
        }
    }

    /// Connects to `relay_url`, presents `connect_id` and runs until the
    /// session ends.
    ///
    /// An unreachable relay ends the session on
    /// [`Page::ConnectionLost`], the same as losing it later.
    ///
    /// # Errors
    /// [`ReconcileError::RelayUrl`] if `relay_url` is not a usable
    /// WebSocket URL.
    pub async fn run(
        self,
        relay_url: &str,
        connect_id: &ConnectId,
    ) -> Result<Outcome, ReconcileError> {
        let Self {
            media,
            mut media_events,
            config,
        } = self;

        let (upstream_tx, mut upstream_rx) = mpsc::unbounded_channel();
        let reconciler = Reconciler::new(media, upstream_tx, &config, Instant::now());
        let mut state = ClientState::new(reconciler);
        state.connecting();

        let socket = match tokio_tungstenite::connect_async(relay_url).await {
            Ok((socket, _)) => socket,
            Err(e @ (WsError::Url(_) | WsError::HttpFormat(_))) => {
                return Err(ReconcileError::RelayUrl(e));
            }
            Err(e) => {
                warn!(relay_url, error = %e, "relay unreachable");
                state.on_connection_lost();
                return Ok(Outcome::Ended(state.page()));
            }
        };
        let (mut sink, mut stream) = socket.split();
        info!(relay_url, "connected to relay");

        let hello = Handshake::User {
            connect_id: connect_id.clone(),
        };
        if let Err(e) = sink.send(Message::text(hello.to_string())).await {
            warn!(error = %e, "relay socket failed during handshake");
            state.on_connection_lost();
            return Ok(Outcome::Ended(state.page()));
        }

        let mut schedule = AuditSchedule::new(&config);

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match state.on_frame(text.as_str(), Instant::now()) {
                            Effect::Continue => {}
                            Effect::Reload => {
                                info!("relay requested reload");
                                state.on_connection_lost();
                                let _ = sink.send(Message::Close(None)).await;
                                return Ok(Outcome::Reload);
                            }
                            Effect::Close { reason } => {
                                while let Ok(directive) = upstream_rx.try_recv() {
                                    let _ = sink.send(Message::text(directive.to_string())).await;
                                }
                                let frame = reason.map(|r| CloseFrame {
                                    code: CloseCode::Normal,
                                    reason: r.to_owned().into(),
                                });
                                let _ = sink.send(Message::Close(frame)).await;
                                return Ok(Outcome::Ended(state.page()));
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        state.on_connection_lost();
                        return Ok(Outcome::Ended(state.page()));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "relay socket failed");
                        state.on_connection_lost();
                        return Ok(Outcome::Ended(state.page()));
                    }
                },
                Some(directive) = upstream_rx.recv() => {
                    if let Err(e) = sink.send(Message::text(directive.to_string())).await {
                        debug!(error = %e, "relay send failed");
                        state.on_connection_lost();
                        return Ok(Outcome::Ended(state.page()));
                    }
                }
                Some(event) = media_events.recv() => state.on_media_event(event),
                tick = schedule.wait_for_audit() => {
                    let audit = state.audit(tick.at);
                    debug!(audit = tick.count, %audit, converged = audit.converged(), "audit");
                }
            }
        }
    }
}
