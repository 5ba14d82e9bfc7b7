//! Browser-side session logic for Voicemesh.
//!
//! A browser opens one socket to the relay, presents its connect id and
//! then follows the plugin's directives about which peers to talk to.
//! Audio itself flows peer to peer through a [`PeerMedia`] backend.
//!
//! - [`Reconciler`] keeps live links in line with the expected peer set
//!   and reports drift upstream.
//! - [`ClientState`] adds the page and identity on top.
//! - [`ClientDriver`] runs the whole thing over a real relay socket.
//! - [`MemoryMedia`] is a backend without audio, for tests and headless
//!   clients.

mod client;
mod config;
mod driver;
mod error;
mod media;
mod memory;
mod page;
mod reconciler;
mod schedule;

pub use client::{ClientState, Effect};
pub use config::ReconcilerConfig;
pub use driver::{ClientDriver, Outcome};
pub use error::ReconcileError;
pub use media::{CallId, MediaCall, MediaEvent, PeerMedia};
pub use memory::{MemoryCall, MemoryMedia};
pub use page::Page;
pub use reconciler::{Audit, PeerLink, Reconciler, UpstreamSender};
pub use schedule::{AuditSchedule, AuditTick};
