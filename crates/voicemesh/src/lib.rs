//! # Voicemesh
//!
//! Signaling relay and browser session logic for proximity voice chat.
//!
//! A game-server plugin and many browsers connect to the relay over
//! WebSockets. The plugin mints connect ids, browsers redeem them, and
//! from then on the relay forwards the plugin's directives to individual
//! browsers and the browsers' reports back to the plugin. Audio never
//! touches the relay; browsers call each other directly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voicemesh::prelude::*;
//!
//! # async fn start() -> Result<(), VoicemeshError> {
//! let server = RelayServer::builder()
//!     .config(RelayConfig::from_env()?)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod dispatch;
mod error;
mod handler;
mod server;

pub use config::{RelayConfig, DEFAULT_PORT};
pub use dispatch::{dispatch, Dispatched, HandshakeState};
pub use error::{ConfigError, VoicemeshError};
pub use server::{RelayServer, RelayServerBuilder};

/// Re-exports for relay operators and browser-side embedders.
pub mod prelude {
    pub use crate::{
        ConfigError, RelayConfig, RelayServer, RelayServerBuilder, VoicemeshError,
    };
    pub use voicemesh_protocol::{
        ClientDirective, ConnectId, Handshake, ServerDirective, ServerId, ToClient,
        ToServer, UserId, SUPERSEDED_CLOSE_REASON,
    };
    pub use voicemesh_reconciler::{
        ClientDriver, MediaCall, MediaEvent, MemoryMedia, Outcome, Page, PeerMedia,
        ReconcilerConfig,
    };
    pub use voicemesh_registry::Registry;
}
