//! Wire grammar for Voicemesh.
//!
//! This crate defines the "language" the plugin, the relay and the browser
//! speak over relay sockets:
//!
//! - **Types** ([`Handshake`], [`ServerDirective`], [`ClientDirective`],
//!   [`ToServer`], [`ToClient`]): one enum per socket role and direction.
//!   `Display` yields the exact wire text.
//! - **Grammar**: `FromStr` for each of those enums.
//! - **Errors** ([`ProtocolError`]): what can go wrong while parsing.
//!
//! Frames are parsed once at the socket boundary. Code further in only ever
//! sees typed values.
//!
//! ```text
//! Transport (text frames) → Protocol (typed directives) → Registry / Reconciler
//! ```

mod error;
mod grammar;
mod types;

pub use error::ProtocolError;
pub use types::{
    ClientDirective, ConnectId, Handshake, ServerDirective, ServerId, ToClient,
    ToServer, UserId, Volume, SUPERSEDED_CLOSE_REASON,
};
