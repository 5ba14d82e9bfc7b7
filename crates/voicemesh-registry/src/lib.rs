//! Relay-side session registry for Voicemesh.
//!
//! This crate holds everything the relay remembers:
//!
//! 1. **Server sessions**: one per plugin id, kept for the life of the
//!    process, online or not ([`ServerSession`])
//! 2. **Connect tokens**: invitations minted by plugins ([`ConnectToken`])
//! 3. **Client sessions**: one per connected browser, owned by a server
//!    session ([`ClientSession`])
//!
//! All of it lives in one [`Registry`], mutated only through its methods.
//!
//! # How it fits in the stack
//!
//! ```text
//! Handshake & dispatch (above)  ← classifies sockets, parses frames
//!     ↕
//! Registry (this crate)  ← sessions, tokens, routing between them
//!     ↕
//! Protocol + transport (below)  ← typed directives, connection ids
//! ```

mod error;
mod registry;
mod session;
mod socket;

pub use error::RegistryError;
pub use registry::Registry;
pub use session::{
    Binding, ClientSession, Closed, ConnectToken, Redeemed, ServerSession,
};
pub use socket::{Outbound, OutboundReceiver, SocketHandle};
