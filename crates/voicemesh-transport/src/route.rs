//! Upgrade routing between the relay socket and the peer-connection broker.
//!
//! Both services share one HTTP listener in a typical deployment. Upgrade
//! requests whose path starts with the broker prefix belong to the broker;
//! everything else is a relay socket. A request is never served by both.

/// Path prefix the peer-connection broker is mounted under by default.
pub const DEFAULT_BROKER_PREFIX: &str = "/peer";

/// Which service an upgrade request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The external peer-connection broker.
    Broker,
    /// This relay's signaling socket.
    Relay,
}

impl Route {
    /// Classifies an upgrade request path.
    ///
    /// An empty prefix disables broker routing entirely.
    pub fn for_path(path: &str, broker_prefix: &str) -> Self {
        if !broker_prefix.is_empty() && path.starts_with(broker_prefix) {
            Self::Broker
        } else {
            Self::Relay
        }
    }
}
