//! What the browser is currently showing.

use std::fmt;

/// The page shown to the user.
///
/// ```text
///   Loading ──▶ Connecting ──(Welcome)──▶ Ready
///      │            │                       │
///      └────────────┴──(socket lost)────────┴──▶ ConnectionLost
///
///   any ──(Invalid link / left / not on server / elsewhere)──▶ terminal page
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Loading,
    Connecting,
    Ready,
    InvalidLink,
    ConnectionLost,
    LeftTheGame,
    NotOnServer,
    ConnectedElsewhere,
}

impl Page {
    /// Stable identifier for the page.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::InvalidLink => "invalid-link",
            Self::ConnectionLost => "connection-lost",
            Self::LeftTheGame => "left-the-game",
            Self::NotOnServer => "not-on-server",
            Self::ConnectedElsewhere => "connected-elsewhere",
        }
    }

    /// Whether the session is over once this page shows.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Loading | Self::Connecting | Self::Ready)
    }

    /// The page to show after the relay socket dropped. Terminal pages
    /// stay put.
    pub fn after_connection_lost(self) -> Self {
        if self.is_terminal() {
            self
        } else {
            Self::ConnectionLost
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
