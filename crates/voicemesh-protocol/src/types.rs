//! Typed directives for every frame that travels on a relay socket.
//!
//! The wire format is plain text, one directive per frame. Each direction
//! of each socket role gets its own enum so a handler can only ever match
//! on the directives that can actually reach it:
//!
//! ```text
//! plugin  ──Handshake / ServerDirective──▶  relay  ──ToClient──▶  browser
//! plugin  ◀──────────ToServer──────────────  relay  ◀─ClientDirective─  browser
//! ```
//!
//! `Display` on each enum produces the exact wire text; parsing lives in
//! [`grammar`](crate::grammar).

use std::fmt;

/// Close reason a browser uses when it steps aside for a newer session of
/// the same user. A client session closing with this reason does not
/// produce a `User disconnected` notice.
pub const SUPERSEDED_CLOSE_REASON: &str = "connected-elsewhere";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

macro_rules! text_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier without validation.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrows the identifier text.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }
    };
}

text_id! {
    /// Stable identity of one game-server plugin.
    ServerId
}

text_id! {
    /// Identity of a browser user. Doubles as the user's peer id on the
    /// peer-connection broker.
    UserId
}

text_id! {
    /// A connect token minted by a plugin and redeemed by one browser.
    ConnectId
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// The two frames that classify an unbound socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// `I am a server with id <id>`
    Server { server_id: ServerId },
    /// `I am a user, connect id: <token>`
    User { connect_id: ConnectId },
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server { server_id } => {
                write!(f, "I am a server with id {server_id}")
            }
            Self::User { connect_id } => {
                write!(f, "I am a user, connect id: {connect_id}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Plugin → relay
// ---------------------------------------------------------------------------

/// Directives a bound plugin socket may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerDirective {
    /// `To <userId>: <payload>`: relay `payload` verbatim to one user.
    To { user_id: UserId, payload: String },
    /// `New connect id: <token> with user id <userId> and with username: <username>`
    NewConnectId {
        connect_id: ConnectId,
        user_id: UserId,
        username: String,
    },
    /// `resync`
    Resync,
    /// `peersinfo`
    PeersInfo,
}

impl fmt::Display for ServerDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::To { user_id, payload } => write!(f, "To {user_id}: {payload}"),
            Self::NewConnectId {
                connect_id,
                user_id,
                username,
            } => write!(
                f,
                "New connect id: {connect_id} with user id {user_id} and with username: {username}"
            ),
            Self::Resync => f.write_str("resync"),
            Self::PeersInfo => f.write_str("peersinfo"),
        }
    }
}

// ---------------------------------------------------------------------------
// Browser → relay
// ---------------------------------------------------------------------------

/// Directives a bound browser socket may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientDirective {
    /// `Warning <text>`
    Warning { text: String },
    /// `connected-peers <rest>`
    ConnectedPeers { report: String },
    /// `Heartbeat response`
    HeartbeatResponse,
}

impl fmt::Display for ClientDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning { text } => write!(f, "Warning {text}"),
            Self::ConnectedPeers { report } => write!(f, "connected-peers {report}"),
            Self::HeartbeatResponse => f.write_str("Heartbeat response"),
        }
    }
}

// ---------------------------------------------------------------------------
// Relay → plugin
// ---------------------------------------------------------------------------

/// Notices the relay sends to a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToServer {
    /// `User connected with id: <userId> and username: <username>`
    UserConnected { user_id: UserId, username: String },
    /// `User disconnected <userId>`
    UserDisconnected { user_id: UserId },
    /// `Warning from user <id>: <text>`
    WarningFromUser { user_id: UserId, text: String },
    /// `Peer info from <id>: <rest>`
    PeerInfo { user_id: UserId, report: String },
    /// `Heartbeat response from <id>`
    HeartbeatResponseFrom { user_id: UserId },
}

impl fmt::Display for ToServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserConnected { user_id, username } => write!(
                f,
                "User connected with id: {user_id} and username: {username}"
            ),
            Self::UserDisconnected { user_id } => {
                write!(f, "User disconnected {user_id}")
            }
            Self::WarningFromUser { user_id, text } => {
                write!(f, "Warning from user {user_id}: {text}")
            }
            Self::PeerInfo { user_id, report } => {
                write!(f, "Peer info from {user_id}: {report}")
            }
            Self::HeartbeatResponseFrom { user_id } => {
                write!(f, "Heartbeat response from {user_id}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Relay → browser
// ---------------------------------------------------------------------------

/// A playback gain as it appeared on the wire.
///
/// The original text is kept so re-serializing never reformats the number.
/// The value is always finite, and two volumes are equal when their wire
/// text is.
#[derive(Debug, Clone)]
pub struct Volume {
    text: String,
    value: f32,
}

impl Volume {
    /// Builds a volume from a gain value. `None` for NaN or infinities.
    pub fn new(value: f32) -> Option<Self> {
        value.is_finite().then(|| Self {
            text: value.to_string(),
            value,
        })
    }

    pub(crate) fn from_parts(text: String, value: f32) -> Self {
        Self { text, value }
    }

    /// The parsed gain.
    pub fn value(&self) -> f32 {
        self.value
    }
}

impl PartialEq for Volume {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Volume {}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Everything a browser can receive on its relay socket.
///
/// Some of these come from the relay itself (`Welcome`, `Invalid link`,
/// `Has plugin connection?`, broadcasts) and the rest are payloads a
/// plugin addressed to this user with `To <userId>: ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToClient {
    /// `Welcome, your user id: <userId> and your username is: <username>`
    Welcome { user_id: UserId, username: String },
    /// `Invalid link`
    InvalidLink,
    /// `Has plugin connection? true|false`
    HasPluginConnection(bool),
    /// `Connect to <id>`
    ConnectTo(UserId),
    /// `Wait for <id>`
    WaitFor(UserId),
    /// `Disconnect <id>`
    Disconnect(UserId),
    /// `Volume: <id>: <v>`
    Volume { user_id: UserId, volume: Volume },
    /// `Heartbeat`
    Heartbeat,
    /// `Reload`
    Reload,
    /// `resync`
    Resync,
    /// `peersinfo`
    PeersInfo,
    /// `You left the game, goodbye`
    LeftTheGame,
    /// `You are not on the server`
    NotOnServer,
    /// `You connected elsewhere`
    ConnectedElsewhere,
}

impl fmt::Display for ToClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome { user_id, username } => write!(
                f,
                "Welcome, your user id: {user_id} and your username is: {username}"
            ),
            Self::InvalidLink => f.write_str("Invalid link"),
            Self::HasPluginConnection(open) => {
                write!(f, "Has plugin connection? {open}")
            }
            Self::ConnectTo(id) => write!(f, "Connect to {id}"),
            Self::WaitFor(id) => write!(f, "Wait for {id}"),
            Self::Disconnect(id) => write!(f, "Disconnect {id}"),
            Self::Volume { user_id, volume } => {
                write!(f, "Volume: {user_id}: {volume}")
            }
            Self::Heartbeat => f.write_str("Heartbeat"),
            Self::Reload => f.write_str("Reload"),
            Self::Resync => f.write_str("resync"),
            Self::PeersInfo => f.write_str("peersinfo"),
            Self::LeftTheGame => f.write_str("You left the game, goodbye"),
            Self::NotOnServer => f.write_str("You are not on the server"),
            Self::ConnectedElsewhere => f.write_str("You connected elsewhere"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_display_as_raw_text() {
        assert_eq!(ServerId::from("S1").to_string(), "S1");
        assert_eq!(UserId::new("U1").as_str(), "U1");
        assert_eq!(ConnectId::from("T1").to_string(), "T1");
    }

    #[test]
    fn test_welcome_wire_text() {
        let msg = ToClient::Welcome {
            user_id: "U1".into(),
            username: "Alice".into(),
        };
        assert_eq!(
            msg.to_string(),
            "Welcome, your user id: U1 and your username is: Alice"
        );
    }

    #[test]
    fn test_user_connected_wire_text() {
        let msg = ToServer::UserConnected {
            user_id: "U1".into(),
            username: "Alice".into(),
        };
        assert_eq!(
            msg.to_string(),
            "User connected with id: U1 and username: Alice"
        );
    }

    #[test]
    fn test_has_plugin_connection_wire_text() {
        assert_eq!(
            ToClient::HasPluginConnection(false).to_string(),
            "Has plugin connection? false"
        );
    }

    #[test]
    fn test_volume_new_formats_value() {
        let v = Volume::new(0.25).unwrap();
        assert_eq!(v.to_string(), "0.25");
        assert_eq!(v.value(), 0.25);
    }

    #[test]
    fn test_volume_new_rejects_non_finite() {
        assert!(Volume::new(f32::NAN).is_none());
        assert!(Volume::new(f32::INFINITY).is_none());
    }

    #[test]
    fn test_volume_equality_is_reflexive() {
        let v = Volume::new(1.0).unwrap();
        assert_eq!(v, v.clone());
        assert_eq!(v, Volume::new(1.0).unwrap());
    }

    #[test]
    fn test_client_directive_wire_text() {
        assert_eq!(
            ClientDirective::Warning { text: "mic lost".into() }.to_string(),
            "Warning mic lost"
        );
        assert_eq!(
            ClientDirective::HeartbeatResponse.to_string(),
            "Heartbeat response"
        );
    }
}
