//! Parsing of wire text into the typed directives in [`types`](crate::types).
//!
//! Every `FromStr` here is the exact inverse of the matching `Display`:
//! for any frame that parses, `frame.parse::<T>()?.to_string() == frame`.
//!
//! Identifiers (server ids, user ids, connect tokens) are single words: no
//! whitespace and no `:`. Free text (usernames, payloads, warnings) runs to
//! the end of the frame.

use std::str::FromStr;

use crate::types::{
    ClientDirective, ConnectId, Handshake, ServerDirective, ServerId, ToClient,
    ToServer, UserId, Volume,
};
use crate::ProtocolError;

/// Validates a single-word identifier.
fn ident<'a>(
    directive: &'static str,
    text: &'a str,
) -> Result<&'a str, ProtocolError> {
    if text.is_empty() {
        return Err(ProtocolError::malformed(directive, "empty identifier"));
    }
    if text.contains(|c: char| c.is_whitespace() || c == ':') {
        return Err(ProtocolError::malformed(
            directive,
            format!("invalid identifier {text:?}"),
        ));
    }
    Ok(text)
}

/// Requires free text to be present.
fn non_empty<'a>(
    directive: &'static str,
    field: &str,
    text: &'a str,
) -> Result<&'a str, ProtocolError> {
    if text.is_empty() {
        Err(ProtocolError::malformed(directive, format!("missing {field}")))
    } else {
        Ok(text)
    }
}

/// Splits `<ident><sep><rest>` at the first `sep`.
fn ident_then<'a>(
    directive: &'static str,
    text: &'a str,
    sep: &str,
) -> Result<(&'a str, &'a str), ProtocolError> {
    let (id, rest) = text.split_once(sep).ok_or_else(|| {
        ProtocolError::malformed(directive, format!("missing {sep:?}"))
    })?;
    Ok((ident(directive, id)?, rest))
}

impl FromStr for Handshake {
    type Err = ProtocolError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        if let Some(id) = frame.strip_prefix("I am a server with id ") {
            return Ok(Self::Server {
                server_id: ServerId::new(ident("server handshake", id)?),
            });
        }
        if let Some(token) = frame.strip_prefix("I am a user, connect id: ") {
            return Ok(Self::User {
                connect_id: ConnectId::new(non_empty(
                    "user handshake",
                    "connect id",
                    token,
                )?),
            });
        }
        Err(ProtocolError::Unrecognized(frame.to_owned()))
    }
}

impl FromStr for ServerDirective {
    type Err = ProtocolError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        match frame {
            "resync" => return Ok(Self::Resync),
            "peersinfo" => return Ok(Self::PeersInfo),
            _ => {}
        }

        if let Some(rest) = frame.strip_prefix("To ") {
            let (user_id, payload) = ident_then("To", rest, ": ")?;
            return Ok(Self::To {
                user_id: UserId::new(user_id),
                payload: payload.to_owned(),
            });
        }

        if let Some(rest) = frame.strip_prefix("New connect id: ") {
            const NAME: &str = "New connect id";
            let (connect_id, rest) = ident_then(NAME, rest, " with user id ")?;
            let (user_id, username) =
                ident_then(NAME, rest, " and with username: ")?;
            return Ok(Self::NewConnectId {
                connect_id: ConnectId::new(connect_id),
                user_id: UserId::new(user_id),
                username: non_empty(NAME, "username", username)?.to_owned(),
            });
        }

        Err(ProtocolError::Unrecognized(frame.to_owned()))
    }
}

impl FromStr for ClientDirective {
    type Err = ProtocolError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        if frame == "Heartbeat response" {
            return Ok(Self::HeartbeatResponse);
        }
        if let Some(text) = frame.strip_prefix("Warning ") {
            return Ok(Self::Warning {
                text: non_empty("Warning", "text", text)?.to_owned(),
            });
        }
        if let Some(report) = frame.strip_prefix("connected-peers ") {
            return Ok(Self::ConnectedPeers {
                report: report.to_owned(),
            });
        }
        Err(ProtocolError::Unrecognized(frame.to_owned()))
    }
}

impl FromStr for ToServer {
    type Err = ProtocolError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = frame.strip_prefix("User connected with id: ") {
            const NAME: &str = "User connected";
            let (user_id, username) = ident_then(NAME, rest, " and username: ")?;
            return Ok(Self::UserConnected {
                user_id: UserId::new(user_id),
                username: non_empty(NAME, "username", username)?.to_owned(),
            });
        }
        if let Some(id) = frame.strip_prefix("User disconnected ") {
            return Ok(Self::UserDisconnected {
                user_id: UserId::new(ident("User disconnected", id)?),
            });
        }
        if let Some(rest) = frame.strip_prefix("Warning from user ") {
            let (user_id, text) = ident_then("Warning from user", rest, ": ")?;
            return Ok(Self::WarningFromUser {
                user_id: UserId::new(user_id),
                text: text.to_owned(),
            });
        }
        if let Some(rest) = frame.strip_prefix("Peer info from ") {
            let (user_id, report) = ident_then("Peer info", rest, ": ")?;
            return Ok(Self::PeerInfo {
                user_id: UserId::new(user_id),
                report: report.to_owned(),
            });
        }
        if let Some(id) = frame.strip_prefix("Heartbeat response from ") {
            return Ok(Self::HeartbeatResponseFrom {
                user_id: UserId::new(ident("Heartbeat response", id)?),
            });
        }
        Err(ProtocolError::Unrecognized(frame.to_owned()))
    }
}

impl FromStr for ToClient {
    type Err = ProtocolError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        match frame {
            "Invalid link" => return Ok(Self::InvalidLink),
            "Heartbeat" => return Ok(Self::Heartbeat),
            "Reload" => return Ok(Self::Reload),
            "resync" => return Ok(Self::Resync),
            "peersinfo" => return Ok(Self::PeersInfo),
            "You left the game, goodbye" => return Ok(Self::LeftTheGame),
            "You are not on the server" => return Ok(Self::NotOnServer),
            "You connected elsewhere" => return Ok(Self::ConnectedElsewhere),
            _ => {}
        }

        if let Some(rest) = frame.strip_prefix("Welcome, your user id: ") {
            const NAME: &str = "Welcome";
            let (user_id, username) =
                ident_then(NAME, rest, " and your username is: ")?;
            return Ok(Self::Welcome {
                user_id: UserId::new(user_id),
                username: non_empty(NAME, "username", username)?.to_owned(),
            });
        }
        if let Some(flag) = frame.strip_prefix("Has plugin connection? ") {
            return match flag {
                "true" => Ok(Self::HasPluginConnection(true)),
                "false" => Ok(Self::HasPluginConnection(false)),
                other => Err(ProtocolError::malformed(
                    "Has plugin connection?",
                    format!("expected true or false, got {other:?}"),
                )),
            };
        }
        if let Some(id) = frame.strip_prefix("Connect to ") {
            return Ok(Self::ConnectTo(UserId::new(ident("Connect to", id)?)));
        }
        if let Some(id) = frame.strip_prefix("Wait for ") {
            return Ok(Self::WaitFor(UserId::new(ident("Wait for", id)?)));
        }
        if let Some(id) = frame.strip_prefix("Disconnect ") {
            return Ok(Self::Disconnect(UserId::new(ident("Disconnect", id)?)));
        }
        if let Some(rest) = frame.strip_prefix("Volume: ") {
            let (user_id, level) = ident_then("Volume", rest, ": ")?;
            let value: f32 = level.parse().map_err(|_| {
                ProtocolError::malformed("Volume", format!("invalid gain {level:?}"))
            })?;
            if !value.is_finite() {
                return Err(ProtocolError::malformed(
                    "Volume",
                    format!("gain must be finite, got {level:?}"),
                ));
            }
            return Ok(Self::Volume {
                user_id: UserId::new(user_id),
                volume: Volume::from_parts(level.to_owned(), value),
            });
        }
        Err(ProtocolError::Unrecognized(frame.to_owned()))
    }
}
