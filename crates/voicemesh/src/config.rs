//! Relay configuration.
//!
//! Loaded from the environment by the `voicemesh-relay` binary, or from a
//! JSON document by embedders:
//!
//! ```json
//! { "bind_addr": "0.0.0.0:8000", "broker_prefix": "/peer", "upgrade_timeout_secs": 10 }
//! ```

use serde::{Deserialize, Serialize};
use voicemesh_transport::{DEFAULT_BROKER_PREFIX, DEFAULT_UPGRADE_TIMEOUT};

use crate::ConfigError;

/// Port used when `WEB_PORT` is not set.
pub const DEFAULT_PORT: u16 = 8000;

/// Where the relay listens and which paths it leaves to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Socket address to bind.
    pub bind_addr: String,

    /// Upgrade requests under this path prefix are refused so a proxy can
    /// route them to the peer-connection broker. Empty disables the check.
    pub broker_prefix: String,

    /// Seconds a new TCP peer gets to complete its WebSocket upgrade
    /// before it is dropped.
    pub upgrade_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            broker_prefix: DEFAULT_BROKER_PREFIX.to_string(),
            upgrade_timeout_secs: DEFAULT_UPGRADE_TIMEOUT.as_secs(),
        }
    }
}

impl RelayConfig {
    /// Reads `WEB_PORT` and `VOICEMESH_BROKER_PREFIX`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(port) = lookup("WEB_PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
            config.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Some(prefix) = lookup("VOICEMESH_BROKER_PREFIX") {
            config.broker_prefix = prefix;
        }
        Ok(config)
    }

    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}
