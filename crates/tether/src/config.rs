//! Server configuration, loadable from JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_rendezvous::BrokerConfig;

use crate::TetherError;

/// Everything a broker server needs to start.
///
/// ```json
/// {
///   "bind": "0.0.0.0:28000",
///   "broker": { "motd": "Welcome back.", "request_timeout_ms": 5000 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,

    /// How long a new connection has to send its handshake.
    /// Default: 5000 ms.
    pub handshake_timeout_ms: u64,

    pub broker: BrokerConfig,
}

impl ServerConfig {
    /// # Errors
    /// [`TetherError::Config`] if the JSON does not parse.
    pub fn from_json_str(json: &str) -> Result<Self, TetherError> {
        Ok(serde_json::from_str(json)?)
    }

    /// # Errors
    /// [`TetherError::Io`] if the file cannot be read,
    /// [`TetherError::Config`] if it does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TetherError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:28000".into(),
            handshake_timeout_ms: 5000,
            broker: BrokerConfig::default(),
        }
    }
}
