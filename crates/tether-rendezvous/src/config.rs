//! Configuration for the three rendezvous roles.
//!
//! Every struct derives `serde` and carries `#[serde(default)]`, so a
//! config file only needs the fields it changes.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_rpc::{
    BUILD_VERSION, CS_PROTOCOL_VERSION, MASTER_PROTOCOL_VERSION, MIN_MASTER_PROTOCOL_VERSION,
};
use tether_wire::IpAddress;

/// Broker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Name sent alongside the message of the day.
    pub master_name: String,

    pub motd: String,

    /// Per-build replacements for `motd`, keyed by client build.
    pub build_motd: BTreeMap<u32, String>,

    /// Newest released client build. Older clients are told to upgrade.
    pub latest_build: u32,

    /// Newest released game protocol. Older clients are told to upgrade.
    pub latest_cs_version: u32,

    /// How long a brokered request may wait for the host's answer.
    /// Default: 5000 ms.
    pub request_timeout_ms: u64,

    /// Addresses per `m2c_query_servers_response` batch. Default: 30.
    pub query_batch_size: usize,

    /// How often the broker sweeps for expired requests. Default: 500 ms.
    pub tick_interval_ms: u64,

    /// Oldest master protocol version accepted at handshake.
    pub min_master_version: u32,

    /// Newest master protocol version accepted at handshake.
    pub max_master_version: u32,
}

impl BrokerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            master_name: "Tether Master".into(),
            motd: "Welcome.".into(),
            build_motd: BTreeMap::new(),
            latest_build: BUILD_VERSION,
            latest_cs_version: CS_PROTOCOL_VERSION,
            request_timeout_ms: 5000,
            query_batch_size: 30,
            tick_interval_ms: 500,
            min_master_version: MIN_MASTER_PROTOCOL_VERSION,
            max_master_version: MASTER_PROTOCOL_VERSION,
        }
    }
}

/// Settings for a peer that hosts games.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// When `false` every inbound request is rejected.
    pub accepting: bool,

    /// Address sent to the broker as this host's internal address.
    pub local_address: IpAddress,

    /// Initiator IPs whose requests are rejected. Ports are ignored.
    pub banned: Vec<Ipv4Addr>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            accepting: true,
            local_address: IpAddress::any(0),
            banned: Vec::new(),
        }
    }
}

/// Settings for a peer that joins games.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub player_name: String,

    /// Address sent to the broker as this client's internal address.
    pub local_address: IpAddress,

    /// How long the client waits for the broker's answer before giving up
    /// on its own. Longer than the broker's timeout so the broker's
    /// "Timed Out" normally arrives first. Default: 10000 ms.
    pub request_timeout_ms: u64,
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            player_name: "Player".into(),
            local_address: IpAddress::any(0),
            request_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_config_defaults() {
        let cfg = BrokerConfig::default();
        assert_eq!(cfg.request_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.query_batch_size, 30);
        assert_eq!(cfg.min_master_version, 4);
        assert_eq!(cfg.max_master_version, 6);
    }

    #[test]
    fn test_broker_config_partial_json_keeps_defaults() {
        let cfg: BrokerConfig =
            serde_json::from_str(r#"{ "motd": "hi", "query_batch_size": 5 }"#).unwrap();
        assert_eq!(cfg.motd, "hi");
        assert_eq!(cfg.query_batch_size, 5);
        assert_eq!(cfg.request_timeout_ms, 5000);
    }

    #[test]
    fn test_broker_config_parses_build_motd_and_release() {
        let cfg: BrokerConfig = serde_json::from_str(
            r#"{ "latest_build": 7, "build_motd": { "3": "please update" } }"#,
        )
        .unwrap();
        assert_eq!(cfg.latest_build, 7);
        assert_eq!(cfg.latest_cs_version, CS_PROTOCOL_VERSION);
        assert_eq!(cfg.build_motd.get(&3).map(String::as_str), Some("please update"));
    }

    #[test]
    fn test_host_config_parses_addresses() {
        let cfg: HostConfig = serde_json::from_str(
            r#"{ "local_address": "192.168.1.4:28000", "banned": ["10.0.0.9"] }"#,
        )
        .unwrap();
        assert!(cfg.accepting);
        assert_eq!(cfg.local_address.port, 28000);
        assert_eq!(cfg.banned, vec![Ipv4Addr::new(10, 0, 0, 9)]);
    }
}
