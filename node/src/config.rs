//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use rota_types::ChainParams;

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a ROTA node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for the ledger snapshot store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Port to listen on for P2P connections.
    #[serde(default = "default_p2p_port")]
    pub port: u16,

    /// Address other nodes should dial to reach us ("host:port"). Also
    /// used to recognise and skip links back to ourselves.
    #[serde(default)]
    pub public_addr: Option<String>,

    /// Peer addresses to connect to on startup.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,

    /// BIP39 phrase of the validator identity. Without it the node only
    /// observes and relays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator_mnemonic: Option<String>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between attempts to redial known but disconnected peers.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,

    /// Seconds between validator ANNOUNCE heartbeats.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Seconds between checks for our block production slot.
    #[serde(default = "default_block_interval")]
    pub block_interval_secs: u64,

    /// Chain parameters. Every node on a network must agree on these.
    #[serde(default)]
    pub params: ChainParams,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./rota_data")
}

fn default_p2p_port() -> u16 {
    3000
}

fn default_log_format() -> LogFormat {
    LogFormat::Human
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reconnect_interval() -> u64 {
    15
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_block_interval() -> u64 {
    10
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            port: default_p2p_port(),
            public_addr: None,
            bootstrap_peers: Vec::new(),
            validator_mnemonic: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
            reconnect_interval_secs: default_reconnect_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            block_interval_secs: default_block_interval(),
            params: ChainParams::default(),
        }
    }
}
