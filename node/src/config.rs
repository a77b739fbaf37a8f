//! Node configuration with TOML file support.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tradenet_network::PeerConfig;
use tradenet_transport::DEFAULT_ONION_PORT;
use tradenet_types::{Address, NetworkType};

use crate::logging::LogFormat;
use crate::NodeError;

/// Which transport the node runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Clear,
    Tor,
}

/// Configuration for a tradenet node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Every field has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Names the server binding; its address is persisted under `base_dir`.
    #[serde(default = "default_server_id")]
    pub server_id: String,

    /// Port for the server socket. 0 picks a free port on clear-net.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    #[serde(default = "default_transport")]
    pub transport: TransportKind,

    /// Clear-net bind host.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_tor_socks_proxy")]
    pub tor_socks_proxy: String,

    #[serde(default = "default_tor_hidden_service_dir")]
    pub tor_hidden_service_dir: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Seed nodes as `host:port`; `.onion` and `.i2p` hosts get their
    /// network type from the suffix.
    #[serde(default)]
    pub seed_nodes: Vec<String>,

    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How often expired gossip entries are purged.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_server_id() -> String {
    "default".to_string()
}

fn default_port() -> u16 {
    DEFAULT_ONION_PORT
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("./tradenet_data")
}

fn default_transport() -> TransportKind {
    TransportKind::Clear
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_tor_socks_proxy() -> String {
    "127.0.0.1:9050".to_string()
}

fn default_tor_hidden_service_dir() -> PathBuf {
    PathBuf::from("./tor/hiddenservice")
}

fn default_max_connections() -> usize {
    tradenet_network::config::DEFAULT_MAX_CONNECTIONS
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_purge_interval_secs() -> u64 {
    60
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn seed_addresses(&self) -> Result<Vec<Address>, NodeError> {
        self.seed_nodes.iter().map(|s| parse_seed(s)).collect()
    }

    /// Settings for the connection layer and the services above it.
    pub fn peer_config(&self) -> Result<PeerConfig, NodeError> {
        Ok(PeerConfig {
            max_connections: self.max_connections,
            seed_nodes: self.seed_addresses()?,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            ..PeerConfig::default()
        })
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }
}

fn parse_seed(seed: &str) -> Result<Address, NodeError> {
    let host = seed.rsplit_once(':').map(|(host, _)| host).unwrap_or(seed);
    let network_type = if host.ends_with(".onion") {
        NetworkType::Tor
    } else if host.ends_with(".i2p") {
        NetworkType::I2p
    } else {
        NetworkType::Clear
    };
    Address::parse(seed, network_type).map_err(|e| NodeError::Config(format!("seed node {seed}: {e}")))
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server_id: default_server_id(),
            port: default_port(),
            base_dir: default_base_dir(),
            transport: default_transport(),
            host: default_host(),
            tor_socks_proxy: default_tor_socks_proxy(),
            tor_hidden_service_dir: default_tor_hidden_service_dir(),
            max_connections: default_max_connections(),
            seed_nodes: Vec::new(),
            connect_timeout_ms: default_timeout_ms(),
            handshake_timeout_ms: default_timeout_ms(),
            request_timeout_ms: default_timeout_ms(),
            purge_interval_secs: default_purge_interval_secs(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
