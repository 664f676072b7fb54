//! Configuration loading and types for HerdStore.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: node identity, cluster membership and timing, durable
//! storage, the HTTP surface, and logging.  Every field can also be
//! left out; defaults reproduce a single-node leader on port 8000.

use serde::Deserialize;
use std::path::Path;

use crate::node::Role;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Node identity settings.
    #[serde(default)]
    pub node: NodeConfig,

    /// Cluster membership and liveness timing.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Durable storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node identity configuration.
///
/// A node is identified by its port: peers list each other by port
/// number and the bully comparison orders nodes by it.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port, which doubles as the node identifier.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Starting role: `leader` or `follower`.
    #[serde(default)]
    pub role: Role,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            role: Role::default(),
        }
    }
}

/// Cluster membership and timing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Ports of the other nodes in the cluster.
    #[serde(default)]
    pub peers: Vec<u16>,

    /// Seconds between leader heartbeat probes of all peers.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Seconds between follower checks of the current leader.
    #[serde(default = "default_leader_check_interval")]
    pub leader_check_interval_secs: u64,

    /// Timeout in seconds for any single peer probe or notification.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            leader_check_interval_secs: default_leader_check_interval(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

/// Durable storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `snapshot.json` and `wal.log`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Seconds between WAL compactions on the leader.
    #[serde(default = "default_compaction_interval")]
    pub compaction_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            compaction_interval_secs: default_compaction_interval(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Origins allowed by CORS, for browser dashboards.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cors_origins: default_cors_origins(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_heartbeat_interval() -> u64 {
    5
}

fn default_leader_check_interval() -> u64 {
    10
}

fn default_probe_timeout() -> u64 {
    2
}

fn default_data_dir() -> String {
    ".".to_string()
}

fn default_compaction_interval() -> u64 {
    60
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Reject configurations that cannot form a working node.
    ///
    /// A follower with no peers would never find a leader to forward
    /// writes to or to watch for failure, so it is refused at startup.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node.role == Role::Follower && self.cluster.peers.is_empty() {
            anyhow::bail!("a follower needs at least one peer (cluster.peers is empty)");
        }
        if self.cluster.peers.contains(&self.node.port) {
            anyhow::bail!(
                "cluster.peers must not include the node's own port {}",
                self.node.port
            );
        }
        Ok(())
    }
}
