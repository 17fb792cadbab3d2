//! Mesh configuration
//!
//! Built from an optional JSON config file overlaid with CLI flags. The
//! config file carries the same shapes serde-side that the CLI exposes as
//! flags; CLI values win where both are present.

use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::TcpConnectorProvider;
use crate::config::CliArgs;
use crate::node::{NodeConfig, DEFAULT_OVERLOAD_THRESHOLD, DEFAULT_REPLICA_TARGET};
use crate::utils::MeshError;

/// Id given to the default node when it comes from -h/-p flags
pub const DEFAULT_NODE_ID: &str = "default";

fn default_replication_delay_ms() -> u64 {
    5000
}

fn default_size_report_delay_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_read_timeout_ms() -> u64 {
    3000
}

fn default_write_timeout_ms() -> u64 {
    3000
}

/// Full runtime configuration of the mesh process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Fallback node, routed to unconditionally
    #[serde(default)]
    pub default_node: Option<NodeConfig>,

    /// Nodes registered (with connectivity validation) at startup
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    #[serde(default = "default_replication_delay_ms")]
    pub replication_delay_ms: u64,

    #[serde(default = "default_size_report_delay_ms")]
    pub size_report_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            default_node: None,
            nodes: Vec::new(),
            replication_delay_ms: default_replication_delay_ms(),
            size_report_delay_ms: default_size_report_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl MeshConfig {
    /// Build configuration from CLI flags, overlaid on the config file when
    /// one is given
    pub fn from_cli(args: &CliArgs) -> Result<Self, MeshError> {
        let mut config = match &args.config_path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|e| {
                    MeshError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&raw).map_err(|e| {
                    MeshError::Config(format!("invalid config {}: {}", path.display(), e))
                })?
            }
            None => MeshConfig::default(),
        };

        let replica_target = args.replica_target.unwrap_or(DEFAULT_REPLICA_TARGET);
        let overload_threshold = args
            .overload_threshold
            .unwrap_or(DEFAULT_OVERLOAD_THRESHOLD);

        if let Some(ref host) = args.host {
            config.default_node = Some(NodeConfig {
                id: DEFAULT_NODE_ID.to_string(),
                host: host.clone(),
                port: args.port,
                username: args.username.clone(),
                password: args.password.clone(),
                replica_target,
                overload_threshold,
            });
        }

        for spec in &args.nodes {
            let mut node = parse_node_spec(spec)?;
            node.replica_target = replica_target;
            node.overload_threshold = overload_threshold;
            config.nodes.push(node);
        }

        if let Some(ms) = args.replication_delay_ms {
            config.replication_delay_ms = ms;
        }
        if let Some(ms) = args.size_report_delay_ms {
            config.size_report_delay_ms = ms;
        }
        if let Some(ms) = args.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if let Some(ms) = args.read_timeout_ms {
            config.read_timeout_ms = ms;
        }
        if let Some(ms) = args.write_timeout_ms {
            config.write_timeout_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), MeshError> {
        let mut ids: Vec<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        if let Some(ref default) = self.default_node {
            ids.push(&default.id);
        }
        ids.sort_unstable();
        if let Some(dup) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(MeshError::Config(format!("duplicate node id '{}'", dup[0])));
        }

        for node in self.nodes.iter().chain(self.default_node.iter()) {
            if node.id.is_empty() {
                return Err(MeshError::Config("empty node id".to_string()));
            }
            if !(node.overload_threshold > 0.0 && node.overload_threshold.is_finite()) {
                return Err(MeshError::Config(format!(
                    "node '{}': overload_threshold must be a positive number",
                    node.id
                )));
            }
        }
        Ok(())
    }

    pub fn replication_delay(&self) -> Duration {
        Duration::from_millis(self.replication_delay_ms)
    }

    pub fn size_report_delay(&self) -> Duration {
        Duration::from_millis(self.size_report_delay_ms)
    }

    /// Connector provider carrying this configuration's timeouts
    pub fn connector_provider(&self) -> TcpConnectorProvider {
        TcpConnectorProvider {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

/// Parse a CLI node spec of the form `id=host:port`
fn parse_node_spec(spec: &str) -> Result<NodeConfig, MeshError> {
    let bad = || {
        MeshError::Config(format!(
            "invalid node spec '{}', expected id=host:port",
            spec
        ))
    };

    let (id, addr) = spec.split_once('=').ok_or_else(bad)?;
    let (host, port_str) = addr.rsplit_once(':').ok_or_else(bad)?;
    if id.is_empty() || host.is_empty() {
        return Err(bad());
    }
    let port: u16 = port_str.parse().map_err(|_| bad())?;

    Ok(NodeConfig::new(id, host, port))
}
