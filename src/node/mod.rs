//! Backend nodes and the registry that tracks them

pub mod backend;
pub mod registry;

pub use backend::{BackendNode, MemoryStats};
pub use registry::NodeRegistry;

use serde::{Deserialize, Serialize};

use crate::client::ConnectSpec;

/// Fraction of maxmemory beyond which a node is excluded from routing
pub const DEFAULT_OVERLOAD_THRESHOLD: f64 = 0.75;

/// Replicas a node tries to accumulate during a replication pass
pub const DEFAULT_REPLICA_TARGET: u32 = 2;

fn default_overload_threshold() -> f64 {
    DEFAULT_OVERLOAD_THRESHOLD
}

fn default_replica_target() -> u32 {
    DEFAULT_REPLICA_TARGET
}

/// Registration payload for one backend node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_replica_target")]
    pub replica_target: u32,
    #[serde(default = "default_overload_threshold")]
    pub overload_threshold: f64,
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            username: None,
            password: None,
            replica_target: DEFAULT_REPLICA_TARGET,
            overload_threshold: DEFAULT_OVERLOAD_THRESHOLD,
        }
    }

    pub(crate) fn connect_spec(&self) -> ConnectSpec {
        ConnectSpec {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}
