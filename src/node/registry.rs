//! Node registry
//!
//! The authoritative set of registered backend nodes plus one optional
//! default node. Registration and removal are serialized under a single
//! operation lock, and a replication pass holds that lock for its full
//! duration so it can never interleave with membership changes. Health
//! filtering in `get_all` runs without the lock: cache traffic only takes a
//! brief read of the membership list and then probes node handles directly.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::client::{ConnectorProvider, KvCommands};
use crate::node::{BackendNode, NodeConfig};
use crate::topology::{self, PassSummary};
use crate::utils::{ConnectionError, RegistryError};

pub struct NodeRegistry {
    /// Registered nodes in registration order
    nodes: RwLock<Vec<Arc<BackendNode>>>,
    /// Fallback node, always routed to, never removable
    default_node: Option<Arc<BackendNode>>,
    provider: Arc<dyn ConnectorProvider>,
    /// Serializes save/delete/do_replication
    op_lock: Mutex<()>,
}

impl NodeRegistry {
    pub fn new(provider: Arc<dyn ConnectorProvider>) -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            default_node: None,
            provider,
            op_lock: Mutex::new(()),
        }
    }

    /// Create a registry with a default node built from `config`
    ///
    /// The default node is not validated up front; its connection pool fills
    /// lazily on first use.
    pub fn with_default(provider: Arc<dyn ConnectorProvider>, config: NodeConfig) -> Self {
        let connector = provider.connector_for(config.connect_spec());
        let default_node = Arc::new(BackendNode::new(config, connector));
        Self {
            nodes: RwLock::new(Vec::new()),
            default_node: Some(default_node),
            provider,
            op_lock: Mutex::new(()),
        }
    }

    /// Register a node, validating connectivity first
    ///
    /// Opens a fresh connection (authenticating if credentials are present)
    /// and PINGs it before committing. Replaces any prior entry with the
    /// same id.
    pub fn save(&self, config: NodeConfig) -> Result<(), RegistryError> {
        let _guard = self.op_lock.lock();

        if let Some(ref default) = self.default_node {
            if default.id() == config.id {
                return Err(RegistryError::IdReserved(config.id));
            }
        }

        let connector = self.provider.connector_for(config.connect_spec());

        // Validation connection is opened, tested, and dropped; the node's
        // own pool stays lazy.
        let probe = connector.connect().and_then(|mut conn| {
            match conn.ping() {
                Ok(true) => Ok(()),
                Ok(false) => Err(ConnectionError::Command(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "PING did not return PONG",
                ))),
                Err(e) => Err(ConnectionError::Command(e)),
            }
        });
        if let Err(source) = probe {
            return Err(RegistryError::Validation {
                id: config.id,
                source,
            });
        }

        let id = config.id.clone();
        let node = Arc::new(BackendNode::new(config, connector));

        let mut nodes = self.nodes.write();
        match nodes.iter_mut().find(|n| n.id() == id) {
            Some(slot) => {
                debug!(id = %id, "replacing registered node");
                *slot = node;
            }
            None => nodes.push(node),
        }
        info!(id = %id, "node registered");
        Ok(())
    }

    /// Remove a node; no error if the id is unknown
    pub fn delete(&self, id: &str) {
        let _guard = self.op_lock.lock();
        let mut nodes = self.nodes.write();
        let before = nodes.len();
        nodes.retain(|n| n.id() != id);
        if nodes.len() < before {
            info!(id = %id, "node unregistered");
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<BackendNode>> {
        self.nodes.read().iter().find(|n| n.id() == id).cloned()
    }

    pub fn get_default(&self) -> Option<Arc<BackendNode>> {
        self.default_node.clone()
    }

    /// Snapshot of all registered nodes regardless of health
    pub fn registered(&self) -> Vec<Arc<BackendNode>> {
        self.nodes.read().clone()
    }

    /// Currently routable nodes
    ///
    /// Registered nodes that are alive and not overloaded, in registration
    /// order, with the default node appended last unconditionally. The
    /// default node is the fallback of last resort and is included even when
    /// dead or overloaded.
    pub fn get_all(&self) -> Vec<Arc<BackendNode>> {
        let snapshot = self.nodes.read().clone();
        let mut healthy: Vec<Arc<BackendNode>> = snapshot
            .into_iter()
            .filter(|n| n.is_alive() && !n.is_overloaded())
            .collect();
        if let Some(ref default) = self.default_node {
            healthy.push(Arc::clone(default));
        }
        healthy
    }

    /// Run one replication topology pass
    ///
    /// Operates on the snapshot of all registered nodes, dead ones included,
    /// so they can rejoin as replicas once alive. Holds the operation lock
    /// for the full pass; concurrent save/delete calls block until it ends.
    pub fn do_replication(&self) -> PassSummary {
        let _guard = self.op_lock.lock();
        let snapshot = self.nodes.read().clone();
        topology::run_pass(&snapshot)
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("registered", &self.nodes.read().len())
            .field("has_default", &self.default_node.is_some())
            .finish()
    }
}
