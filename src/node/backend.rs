//! Backend node representation
//!
//! One `BackendNode` wraps a single remote key-value node: its identity and
//! tuning parameters, a lazily-filled connection pool, and the liveness /
//! load / replication probes the registry and topology pass rely on.

use std::io;
use std::sync::Arc;

use tracing::{debug, info};

use crate::client::{Connect, ConnectionPool, KvCommands, KvTransport};
use crate::node::NodeConfig;
use crate::utils::ConnectionError;

/// Used/max memory as reported by `INFO memory`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub used: u64,
    pub max: u64,
}

/// One addressable remote key-value node plus its probe surface
pub struct BackendNode {
    id: String,
    host: String,
    port: u16,
    overload_threshold: f64,
    replica_target: u32,
    pool: ConnectionPool,
}

impl BackendNode {
    pub fn new(config: NodeConfig, connector: Arc<dyn Connect>) -> Self {
        Self {
            id: config.id,
            host: config.host,
            port: config.port,
            overload_threshold: config.overload_threshold,
            replica_target: config.replica_target,
            pool: ConnectionPool::new(connector),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn replica_target(&self) -> u32 {
        self.replica_target
    }

    pub fn overload_threshold(&self) -> f64 {
        self.overload_threshold
    }

    /// Get node address as string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Run one operation against this node's pooled connection
    pub(crate) fn with_conn<R>(
        &self,
        op: impl FnOnce(&mut dyn KvTransport) -> io::Result<R>,
    ) -> Result<R, ConnectionError> {
        self.pool.with(op)
    }

    /// Check whether a PING round trip succeeds
    ///
    /// Any connect or protocol failure degrades to `false`.
    pub fn is_alive(&self) -> bool {
        match self.with_conn(|conn| conn.ping()) {
            Ok(pong) => pong,
            Err(e) => {
                debug!(node = %self.address(), error = %e, "liveness probe failed");
                false
            }
        }
    }

    fn memory_stats(&self) -> Result<MemoryStats, ConnectionError> {
        let info = self.with_conn(|conn| conn.info("memory"))?;
        parse_memory_stats(&info).ok_or_else(|| {
            ConnectionError::Command(io::Error::new(
                io::ErrorKind::InvalidData,
                "INFO memory missing used_memory/maxmemory",
            ))
        })
    }

    /// Check whether used memory exceeds the overload threshold
    ///
    /// Strictly greater than: a node exactly at the threshold is not
    /// overloaded. A failed fetch yields `false` so that connection failure
    /// surfaces through `is_alive` instead.
    pub fn is_overloaded(&self) -> bool {
        match self.memory_stats() {
            Ok(stats) => stats.used as f64 > stats.max as f64 * self.overload_threshold,
            Err(e) => {
                debug!(node = %self.address(), error = %e, "memory probe failed");
                false
            }
        }
    }

    /// Number of nodes currently replicating from this node
    pub fn replica_count(&self) -> Result<u32, ConnectionError> {
        let info = self.with_conn(|conn| conn.info("replication"))?;
        Ok(count_replica_lines(&info))
    }

    /// Detach this node from any master, promoting it to standalone
    pub fn detach_as_replica(&self) -> Result<(), ConnectionError> {
        self.with_conn(|conn| conn.replicaof_no_one())
    }

    /// Clear this node's replica read-only flag
    ///
    /// A master must be writable before a new replica attaches to it.
    pub fn set_writable(&self) -> Result<(), ConnectionError> {
        self.with_conn(|conn| conn.config_set("replica-read-only", "no"))
    }

    /// Attach `replica` to this node, which acts as master
    ///
    /// Returns `Ok(false)` without side effects if the replica is not alive.
    pub fn attach_replica(&self, replica: &BackendNode) -> Result<bool, ConnectionError> {
        if !replica.is_alive() {
            return Ok(false);
        }

        info!(
            master = %self.address(),
            replica = %replica.address(),
            "attaching replica"
        );
        self.set_writable()?;
        replica.with_conn(|conn| conn.replicaof(&self.host, self.port))?;
        Ok(true)
    }
}

impl std::fmt::Debug for BackendNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendNode")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("overload_threshold", &self.overload_threshold)
            .field("replica_target", &self.replica_target)
            .finish()
    }
}

/// Extract a single `field:value` line from an INFO response
fn parse_info_field<'a>(info: &'a str, field: &str) -> Option<&'a str> {
    info.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name == field {
            Some(value.trim_end_matches('\r'))
        } else {
            None
        }
    })
}

/// Parse used_memory and maxmemory from an `INFO memory` response
fn parse_memory_stats(info: &str) -> Option<MemoryStats> {
    let used = parse_info_field(info, "used_memory")?.parse().ok()?;
    let max = parse_info_field(info, "maxmemory")?.parse().ok()?;
    Some(MemoryStats { used, max })
}

/// Count attached replicas in an `INFO replication` response
///
/// Matches the numbered `slave0:`/`replica0:` entries only, so fields such
/// as `slave_read_only` on a node that is itself a replica are not counted.
fn count_replica_lines(info: &str) -> u32 {
    info.lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(name, _)| {
            let digits = name
                .strip_prefix("slave")
                .or_else(|| name.strip_prefix("replica"));
            match digits {
                Some(d) => !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()),
                None => false,
            }
        })
        .count() as u32
}
