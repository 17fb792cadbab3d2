//! Replication topology management
//!
//! A periodic pass over the registered nodes that attaches replicas to
//! masters below their replica target. The pass is a greedy, non-optimal
//! heuristic: it walks masters in registration order, offers each one the
//! alive candidates with the fewest replicas first, and never detaches or
//! rebalances anything. Re-issuing an attach command for an already-attached
//! replica is harmless and is not short-circuited.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::node::{BackendNode, NodeRegistry};

/// Outcome counts for one replication pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Masters whose replica count could be probed
    pub targets_considered: usize,
    /// Successful attach commands issued
    pub attachments: u32,
    /// Attach attempts skipped or failed
    pub failures: u32,
}

/// Run one replication pass over a fixed-order node snapshot
///
/// Dead nodes stay in the snapshot: they are skipped as masters (their
/// replica count cannot be probed) and as candidates (not alive), but will
/// participate again once they come back. Attach failures are logged and
/// skipped without aborting the rest of the pass.
pub fn run_pass(nodes: &[Arc<BackendNode>]) -> PassSummary {
    let mut summary = PassSummary::default();

    for master in nodes {
        let count = match master.replica_count() {
            Ok(count) => count,
            Err(e) => {
                debug!(node = %master.address(), error = %e, "skipping master, replica count unavailable");
                continue;
            }
        };
        summary.targets_considered += 1;

        if count >= master.replica_target() {
            continue;
        }

        // Alive peers with their current replica counts, fewest first,
        // capped at one over their own target. Counts are re-fetched for
        // every master so attachments made earlier in the pass are seen.
        let mut candidates: Vec<(Arc<BackendNode>, u32)> = nodes
            .iter()
            .filter(|n| n.id() != master.id())
            .filter(|n| n.is_alive())
            .filter_map(|n| n.replica_count().ok().map(|c| (Arc::clone(n), c)))
            .collect();
        candidates.sort_by_key(|(_, count)| *count);
        candidates.retain(|(node, count)| *count < node.replica_target() + 1);

        for (candidate, _) in candidates {
            match master.attach_replica(&candidate) {
                Ok(true) => summary.attachments += 1,
                Ok(false) => {
                    warn!(
                        master = %master.address(),
                        replica = %candidate.address(),
                        "replica went away before attach, skipping"
                    );
                    summary.failures += 1;
                }
                Err(e) => {
                    warn!(
                        master = %master.address(),
                        replica = %candidate.address(),
                        error = %e,
                        "attach failed, skipping"
                    );
                    summary.failures += 1;
                }
            }
        }

        if let Ok(total) = master.replica_count() {
            info!(master = %master.address(), replicas = total, "master replica count");
        }
    }

    summary
}

/// Periodically-triggered owner of the replication pass
///
/// Guards against overlapping runs: a manual trigger while the scheduled
/// pass is still going (or vice versa) is skipped, not queued.
pub struct ReplicationTopologyManager {
    registry: Arc<NodeRegistry>,
    in_progress: AtomicBool,
}

impl ReplicationTopologyManager {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Run one pass unless another is already in progress
    ///
    /// Returns `None` if the pass was skipped.
    pub fn run_once(&self) -> Option<PassSummary> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("replication pass already in progress, skipping");
            return None;
        }

        let summary = self.registry.do_replication();
        info!(
            masters = summary.targets_considered,
            attachments = summary.attachments,
            failures = summary.failures,
            "replication pass complete"
        );

        self.in_progress.store(false, Ordering::SeqCst);
        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ConnectorProvider;
    use crate::node::NodeConfig;
    use crate::testutil::{MockCluster, MockConnectorProvider, MockNodeState};

    fn node(
        cluster: &Arc<MockCluster>,
        id: &str,
        port: u16,
        state: MockNodeState,
    ) -> Arc<BackendNode> {
        let addr = format!("127.0.0.1:{port}");
        cluster.add(&addr, state);
        let provider = MockConnectorProvider::provider(cluster);
        let config = NodeConfig::new(id, "127.0.0.1", port);
        let connector = provider.connector_for(config.connect_spec());
        Arc::new(BackendNode::new(config, connector))
    }

    fn commands(cluster: &Arc<MockCluster>, port: u16) -> Vec<String> {
        cluster
            .state(&format!("127.0.0.1:{port}"))
            .lock()
            .commands
            .clone()
    }

    #[test]
    fn test_pass_attaches_alive_candidate_and_skips_dead() {
        // A(alive, 0 replicas), B(alive, 0 replicas), C(dead)
        let cluster = MockCluster::new();
        let a = node(&cluster, "a", 7001, MockNodeState::alive());
        let b = node(&cluster, "b", 7002, MockNodeState::alive());
        let c = node(&cluster, "c", 7003, MockNodeState::dead());
        let nodes = vec![a.clone(), b.clone(), c.clone()];

        let summary = run_pass(&nodes);

        // A picked up B; B (walked next as master) picked up A; C untouched
        assert_eq!(a.replica_count().unwrap(), 1);
        assert_eq!(b.replica_count().unwrap(), 1);
        assert!(c.replica_count().is_err());
        assert!(commands(&cluster, 7003).is_empty());
        assert_eq!(summary.targets_considered, 2);
        assert_eq!(summary.attachments, 2);
        assert_eq!(summary.failures, 0);
    }

    #[test]
    fn test_pass_never_attaches_node_to_itself() {
        let cluster = MockCluster::new();
        let a = node(&cluster, "a", 7001, MockNodeState::alive());
        let nodes = vec![a.clone()];

        run_pass(&nodes);

        assert_eq!(a.replica_count().unwrap(), 0);
        let log = commands(&cluster, 7001);
        assert!(log.iter().all(|c| !c.starts_with("REPLICAOF")));
    }

    #[test]
    fn test_pass_respects_candidate_cap() {
        let cluster = MockCluster::new();
        let a = node(&cluster, "a", 7001, MockNodeState::alive());
        // B already at replica_target + 1 = 3 replicas
        let mut b_state = MockNodeState::alive();
        b_state.replicas = vec![
            "10.0.0.8:6379".to_string(),
            "10.0.0.9:6379".to_string(),
            "10.0.0.10:6379".to_string(),
        ];
        let b = node(&cluster, "b", 7002, b_state);
        let nodes = vec![a.clone(), b.clone()];

        run_pass(&nodes);

        // B is over the cap, so A found no eligible candidate
        assert_eq!(a.replica_count().unwrap(), 0);
        assert!(commands(&cluster, 7002)
            .iter()
            .all(|c| !c.starts_with("REPLICAOF")));
        // Pre-existing over-cap state is not corrected
        assert_eq!(b.replica_count().unwrap(), 3);
    }

    #[test]
    fn test_pass_prefers_candidates_with_fewest_replicas() {
        let cluster = MockCluster::new();
        let a = node(&cluster, "a", 7001, MockNodeState::alive());
        let mut b_state = MockNodeState::alive();
        b_state.replicas = vec!["10.0.0.8:6379".to_string(), "10.0.0.9:6379".to_string()];
        let b = node(&cluster, "b", 7002, b_state);
        let c = node(&cluster, "c", 7003, MockNodeState::alive());
        let nodes = vec![a.clone(), b.clone(), c.clone()];

        run_pass(&nodes);

        let a_log = commands(&cluster, 7003);
        let first_attach = a_log
            .iter()
            .find(|c| c.starts_with("REPLICAOF"))
            .expect("C should have been attached");
        // C (0 replicas) is offered to A before B (2 replicas)
        assert_eq!(first_attach, "REPLICAOF 127.0.0.1 7001");
    }

    #[test]
    fn test_pass_skips_satisfied_master() {
        let cluster = MockCluster::new();
        let mut a_state = MockNodeState::alive();
        a_state.replicas = vec!["10.0.0.8:6379".to_string(), "10.0.0.9:6379".to_string()];
        let a = node(&cluster, "a", 7001, a_state);
        let b = node(&cluster, "b", 7002, MockNodeState::alive());
        let nodes = vec![a.clone(), b.clone()];

        run_pass(&nodes);

        // A is at target (2) and must not claim B as master...
        assert!(commands(&cluster, 7002)
            .iter()
            .all(|c| c != "REPLICAOF 127.0.0.1 7001"));
        // ...but B is below target and claims A (A's count 2 < target + 1)
        assert_eq!(b.replica_count().unwrap(), 1);
    }

    #[test]
    fn test_pass_continues_after_attach_failure() {
        let cluster = MockCluster::new();
        let a = node(&cluster, "a", 7001, MockNodeState::alive());
        let mut b_state = MockNodeState::alive();
        b_state.fail_replicaof = true;
        let b = node(&cluster, "b", 7002, b_state);
        let c = node(&cluster, "c", 7003, MockNodeState::alive());
        let nodes = vec![a.clone(), b.clone(), c.clone()];

        let summary = run_pass(&nodes);

        // B's REPLICAOF errors, but C still gets attached to A
        assert!(summary.failures >= 1);
        assert!(commands(&cluster, 7003)
            .iter()
            .any(|c| c == "REPLICAOF 127.0.0.1 7001"));
    }

    #[test]
    fn test_attach_sets_master_writable_first() {
        let cluster = MockCluster::new();
        let a = node(&cluster, "a", 7001, MockNodeState::alive());
        let b = node(&cluster, "b", 7002, MockNodeState::alive());

        assert!(a.attach_replica(&b).unwrap());

        let a_log = commands(&cluster, 7001);
        assert!(a_log.contains(&"CONFIG SET replica-read-only no".to_string()));
        let b_log = commands(&cluster, 7002);
        assert!(b_log.contains(&"REPLICAOF 127.0.0.1 7001".to_string()));
    }

    #[test]
    fn test_manager_runs_and_reports() {
        let cluster = MockCluster::new();
        cluster.add("127.0.0.1:7001", MockNodeState::alive());
        cluster.add("127.0.0.1:7002", MockNodeState::alive());
        let registry = Arc::new(NodeRegistry::new(MockConnectorProvider::provider(&cluster)));
        registry
            .save(NodeConfig::new("a", "127.0.0.1", 7001))
            .unwrap();
        registry
            .save(NodeConfig::new("b", "127.0.0.1", 7002))
            .unwrap();

        let manager = ReplicationTopologyManager::new(registry);
        let summary = manager.run_once().expect("pass should run");
        assert_eq!(summary.attachments, 2);

        // A second pass re-issues attachments without erroring
        let again = manager.run_once().expect("pass should run");
        assert_eq!(again.failures, 0);
    }
}
