//! Aggregating cache facade
//!
//! Routes map-style operations across a list of stores that is recomputed
//! from scratch on every call, so node health changes take effect
//! immediately and no index or membership state is cached here.
//!
//! Routing policy, deliberately simple: reads come from the first store (in
//! order) that holds the key; writes always land on the first store of the
//! current list, so a key's physical location can migrate between writes and
//! end up duplicated across nodes as health fluctuates. Stores that fail a
//! probe are skipped with a warning rather than failing the whole operation;
//! only writes surface errors to the caller.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{CacheStore, RemoteStore};
use crate::node::NodeRegistry;
use crate::utils::CacheError;

type StoreProvider = dyn Fn() -> Vec<Arc<dyn CacheStore>> + Send + Sync;

/// Map-like facade over the union of a dynamic store list
pub struct CacheAggregator {
    provider: Box<StoreProvider>,
}

impl CacheAggregator {
    pub fn new(provider: impl Fn() -> Vec<Arc<dyn CacheStore>> + Send + Sync + 'static) -> Self {
        Self {
            provider: Box::new(provider),
        }
    }

    /// Facade over the registry's currently-routable nodes
    pub fn for_registry(registry: Arc<NodeRegistry>) -> Self {
        Self::new(move || {
            registry
                .get_all()
                .into_iter()
                .map(|node| Arc::new(RemoteStore::new(node)) as Arc<dyn CacheStore>)
                .collect()
        })
    }

    fn stores(&self) -> Vec<Arc<dyn CacheStore>> {
        (self.provider)()
    }

    /// Key-to-store resolution: every distinct key paired with the first
    /// store that holds it, in store order. Transient, recomputed per call.
    fn scan(&self) -> Vec<(String, Arc<dyn CacheStore>)> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for store in self.stores() {
            match store.keys() {
                Ok(keys) => {
                    for key in keys {
                        if seen.insert(key.clone()) {
                            resolved.push((key, Arc::clone(&store)));
                        }
                    }
                }
                Err(e) => {
                    warn!(store = store.name(), error = %e, "skipping store during key scan");
                }
            }
        }
        resolved
    }

    /// Value for `key` from the first store that reports holding it
    pub fn get(&self, key: &str) -> Option<String> {
        for store in self.stores() {
            match store.contains_key(key) {
                Ok(true) => match store.get(key) {
                    Ok(value) => return value,
                    Err(e) => {
                        warn!(store = store.name(), error = %e, "read failed, trying next store");
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    warn!(store = store.name(), error = %e, "probe failed, trying next store");
                }
            }
        }
        None
    }

    /// Write `key` to the first store of the current list
    ///
    /// Returns that store's previous value. With no routable store the write
    /// is refused rather than silently dropped.
    pub fn put(&self, key: &str, value: &str) -> Result<Option<String>, CacheError> {
        match self.stores().first() {
            Some(store) => {
                debug!(store = store.name(), key, "write routed");
                store.put(key, value)
            }
            None => Err(CacheError::NoHealthyNodes),
        }
    }

    /// Remove `key` from every store that holds it
    ///
    /// Returns the first previous value encountered; `None` when the key was
    /// absent everywhere.
    pub fn remove(&self, key: &str) -> Option<String> {
        let mut previous = None;
        for store in self.stores() {
            match store.remove(key) {
                Ok(prior) => {
                    if previous.is_none() {
                        previous = prior;
                    }
                }
                Err(e) => {
                    warn!(store = store.name(), error = %e, "remove failed, skipping store");
                }
            }
        }
        previous
    }

    /// Flush every store
    ///
    /// Destructive across the whole union. Per-store outcomes are logged; if
    /// any store failed, the error names the stores still holding data.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut failed = Vec::new();
        for store in self.stores() {
            match store.clear() {
                Ok(()) => debug!(store = store.name(), "cleared"),
                Err(e) => {
                    warn!(store = store.name(), error = %e, "clear failed");
                    failed.push(store.name().to_string());
                }
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(CacheError::PartialClear { failed })
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.stores().iter().any(|store| {
            store.contains_key(key).unwrap_or_else(|e| {
                warn!(store = store.name(), error = %e, "probe failed, skipping store");
                false
            })
        })
    }

    pub fn contains_value(&self, value: &str) -> bool {
        self.stores().iter().any(|store| {
            store.contains_value(value).unwrap_or_else(|e| {
                warn!(store = store.name(), error = %e, "probe failed, skipping store");
                false
            })
        })
    }

    /// Distinct keys across all stores, first-seen order
    pub fn keys(&self) -> Vec<String> {
        self.scan().into_iter().map(|(key, _)| key).collect()
    }

    /// Values for every distinct key, read from the store that won the scan
    pub fn values(&self) -> Vec<String> {
        self.scan()
            .into_iter()
            .filter_map(|(key, store)| store.get(&key).ok().flatten())
            .collect()
    }

    /// Distinct key/value pairs, value taken from the first holding store
    pub fn entries(&self) -> Vec<(String, String)> {
        self.scan()
            .into_iter()
            .filter_map(|(key, store)| {
                let value = store.get(&key).ok().flatten()?;
                Some((key, value))
            })
            .collect()
    }

    /// Number of distinct keys across all stores
    pub fn size(&self) -> usize {
        self.scan().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Per-store key counts for the size report; `None` when a store could
    /// not be probed
    pub fn store_sizes(&self) -> Vec<(String, Option<usize>)> {
        self.stores()
            .iter()
            .map(|store| (store.name().to_string(), store.len().ok()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryStore;
    use crate::node::NodeConfig;
    use crate::testutil::{MockCluster, MockConnectorProvider, MockNodeState};
    use crate::utils::ConnectionError;
    use parking_lot::Mutex;
    use std::io;

    /// Store whose every operation fails with a connection-style error
    struct FailingStore {
        name: String,
    }

    impl FailingStore {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
            }
        }

        fn err(&self) -> CacheError {
            CacheError::Store {
                store: self.name.clone(),
                source: ConnectionError::Command(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "gone",
                )),
            }
        }
    }

    impl CacheStore for FailingStore {
        fn name(&self) -> &str {
            &self.name
        }
        fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(self.err())
        }
        fn put(&self, _: &str, _: &str) -> Result<Option<String>, CacheError> {
            Err(self.err())
        }
        fn remove(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(self.err())
        }
        fn clear(&self) -> Result<(), CacheError> {
            Err(self.err())
        }
        fn keys(&self) -> Result<Vec<String>, CacheError> {
            Err(self.err())
        }
        fn len(&self) -> Result<usize, CacheError> {
            Err(self.err())
        }
        fn contains_key(&self, _: &str) -> Result<bool, CacheError> {
            Err(self.err())
        }
        fn contains_value(&self, _: &str) -> Result<bool, CacheError> {
            Err(self.err())
        }
    }

    fn fixed(stores: Vec<Arc<dyn CacheStore>>) -> CacheAggregator {
        CacheAggregator::new(move || stores.clone())
    }

    #[test]
    fn test_put_then_get() {
        let a = Arc::new(InMemoryStore::new("a"));
        let b = Arc::new(InMemoryStore::new("b"));
        let cache = fixed(vec![a.clone(), b.clone()]);

        assert_eq!(cache.put("foo", "bar").unwrap(), None);
        assert_eq!(cache.get("foo"), Some("bar".to_string()));

        // The write landed on the first store only
        assert_eq!(a.get("foo").unwrap(), Some("bar".to_string()));
        assert_eq!(b.get("foo").unwrap(), None);
    }

    #[test]
    fn test_put_with_no_stores_is_refused() {
        let cache = fixed(vec![]);
        assert!(matches!(
            cache.put("foo", "bar"),
            Err(CacheError::NoHealthyNodes)
        ));
    }

    #[test]
    fn test_get_prefers_first_holding_store() {
        let a = Arc::new(InMemoryStore::new("a"));
        let b = Arc::new(InMemoryStore::new("b"));
        a.put("k", "from-a").unwrap();
        b.put("k", "from-b").unwrap();
        let cache = fixed(vec![a, b]);

        assert_eq!(cache.get("k"), Some("from-a".to_string()));
    }

    #[test]
    fn test_get_skips_store_without_key() {
        let a = Arc::new(InMemoryStore::new("a"));
        let b = Arc::new(InMemoryStore::new("b"));
        b.put("k", "from-b").unwrap();
        let cache = fixed(vec![a, b]);

        assert_eq!(cache.get("k"), Some("from-b".to_string()));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_get_degrades_past_failing_store() {
        let broken: Arc<dyn CacheStore> = Arc::new(FailingStore::new("broken"));
        let b = Arc::new(InMemoryStore::new("b"));
        b.put("k", "v").unwrap();
        let cache = fixed(vec![broken, b]);

        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_remove_hits_every_holder() {
        let a = Arc::new(InMemoryStore::new("a"));
        let b = Arc::new(InMemoryStore::new("b"));
        a.put("k", "from-a").unwrap();
        b.put("k", "from-b").unwrap();
        let cache = fixed(vec![a.clone(), b.clone()]);

        assert_eq!(cache.remove("k"), Some("from-a".to_string()));
        assert!(!cache.contains_key("k"));
        assert_eq!(a.get("k").unwrap(), None);
        assert_eq!(b.get("k").unwrap(), None);
        assert_eq!(cache.remove("k"), None);
    }

    #[test]
    fn test_keys_and_size_deduplicate() {
        let a = Arc::new(InMemoryStore::new("a"));
        let b = Arc::new(InMemoryStore::new("b"));
        a.put("shared", "1").unwrap();
        b.put("shared", "2").unwrap();
        b.put("only-b", "3").unwrap();
        let cache = fixed(vec![a, b]);

        let keys = cache.keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.iter().filter(|k| *k == "shared").count(), 1);
        assert_eq!(cache.size(), 2);
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_entries_value_from_winning_store() {
        let a = Arc::new(InMemoryStore::new("a"));
        let b = Arc::new(InMemoryStore::new("b"));
        a.put("shared", "1").unwrap();
        b.put("shared", "2").unwrap();
        let cache = fixed(vec![a, b]);

        assert_eq!(cache.entries(), vec![("shared".to_string(), "1".to_string())]);
        assert_eq!(cache.values(), vec!["1".to_string()]);
    }

    #[test]
    fn test_contains_value_across_stores() {
        let a = Arc::new(InMemoryStore::new("a"));
        let b = Arc::new(InMemoryStore::new("b"));
        b.put("k", "needle").unwrap();
        let cache = fixed(vec![a, b]);

        assert!(cache.contains_value("needle"));
        assert!(!cache.contains_value("haystack"));
    }

    #[test]
    fn test_clear_reports_partial_failure() {
        let a = Arc::new(InMemoryStore::new("a"));
        let broken: Arc<dyn CacheStore> = Arc::new(FailingStore::new("broken"));
        let b = Arc::new(InMemoryStore::new("b"));
        a.put("k1", "v").unwrap();
        b.put("k2", "v").unwrap();
        let cache = fixed(vec![a.clone(), broken, b.clone()]);

        match cache.clear() {
            Err(CacheError::PartialClear { failed }) => {
                assert_eq!(failed, vec!["broken".to_string()]);
            }
            other => panic!("expected PartialClear, got {other:?}"),
        }
        // The healthy stores were still flushed
        assert!(a.is_empty().unwrap());
        assert!(b.is_empty().unwrap());
    }

    #[test]
    fn test_clear_all_healthy() {
        let a = Arc::new(InMemoryStore::new("a"));
        a.put("k", "v").unwrap();
        let cache = fixed(vec![a as Arc<dyn CacheStore>]);
        assert!(cache.clear().is_ok());
    }

    #[test]
    fn test_write_migrates_when_first_store_changes() {
        // Health changes between writes reroute the same key, leaving two
        // physical copies behind
        let a = Arc::new(InMemoryStore::new("a"));
        let b = Arc::new(InMemoryStore::new("b"));
        let active: Arc<Mutex<Vec<Arc<dyn CacheStore>>>> =
            Arc::new(Mutex::new(vec![a.clone(), b.clone()]));

        let provider_view = Arc::clone(&active);
        let cache = CacheAggregator::new(move || provider_view.lock().clone());

        cache.put("k", "v1").unwrap();
        assert_eq!(a.get("k").unwrap(), Some("v1".to_string()));

        // First store drops out of the healthy list
        *active.lock() = vec![b.clone()];
        cache.put("k", "v2").unwrap();
        assert_eq!(b.get("k").unwrap(), Some("v2".to_string()));

        // First store recovers: both copies exist, reads are resolved by
        // whichever store is checked first
        *active.lock() = vec![a.clone(), b.clone()];
        assert_eq!(cache.get("k"), Some("v1".to_string()));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_for_registry_routes_through_healthy_nodes() {
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
        let cache = CacheAggregator::for_registry(Arc::clone(&registry));

        cache.put("foo", "bar").unwrap();
        assert_eq!(cache.get("foo"), Some("bar".to_string()));
        assert!(cluster
            .state("127.0.0.1:7001")
            .lock()
            .data
            .contains_key("foo"));
        assert!(!cluster
            .state("127.0.0.1:7002")
            .lock()
            .data
            .contains_key("foo"));

        // First node dies; the same key now lands on the second node
        cluster.state("127.0.0.1:7001").lock().alive = false;
        cache.put("foo", "baz").unwrap();
        assert_eq!(cache.get("foo"), Some("baz".to_string()));
        assert!(cluster
            .state("127.0.0.1:7002")
            .lock()
            .data
            .contains_key("foo"));
    }

    #[test]
    fn test_for_registry_no_nodes() {
        let cluster = MockCluster::new();
        let registry = Arc::new(NodeRegistry::new(MockConnectorProvider::provider(&cluster)));
        let cache = CacheAggregator::for_registry(registry);

        assert!(matches!(
            cache.put("k", "v"),
            Err(CacheError::NoHealthyNodes)
        ));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.size(), 0);
    }

}
