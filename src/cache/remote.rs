//! Cache store over one remote backend node

use std::io;
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::client::{KvCommands, KvTransport};
use crate::node::BackendNode;
use crate::utils::CacheError;

/// `CacheStore` implementation backed by a single backend node
pub struct RemoteStore {
    node: Arc<BackendNode>,
}

impl RemoteStore {
    pub fn new(node: Arc<BackendNode>) -> Self {
        Self { node }
    }

    fn run<R>(
        &self,
        op: impl FnOnce(&mut dyn KvTransport) -> io::Result<R>,
    ) -> Result<R, CacheError> {
        self.node.with_conn(op).map_err(|source| CacheError::Store {
            store: self.node.id().to_string(),
            source,
        })
    }
}

impl CacheStore for RemoteStore {
    fn name(&self) -> &str {
        self.node.id()
    }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.run(|conn| conn.get(key))
    }

    fn put(&self, key: &str, value: &str) -> Result<Option<String>, CacheError> {
        self.run(|conn| {
            let previous = conn.get(key)?;
            conn.set(key, value)?;
            Ok(previous)
        })
    }

    fn remove(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.run(|conn| {
            let previous = conn.get(key)?;
            conn.del(key)?;
            Ok(previous)
        })
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.run(|conn| conn.flushall())
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.run(|conn| conn.keys("*"))
    }

    fn len(&self) -> Result<usize, CacheError> {
        self.run(|conn| conn.dbsize()).map(|n| n.max(0) as usize)
    }

    fn contains_key(&self, key: &str) -> Result<bool, CacheError> {
        self.run(|conn| conn.exists(key))
    }

    fn contains_value(&self, value: &str) -> Result<bool, CacheError> {
        self.run(|conn| {
            for key in conn.keys("*")? {
                if let Some(candidate) = conn.get(&key)? {
                    if candidate == value {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        })
    }
}
