//! In-memory cache store

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::cache::CacheStore;
use crate::utils::CacheError;

/// Process-local `CacheStore` variant
///
/// Useful as a zero-dependency tier in a mixed deployment and as the
/// reference store in aggregator tests. Operations never fail.
pub struct InMemoryStore {
    name: String,
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl CacheStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .entries
            .lock()
            .insert(key.to_string(), value.to_string()))
    }

    fn remove(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.lock().remove(key))
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries.lock().clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.entries.lock().keys().cloned().collect())
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.lock().len())
    }

    fn contains_key(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.lock().contains_key(key))
    }

    fn contains_value(&self, value: &str) -> Result<bool, CacheError> {
        Ok(self.entries.lock().values().any(|v| v == value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_map_semantics() {
        let store = InMemoryStore::new("memory");

        assert_eq!(store.put("a", "1").unwrap(), None);
        assert_eq!(store.put("a", "2").unwrap(), Some("1".to_string()));
        assert_eq!(store.get("a").unwrap(), Some("2".to_string()));
        assert!(store.contains_key("a").unwrap());
        assert!(store.contains_value("2").unwrap());
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.remove("a").unwrap(), Some("2".to_string()));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_clear() {
        let store = InMemoryStore::new("memory");
        store.put("a", "1").unwrap();
        store.put("b", "2").unwrap();
        store.clear().unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }
}
