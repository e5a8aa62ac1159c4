use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{KeyValueStore, StorageError};

/// In-memory key-value store for tests and ephemeral installs.
///
/// All state is wrapped in `Arc<Mutex<>>` so clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries. Zero if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |map| map.len())
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(map.get(key).cloned())
    }

    fn put_all(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut map = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.lock().map_err(|_| StorageError::LockPoisoned)?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_returns_none() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.get("absent").unwrap(), None);
    }

    #[test]
    fn put_then_get() {
        let store = MemoryKeyValueStore::new();
        store.put("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn put_all_writes_every_entry() {
        let store = MemoryKeyValueStore::new();
        store.put_all(&[("a", "1"), ("b", "2")]).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn clones_share_state() {
        let store = MemoryKeyValueStore::new();
        let clone = store.clone();
        clone.put("shared", "yes").unwrap();
        assert_eq!(store.get("shared").unwrap().as_deref(), Some("yes"));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = MemoryKeyValueStore::new();
        store.put("k", "v").unwrap();
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert!(store.is_empty());
    }
}
