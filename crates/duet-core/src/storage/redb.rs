//! Redb-backed durable key-value store.
//!
//! Uses Redb's ACID transactions so a key pair's two halves are always
//! written together. One database file per installation.

use std::{path::Path, sync::Arc};

use redb::{Database, TableDefinition};

use super::{KeyValueStore, StorageError};

/// Table: local_kv
/// Key: storage key (e.g. `private_key_alice_bob`)
/// Value: Base64 text
const LOCAL_KV: TableDefinition<&str, &str> = TableDefinition::new("local_kv");

/// Durable key-value store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbKeyValueStore {
    db: Arc<Database>,
}

impl RedbKeyValueStore {
    /// Open or create a Redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(LOCAL_KV).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), "opened local key-value store");

        Ok(Self { db: Arc::new(db) })
    }
}

impl KeyValueStore for RedbKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(LOCAL_KV).map_err(|e| StorageError::Io(e.to_string()))?;

        let value = table.get(key).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(value.map(|guard| guard.value().to_string()))
    }

    fn put_all(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(LOCAL_KV).map_err(|e| StorageError::Io(e.to_string()))?;

            for (key, value) in entries {
                table.insert(*key, *value).map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(LOCAL_KV).map_err(|e| StorageError::Io(e.to_string()))?;
            table.remove(key).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn put_then_get() {
        let dir = tempdir().unwrap();
        let store = RedbKeyValueStore::open(dir.path().join("local.redb")).unwrap();

        store.put("public_key_a_b", "AAAA").unwrap();
        assert_eq!(store.get("public_key_a_b").unwrap().as_deref(), Some("AAAA"));
    }

    #[test]
    fn get_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = RedbKeyValueStore::open(dir.path().join("local.redb")).unwrap();

        assert!(store.get("nothing").unwrap().is_none());
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local.redb");

        {
            let store = RedbKeyValueStore::open(&path).unwrap();
            store.put_all(&[("private_key_x", "p"), ("public_key_x", "q")]).unwrap();
        }

        let reopened = RedbKeyValueStore::open(&path).unwrap();
        assert_eq!(reopened.get("private_key_x").unwrap().as_deref(), Some("p"));
        assert_eq!(reopened.get("public_key_x").unwrap().as_deref(), Some("q"));
    }

    #[test]
    fn remove_deletes_entry() {
        let dir = tempdir().unwrap();
        let store = RedbKeyValueStore::open(dir.path().join("local.redb")).unwrap();

        store.put("k", "v").unwrap();
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }
}
