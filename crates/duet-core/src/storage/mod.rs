//! Installation-local key-value storage.
//!
//! Holds the Base64-encoded conversation key pairs under
//! `private_key_{conversationId}` / `public_key_{conversationId}`. The trait is
//! synchronous; implementations share state internally so clones see the same
//! data.

mod error;
mod memory;
mod redb;

pub use error::StorageError;
pub use memory::MemoryKeyValueStore;

pub use self::redb::RedbKeyValueStore;

/// Local persistent key-value store scoped to one installation.
///
/// Must be Clone (shared by the key store and background workers), Send +
/// Sync, and synchronous. Implementations typically share internal state via
/// Arc.
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    /// Value stored under `key`. `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write several entries atomically.
    ///
    /// # Invariants
    ///
    /// - Post: either every entry is stored or none is
    fn put_all(&self, entries: &[(&str, &str)]) -> Result<(), StorageError>;

    /// Write a single entry, overwriting any previous value.
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.put_all(&[(key, value)])
    }

    /// Remove an entry. Removing a missing key is a no-op.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
