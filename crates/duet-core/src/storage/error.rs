//! Local storage error types.

use thiserror::Error;

/// Errors from the local key-value store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Backend I/O failure (database open, transaction, commit).
    #[error("storage i/o error: {0}")]
    Io(String),

    /// A thread panicked while holding the store lock.
    #[error("storage lock poisoned")]
    LockPoisoned,
}
