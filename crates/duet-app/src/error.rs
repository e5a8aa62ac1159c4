//! Session error types.

use duet_client::{ChannelError, KeyStoreError, PipelineError};
use duet_core::{UserId, sync::SyncStoreError};
use thiserror::Error;

/// Errors surfaced by a [`crate::Session`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A conversation needs two distinct participants
    #[error("cannot open a conversation with oneself ({user})")]
    SelfConversation {
        /// The local user
        user: UserId,
    },

    /// A participant id is empty or contains a reserved character
    #[error("invalid user id {user:?}: must be non-empty without '_' or '/'")]
    InvalidUserId {
        /// The rejected id
        user: UserId,
    },

    /// Local key material failed
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    /// Channel state machine rejected an event
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Send, edit, or delete could not be prepared
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Synchronized store failed
    #[error(transparent)]
    Store(#[from] SyncStoreError),

    /// A background worker panicked or was aborted
    #[error("worker failed: {reason}")]
    Worker {
        /// Join error description
        reason: String,
    },

    /// The session was closed
    #[error("session cancelled")]
    Cancelled,
}

impl SessionError {
    /// Returns true if retrying the same operation later can succeed.
    ///
    /// A send blocked on the peer key and store outages are transient.
    /// Encrypt failures, corrupt keys, and closed sessions are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Pipeline(e) => e.is_transient(),
            Self::Store(e) => e.is_transient(),
            Self::KeyStore(e) => !e.is_fatal(),
            Self::SelfConversation { .. }
            | Self::InvalidUserId { .. }
            | Self::Channel(_)
            | Self::Worker { .. }
            | Self::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_send_is_transient() {
        assert!(SessionError::from(PipelineError::ChannelNotEstablished).is_transient());
        assert!(!SessionError::from(PipelineError::EncryptFailure).is_transient());
        assert!(!SessionError::Cancelled.is_transient());
    }

    #[test]
    fn display_passes_through() {
        let err = SessionError::from(PipelineError::ChannelNotEstablished);
        assert_eq!(err.to_string(), "secure channel not established");
    }
}
