//! Error types for the client layer.
//!
//! Decrypt failures never appear here: the read path degrades to fallback
//! text per message. Only key material and the send path produce errors.

use duet_core::{ConversationId, MessageId, UserId, storage::StorageError};
use thiserror::Error;

use crate::channel::ChannelState;

/// Errors from loading or generating a conversation key pair.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    /// Stored key material does not decode or the halves disagree
    #[error("key material corrupt for {conversation}: {reason}")]
    KeyMaterialCorrupt {
        /// Affected conversation
        conversation: ConversationId,
        /// What failed to decode
        reason: String,
    },

    /// Local storage failed
    #[error("local storage error: {0}")]
    Storage(#[from] StorageError),

    /// A thread panicked while holding a per-conversation lock
    #[error("key store lock poisoned")]
    LockPoisoned,
}

impl KeyStoreError {
    /// Returns true if the secure channel is unavailable for the rest of the
    /// session.
    ///
    /// Corrupt key material is never regenerated, so the conversation stays
    /// without a secure channel until the stored keys are repaired. Storage
    /// failures may succeed when the conversation is reopened.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::KeyMaterialCorrupt { .. })
    }
}

/// Errors from the channel state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Event not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the event arrived
        state: ChannelState,
        /// Event that was attempted
        operation: &'static str,
    },

    /// Event arrived after teardown
    #[error("channel closed")]
    Closed,
}

/// Errors from preparing outgoing, edited, or deleted messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Private conversation without a shared secret yet
    #[error("secure channel not established")]
    ChannelNotEstablished,

    /// Encryption produced no payload; nothing was sent
    #[error("encryption failed, message not sent")]
    EncryptFailure,

    /// Only the author may edit or delete a message
    #[error("message {message} belongs to {author}")]
    NotMessageAuthor {
        /// Target message
        message: MessageId,
        /// Actual author
        author: UserId,
    },
}

impl PipelineError {
    /// Returns true if the same operation can succeed later without user
    /// action (the peer key has not arrived yet).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ChannelNotEstablished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_key_material_is_fatal() {
        let err = KeyStoreError::KeyMaterialCorrupt {
            conversation: ConversationId::from_raw("a_b"),
            reason: "bad".to_string(),
        };
        assert!(err.is_fatal());
        assert!(!KeyStoreError::Storage(StorageError::LockPoisoned).is_fatal());
    }

    #[test]
    fn blocked_send_is_transient_encrypt_failure_is_not() {
        assert!(PipelineError::ChannelNotEstablished.is_transient());
        assert!(!PipelineError::EncryptFailure.is_transient());
    }

    #[test]
    fn error_display() {
        let err = ChannelError::InvalidState {
            state: ChannelState::Established,
            operation: "accept local key",
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition: cannot accept local key from Established"
        );
    }
}
