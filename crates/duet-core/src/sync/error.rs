//! Synchronized store error types.

use thiserror::Error;

use crate::{ConversationId, MessageId};

/// Errors from the synchronized store shared by both parties.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncStoreError {
    /// No conversation record exists at this id
    #[error("conversation not found: {conversation}")]
    ConversationNotFound {
        /// Conversation that was looked up
        conversation: ConversationId,
    },

    /// No message with this ordering key in the conversation
    #[error("message {message} not found in {conversation}")]
    MessageNotFound {
        /// Conversation that was searched
        conversation: ConversationId,
        /// Missing message
        message: MessageId,
    },

    /// A different public key is already published at this path
    #[error("public key already written at {path}")]
    PublicKeyAlreadyWritten {
        /// Store path of the existing key
        path: String,
    },

    /// The store could not be reached
    #[error("sync store unavailable: {reason}")]
    Unavailable {
        /// Backend failure description
        reason: String,
    },

    /// The store dropped an observe-path subscription
    #[error("subscription closed: {path}")]
    SubscriptionClosed {
        /// Observed path
        path: String,
    },
}

impl SyncStoreError {
    /// Returns true if retrying the same operation later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } | Self::SubscriptionClosed { .. } => true,

            Self::ConversationNotFound { .. }
            | Self::MessageNotFound { .. }
            | Self::PublicKeyAlreadyWritten { .. } => false,
        }
    }
}
