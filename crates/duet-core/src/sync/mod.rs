//! Interface of the external synchronized store.
//!
//! The store is path-addressable and shared by both parties. It carries the
//! conversation record (with its `isPrivate` flag), one write-once public key
//! per participant, and the ordered message list. Observe-path subscriptions
//! are delivered through [`PathWatch`], a thin wrapper over a tokio `watch`
//! receiver; dropping the watch cancels the subscription.

mod error;
mod memory;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub use error::SyncStoreError;
pub use memory::MemorySyncStore;

use crate::{ConversationId, MessageId, UserId};

/// Store path of a participant's published public key.
pub fn public_key_path(conversation: &ConversationId, user: &UserId) -> String {
    format!("conversations/{conversation}/public_keys/{user}")
}

/// Store path of a conversation record.
pub fn conversation_path(conversation: &ConversationId) -> String {
    format!("conversations/{conversation}")
}

/// Store path of a conversation's message list.
pub fn messages_path(conversation: &ConversationId) -> String {
    format!("conversations/{conversation}/messages")
}

/// Conversation record at `conversations/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// Conversation id
    pub id: ConversationId,
    /// The two participants
    pub participants: [UserId; 2],
    /// Whether message text is stored encrypted
    pub is_private: bool,
}

impl ConversationRecord {
    /// The participant that is not `user`, if `user` takes part.
    pub fn peer_of(&self, user: &UserId) -> Option<&UserId> {
        match &self.participants {
            [a, b] if a == user => Some(b),
            [a, b] if b == user => Some(a),
            _ => None,
        }
    }
}

/// A public key published at [`public_key_path`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedPublicKey {
    /// Conversation the key belongs to
    pub conversation_id: ConversationId,
    /// Publishing participant
    pub user_id: UserId,
    /// Standard Base64 of the 32-byte public key
    pub encoded_key: String,
}

/// A message as stored. Text fields hold an encrypted payload when the
/// conversation was private at write time, plaintext otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Monotonic per-conversation ordering key
    pub id: MessageId,
    /// Author
    pub sender_id: UserId,
    /// Stored text (payload or plaintext)
    pub message_text: String,
    /// Wall-clock milliseconds at send time
    pub timestamp: u64,
    /// Stored text of the quoted message, if any
    pub quoted_message_text: Option<String>,
    /// Author of the quoted message, if any
    pub quoted_message_author: Option<UserId>,
    /// Set once the text has been edited
    pub is_edited: bool,
    /// Set once the recipient has seen the message
    pub is_seen: bool,
    /// Attached media references
    pub media_refs: Vec<String>,
}

/// A message ready to append. The store assigns the [`MessageId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Author
    pub sender_id: UserId,
    /// Stored text (payload or plaintext)
    pub message_text: String,
    /// Wall-clock milliseconds at send time
    pub timestamp: u64,
    /// Stored text of the quoted message, if any
    pub quoted_message_text: Option<String>,
    /// Author of the quoted message, if any
    pub quoted_message_author: Option<UserId>,
    /// Attached media references
    pub media_refs: Vec<String>,
}

impl NewMessage {
    fn into_stored(self, id: MessageId) -> StoredMessage {
        StoredMessage {
            id,
            sender_id: self.sender_id,
            message_text: self.message_text,
            timestamp: self.timestamp,
            quoted_message_text: self.quoted_message_text,
            quoted_message_author: self.quoted_message_author,
            is_edited: false,
            is_seen: false,
            media_refs: self.media_refs,
        }
    }
}

/// Continuous subscription to one store path.
///
/// Holds `None` while nothing is stored at the path.
#[derive(Debug)]
pub struct PathWatch<T> {
    path: String,
    receiver: watch::Receiver<Option<T>>,
}

impl<T: Clone> PathWatch<T> {
    /// Wrap a watch receiver for `path`.
    pub fn new(path: String, receiver: watch::Receiver<Option<T>>) -> Self {
        Self { path, receiver }
    }

    /// Observed path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Latest value, marking it as seen.
    pub fn current(&mut self) -> Option<T> {
        self.receiver.borrow_and_update().clone()
    }

    /// Wait for the next update and return the new value.
    ///
    /// Cancel-safe: dropping the future loses no update.
    ///
    /// # Errors
    ///
    /// - `SubscriptionClosed` if the store dropped the path
    pub async fn changed(&mut self) -> Result<Option<T>, SyncStoreError> {
        self.receiver
            .changed()
            .await
            .map_err(|_| SyncStoreError::SubscriptionClosed { path: self.path.clone() })?;
        Ok(self.receiver.borrow_and_update().clone())
    }
}

/// Subscription to a participant's public key.
pub type PublicKeyWatch = PathWatch<String>;

/// Subscription to a conversation record.
pub type ConversationWatch = PathWatch<ConversationRecord>;

/// Subscription to a conversation's message list. The value is a revision
/// counter bumped on every append or replace.
pub type MessagesWatch = PathWatch<u64>;

/// The external synchronized store.
///
/// Must be Clone (shared by the session and its workers), Send + Sync, and
/// synchronous apart from the observe-path subscriptions.
pub trait SyncStore: Clone + Send + Sync + 'static {
    /// Conversation record, if it exists.
    fn conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationRecord>, SyncStoreError>;

    /// Create a conversation record.
    ///
    /// Idempotent: if the record already exists it is returned unchanged.
    fn create_conversation(
        &self,
        id: &ConversationId,
        participants: [UserId; 2],
        is_private: bool,
    ) -> Result<ConversationRecord, SyncStoreError>;

    /// Set the conversation's `isPrivate` flag.
    fn set_private(&self, id: &ConversationId, is_private: bool) -> Result<(), SyncStoreError>;

    /// Observe a conversation record.
    fn observe_conversation(&self, id: &ConversationId)
    -> Result<ConversationWatch, SyncStoreError>;

    /// Publish a participant's public key.
    ///
    /// # Invariants
    ///
    /// - Pre: the conversation record exists
    /// - Write-once: rewriting the identical value is a no-op, a different
    ///   value is rejected
    fn write_public_key(&self, key: &PublishedPublicKey) -> Result<(), SyncStoreError>;

    /// Published key of `user`, if any.
    fn read_public_key(
        &self,
        conversation: &ConversationId,
        user: &UserId,
    ) -> Result<Option<String>, SyncStoreError>;

    /// Observe the public key path of `user`. Allowed before the
    /// conversation exists, since the peer may publish first.
    fn observe_public_key(
        &self,
        conversation: &ConversationId,
        user: &UserId,
    ) -> Result<PublicKeyWatch, SyncStoreError>;

    /// Append a message, assigning the next ordering key.
    fn append_message(
        &self,
        conversation: &ConversationId,
        message: NewMessage,
    ) -> Result<StoredMessage, SyncStoreError>;

    /// Overwrite a stored message in place (edit, soft delete).
    fn replace_message(
        &self,
        conversation: &ConversationId,
        message: StoredMessage,
    ) -> Result<(), SyncStoreError>;

    /// A single stored message.
    fn message(
        &self,
        conversation: &ConversationId,
        id: MessageId,
    ) -> Result<Option<StoredMessage>, SyncStoreError>;

    /// All messages of a conversation, ordered by [`MessageId`].
    fn load_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<StoredMessage>, SyncStoreError>;

    /// Observe the message list of a conversation.
    fn observe_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<MessagesWatch, SyncStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ConversationRecord {
        ConversationRecord {
            id: ConversationId::for_participants(&"alice".into(), &"bob".into()),
            participants: ["alice".into(), "bob".into()],
            is_private: true,
        }
    }

    #[test]
    fn public_key_path_layout() {
        let conversation = ConversationId::from_raw("alice_bob");
        let path = public_key_path(&conversation, &"bob".into());
        assert_eq!(path, "conversations/alice_bob/public_keys/bob");
    }

    #[test]
    fn peer_of_returns_other_participant() {
        let record = record();
        assert_eq!(record.peer_of(&"alice".into()), Some(&UserId::from("bob")));
        assert_eq!(record.peer_of(&"bob".into()), Some(&UserId::from("alice")));
        assert_eq!(record.peer_of(&"carol".into()), None);
    }

    #[test]
    fn stored_message_uses_camel_case_fields() {
        let message = StoredMessage {
            id: MessageId(1),
            sender_id: "alice".into(),
            message_text: "hi".to_string(),
            timestamp: 5,
            quoted_message_text: None,
            quoted_message_author: None,
            is_edited: false,
            is_seen: true,
            media_refs: vec!["img/1".to_string()],
        };

        let json = serde_json::to_value(&message).unwrap();
        for field in [
            "senderId",
            "messageText",
            "timestamp",
            "quotedMessageText",
            "quotedMessageAuthor",
            "isEdited",
            "isSeen",
            "mediaRefs",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["senderId"], "alice");
    }

    #[test]
    fn conversation_record_serializes_is_private() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["isPrivate"], true);
        assert_eq!(json["id"], "alice_bob");
    }

    #[tokio::test]
    async fn path_watch_reports_updates() {
        let (sender, receiver) = watch::channel(None);
        let mut watch = PathWatch::new("p".to_string(), receiver);
        assert_eq!(watch.current(), None::<String>);

        sender.send_replace(Some("k".to_string()));
        assert_eq!(watch.changed().await.unwrap(), Some("k".to_string()));
    }

    #[tokio::test]
    async fn path_watch_closed_when_sender_dropped() {
        let (sender, receiver) = watch::channel::<Option<String>>(None);
        let mut watch = PathWatch::new("p".to_string(), receiver);
        drop(sender);

        let result = watch.changed().await;
        assert_eq!(result, Err(SyncStoreError::SubscriptionClosed { path: "p".to_string() }));
    }
}
