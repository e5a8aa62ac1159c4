use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::watch;

use super::{
    ConversationRecord, ConversationWatch, MessagesWatch, NewMessage, PathWatch,
    PublicKeyWatch, PublishedPublicKey, StoredMessage, SyncStore, SyncStoreError,
    conversation_path, messages_path, public_key_path,
};
use crate::{ConversationId, MessageId, UserId};

/// In-memory synchronized store.
///
/// Clones share the same state, so handing one clone to each party models
/// two devices talking through one backend. Observers are notified
/// synchronously on every write.
#[derive(Clone, Default)]
pub struct MemorySyncStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    offline: bool,
    conversations: HashMap<ConversationId, ConversationState>,
    public_keys: HashMap<String, String>,
    key_watchers: HashMap<String, watch::Sender<Option<String>>>,
    conversation_watchers: HashMap<ConversationId, watch::Sender<Option<ConversationRecord>>>,
    message_watchers: HashMap<ConversationId, watch::Sender<Option<u64>>>,
}

struct ConversationState {
    record: ConversationRecord,
    messages: BTreeMap<MessageId, StoredMessage>,
    next_id: u64,
    revision: u64,
}

impl Inner {
    fn state(&self, id: &ConversationId) -> Result<&ConversationState, SyncStoreError> {
        self.conversations
            .get(id)
            .ok_or_else(|| SyncStoreError::ConversationNotFound { conversation: id.clone() })
    }

    fn state_mut(&mut self, id: &ConversationId) -> Result<&mut ConversationState, SyncStoreError> {
        self.conversations
            .get_mut(id)
            .ok_or_else(|| SyncStoreError::ConversationNotFound { conversation: id.clone() })
    }

    fn notify_conversation(&self, id: &ConversationId) {
        if let (Some(sender), Some(state)) =
            (self.conversation_watchers.get(id), self.conversations.get(id))
        {
            sender.send_replace(Some(state.record.clone()));
        }
    }

    fn notify_messages(&self, id: &ConversationId) {
        if let (Some(sender), Some(state)) =
            (self.message_watchers.get(id), self.conversations.get(id))
        {
            sender.send_replace(Some(state.revision));
        }
    }

    fn set_public_key(&mut self, path: String, encoded: String) {
        if let Some(sender) = self.key_watchers.get(&path) {
            sender.send_replace(Some(encoded.clone()));
        }
        self.public_keys.insert(path, encoded);
    }
}

impl MemorySyncStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage. While offline every call returns
    /// `Unavailable`; existing subscriptions stay open.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.offline = offline;
        }
    }

    /// Overwrite a public key path, bypassing the write-once rule and the
    /// conversation-exists precondition. Models a store delivering malformed
    /// or substituted key data.
    pub fn force_public_key(
        &self,
        conversation: &ConversationId,
        user: &UserId,
        encoded: &str,
    ) -> Result<(), SyncStoreError> {
        let mut inner = self.lock()?;
        inner.set_public_key(public_key_path(conversation, user), encoded.to_string());
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, SyncStoreError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| SyncStoreError::Unavailable { reason: "lock poisoned".to_string() })?;

        if inner.offline {
            return Err(SyncStoreError::Unavailable { reason: "store offline".to_string() });
        }
        Ok(inner)
    }
}

impl SyncStore for MemorySyncStore {
    fn conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationRecord>, SyncStoreError> {
        let inner = self.lock()?;
        Ok(inner.conversations.get(id).map(|state| state.record.clone()))
    }

    fn create_conversation(
        &self,
        id: &ConversationId,
        participants: [UserId; 2],
        is_private: bool,
    ) -> Result<ConversationRecord, SyncStoreError> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner.conversations.get(id) {
            return Ok(existing.record.clone());
        }

        let record = ConversationRecord { id: id.clone(), participants, is_private };
        inner.conversations.insert(
            id.clone(),
            ConversationState {
                record: record.clone(),
                messages: BTreeMap::new(),
                next_id: 1,
                revision: 0,
            },
        );
        inner.notify_conversation(id);
        inner.notify_messages(id);

        tracing::debug!(conversation = %id, is_private, "conversation created");
        Ok(record)
    }

    fn set_private(&self, id: &ConversationId, is_private: bool) -> Result<(), SyncStoreError> {
        let mut inner = self.lock()?;
        let state = inner.state_mut(id)?;
        if state.record.is_private == is_private {
            return Ok(());
        }

        state.record.is_private = is_private;
        inner.notify_conversation(id);
        Ok(())
    }

    fn observe_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<ConversationWatch, SyncStoreError> {
        let mut inner = self.lock()?;
        let current = inner.conversations.get(id).map(|state| state.record.clone());
        let receiver = inner
            .conversation_watchers
            .entry(id.clone())
            .or_insert_with(|| watch::Sender::new(current))
            .subscribe();

        Ok(PathWatch::new(conversation_path(id), receiver))
    }

    fn write_public_key(&self, key: &PublishedPublicKey) -> Result<(), SyncStoreError> {
        let mut inner = self.lock()?;
        inner.state(&key.conversation_id)?;

        let path = public_key_path(&key.conversation_id, &key.user_id);
        match inner.public_keys.get(&path) {
            Some(existing) if *existing == key.encoded_key => Ok(()),
            Some(_) => Err(SyncStoreError::PublicKeyAlreadyWritten { path }),
            None => {
                inner.set_public_key(path, key.encoded_key.clone());
                Ok(())
            },
        }
    }

    fn read_public_key(
        &self,
        conversation: &ConversationId,
        user: &UserId,
    ) -> Result<Option<String>, SyncStoreError> {
        let inner = self.lock()?;
        Ok(inner.public_keys.get(&public_key_path(conversation, user)).cloned())
    }

    fn observe_public_key(
        &self,
        conversation: &ConversationId,
        user: &UserId,
    ) -> Result<PublicKeyWatch, SyncStoreError> {
        let mut inner = self.lock()?;
        let path = public_key_path(conversation, user);
        let current = inner.public_keys.get(&path).cloned();
        let receiver = inner
            .key_watchers
            .entry(path.clone())
            .or_insert_with(|| watch::Sender::new(current))
            .subscribe();

        Ok(PathWatch::new(path, receiver))
    }

    fn append_message(
        &self,
        conversation: &ConversationId,
        message: NewMessage,
    ) -> Result<StoredMessage, SyncStoreError> {
        let mut inner = self.lock()?;
        let state = inner.state_mut(conversation)?;

        let id = MessageId(state.next_id);
        state.next_id += 1;
        state.revision += 1;

        let stored = message.into_stored(id);
        state.messages.insert(id, stored.clone());
        inner.notify_messages(conversation);

        Ok(stored)
    }

    fn replace_message(
        &self,
        conversation: &ConversationId,
        message: StoredMessage,
    ) -> Result<(), SyncStoreError> {
        let mut inner = self.lock()?;
        let state = inner.state_mut(conversation)?;

        let Some(slot) = state.messages.get_mut(&message.id) else {
            return Err(SyncStoreError::MessageNotFound {
                conversation: conversation.clone(),
                message: message.id,
            });
        };
        *slot = message;
        state.revision += 1;
        inner.notify_messages(conversation);

        Ok(())
    }

    fn message(
        &self,
        conversation: &ConversationId,
        id: MessageId,
    ) -> Result<Option<StoredMessage>, SyncStoreError> {
        let inner = self.lock()?;
        Ok(inner.state(conversation)?.messages.get(&id).cloned())
    }

    fn load_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<StoredMessage>, SyncStoreError> {
        let inner = self.lock()?;
        match inner.conversations.get(conversation) {
            Some(state) => Ok(state.messages.values().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    fn observe_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<MessagesWatch, SyncStoreError> {
        let mut inner = self.lock()?;
        let current = inner.conversations.get(conversation).map(|state| state.revision);
        let receiver = inner
            .message_watchers
            .entry(conversation.clone())
            .or_insert_with(|| watch::Sender::new(current))
            .subscribe();

        Ok(PathWatch::new(messages_path(conversation), receiver))
    }
}
