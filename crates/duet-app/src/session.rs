//! Conversation session runtime.
//!
//! A [`Session`] owns one [`ChannelStateMachine`] and executes its actions
//! against the key store and the synchronized store. The loop in
//! [`Session::process_cycle`] waits on whichever comes first: a finished
//! worker, a store subscription update, or a timer tick.

use std::collections::VecDeque;

use duet_client::{
    ChannelAction, ChannelEvent, ChannelState, ChannelStateMachine, DisplayMessage, KeyStore,
    MessagePipeline, PrivacyContext, QuotedMessage,
};
use duet_core::{
    ConversationId, MessageId, UserId,
    env::Environment,
    storage::KeyValueStore,
    sync::{
        ConversationWatch, MessagesWatch, PublicKeyWatch, PublishedPublicKey, StoredMessage,
        SyncStore, SyncStoreError,
    },
};
use tokio::task::JoinSet;

use crate::{
    cancel::CancelToken,
    config::SessionConfig,
    error::SessionError,
    update::SessionUpdate,
    worker::{self, WorkerOutcome},
};

/// One open conversation between the local user and a peer.
///
/// Must be created and driven inside a tokio runtime. State is rebuilt from
/// scratch on every open; only the key pair persists across sessions.
pub struct Session<E, K, S>
where
    E: Environment,
    K: KeyValueStore,
    S: SyncStore,
{
    env: E,
    config: SessionConfig,
    local_user: UserId,
    peer_user: UserId,
    conversation: ConversationId,
    keys: KeyStore<K>,
    store: S,
    channel: ChannelStateMachine<E::Instant>,
    pipeline: MessagePipeline<E>,
    cancel: CancelToken,
    peer_watch: Option<PublicKeyWatch>,
    conversation_watch: ConversationWatch,
    messages_watch: MessagesWatch,
    workers: JoinSet<WorkerOutcome>,
    pending: VecDeque<ChannelEvent<E::Instant>>,
    /// Public key whose publication failed and is retried on tick.
    unpublished: Option<String>,
    messages: Vec<DisplayMessage>,
    closed: bool,
}

impl<E, K, S> Session<E, K, S>
where
    E: Environment,
    K: KeyValueStore,
    S: SyncStore,
{
    /// Open the conversation between `local_user` and `peer_user`.
    ///
    /// Starts loading the local key pair on a worker and subscribes to the
    /// peer's public key, the conversation record, and the message list.
    ///
    /// # Errors
    ///
    /// - `SelfConversation` if both users are the same
    /// - `InvalidUserId` if either id is empty or contains a reserved
    ///   character
    /// - `Store` if a subscription cannot be established
    pub fn open(
        env: E,
        config: SessionConfig,
        local_user: UserId,
        peer_user: UserId,
        keys: KeyStore<K>,
        store: S,
    ) -> Result<Self, SessionError> {
        if local_user == peer_user {
            return Err(SessionError::SelfConversation { user: local_user });
        }
        for user in [&local_user, &peer_user] {
            if !user.is_well_formed() {
                return Err(SessionError::InvalidUserId { user: user.clone() });
            }
        }

        let conversation = ConversationId::for_participants(&local_user, &peer_user);
        let (channel, actions) = ChannelStateMachine::new(config.channel.clone(), env.now());
        let mut conversation_watch = store.observe_conversation(&conversation)?;
        let messages_watch = store.observe_messages(&conversation)?;

        let mut pending = VecDeque::new();
        if let Some(record) = conversation_watch.current() {
            pending.push_back(ChannelEvent::ConversationObserved { is_private: record.is_private });
        }

        tracing::info!(%conversation, local = %local_user, peer = %peer_user, "opening session");

        let mut session = Self {
            pipeline: MessagePipeline::new(local_user.clone(), env.clone()),
            env,
            config,
            local_user,
            peer_user,
            conversation,
            keys,
            store,
            channel,
            cancel: CancelToken::new(),
            peer_watch: None,
            conversation_watch,
            messages_watch,
            workers: JoinSet::new(),
            pending,
            unpublished: None,
            messages: Vec::new(),
            closed: false,
        };

        // Initial actions produce no updates: only worker spawns and the
        // peer subscription.
        session.execute(actions)?;
        Ok(session)
    }

    /// Conversation id
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation
    }

    /// Local user
    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    /// Peer user
    pub fn peer_user(&self) -> &UserId {
        &self.peer_user
    }

    /// Current channel state
    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Last refreshed message list, in store order.
    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    /// Token that closes this session from elsewhere (e.g. the view).
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the session was closed or cancelled.
    pub fn is_closed(&self) -> bool {
        self.closed || self.cancel.is_cancelled()
    }

    /// Privacy snapshot used for the next seal or open.
    pub fn privacy_context(&self) -> PrivacyContext {
        PrivacyContext {
            is_private: self.channel.is_private(),
            secret: self.channel.secret().cloned(),
        }
    }

    /// Run one loop iteration and return what changed.
    ///
    /// Queued events are applied first. Otherwise waits for the first of: a
    /// finished worker, a peer-key update, a conversation update, a message
    /// list update, or the tick interval.
    ///
    /// # Errors
    ///
    /// - `Cancelled` once the session is closed
    /// - `Worker` if a worker panicked
    /// - `Store` / `Channel` from executing actions
    pub async fn process_cycle(&mut self) -> Result<Vec<SessionUpdate>, SessionError> {
        self.ensure_open()?;

        if let Some(event) = self.pending.pop_front() {
            return self.apply(event).await;
        }

        tokio::select! {
            Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => {
                let outcome = joined.map_err(|e| SessionError::Worker { reason: e.to_string() })?;
                if self.cancel.is_cancelled() {
                    tracing::debug!(conversation = %self.conversation, "discarding worker result");
                    return Err(SessionError::Cancelled);
                }
                self.apply(outcome.into_event()).await
            }

            changed = next_peer_key(&mut self.peer_watch) => match changed {
                Ok(Some(encoded)) => self.apply(ChannelEvent::PeerKeyObserved { encoded }).await,
                Ok(None) => Ok(Vec::new()),
                Err(error) => {
                    tracing::warn!(%error, "peer key subscription lost, resubscribing");
                    self.subscribe_peer_key()?;
                    Ok(Vec::new())
                },
            },

            changed = self.conversation_watch.changed() => match changed? {
                Some(record) => {
                    let is_private = record.is_private;
                    let mut updates = vec![SessionUpdate::ConversationChanged { is_private }];
                    updates.extend(self.apply(ChannelEvent::ConversationObserved { is_private }).await?);
                    Ok(updates)
                },
                None => Ok(Vec::new()),
            },

            changed = self.messages_watch.changed() => {
                changed?;
                let messages = self.refresh_messages().await?;
                Ok(vec![SessionUpdate::MessagesRefreshed(messages)])
            },

            () = self.env.sleep(self.config.tick_interval) => {
                self.retry_publication();
                let now = self.env.now();
                self.apply(ChannelEvent::Tick { now }).await
            },
        }
    }

    /// Send a message, creating the conversation record on first send.
    ///
    /// A new conversation is created non-private; the key exchange upgrades
    /// it once both keys are known. In a private conversation the send is
    /// blocked until the channel is established.
    ///
    /// # Errors
    ///
    /// - `Pipeline(ChannelNotEstablished)` if private and no secret yet
    /// - `Pipeline(EncryptFailure)` if encryption failed; nothing is sent
    /// - `Store` if the store rejects the write
    pub async fn send_message(
        &mut self,
        text: &str,
        quoted: Option<QuotedMessage>,
        media_refs: Vec<String>,
    ) -> Result<StoredMessage, SessionError> {
        self.ensure_open()?;
        let stored_private = self.ensure_conversation()?;

        let pipeline = self.pipeline.clone();
        let context = self.sealing_context(stored_private);
        let text = text.to_string();
        let message = tokio::task::spawn_blocking(move || {
            pipeline.prepare_outgoing(&context, &text, quoted.as_ref(), media_refs)
        })
        .await
        .map_err(|e| SessionError::Worker { reason: e.to_string() })??;

        let stored = self.store.append_message(&self.conversation, message)?;
        tracing::debug!(conversation = %self.conversation, message = %stored.id, "message sent");
        Ok(stored)
    }

    /// Replace the text of an own message and mark it edited.
    ///
    /// # Errors
    ///
    /// - `Store(MessageNotFound)` if no such message exists
    /// - `Pipeline(NotMessageAuthor)` if the local user did not write it
    /// - the send-path errors of [`Session::send_message`]
    pub async fn edit_message(
        &mut self,
        id: MessageId,
        new_text: &str,
    ) -> Result<StoredMessage, SessionError> {
        self.ensure_open()?;
        let original = self.load_message(id)?;
        let stored_private = self.stored_privacy()?;

        let pipeline = self.pipeline.clone();
        let context = self.sealing_context(stored_private);
        let new_text = new_text.to_string();
        let edited =
            tokio::task::spawn_blocking(move || pipeline.edit(&context, &original, &new_text))
                .await
                .map_err(|e| SessionError::Worker { reason: e.to_string() })??;

        self.store.replace_message(&self.conversation, edited.clone())?;
        Ok(edited)
    }

    /// Soft-delete an own message: sentinel text, no media.
    ///
    /// # Errors
    ///
    /// As for [`Session::edit_message`].
    pub async fn delete_message(&mut self, id: MessageId) -> Result<StoredMessage, SessionError> {
        self.ensure_open()?;
        let original = self.load_message(id)?;
        let stored_private = self.stored_privacy()?;

        let pipeline = self.pipeline.clone();
        let context = self.sealing_context(stored_private);
        let deleted = tokio::task::spawn_blocking(move || pipeline.soft_delete(&context, &original))
            .await
            .map_err(|e| SessionError::Worker { reason: e.to_string() })??;

        self.store.replace_message(&self.conversation, deleted.clone())?;
        Ok(deleted)
    }

    /// Re-read the message list and decrypt it on blocking workers.
    ///
    /// Order follows the store's message ids regardless of which chunk
    /// finishes first. Messages that fail to decrypt show their stored text.
    ///
    /// # Errors
    ///
    /// - `Cancelled` if the session was cancelled while decrypting; the
    ///   results are discarded
    /// - `Store` / `Worker` on failure
    pub async fn refresh_messages(&mut self) -> Result<Vec<DisplayMessage>, SessionError> {
        self.ensure_open()?;

        let stored = self.store.load_messages(&self.conversation)?;
        let context = self.privacy_context();
        let decrypted = worker::decrypt_in_chunks(
            &self.pipeline,
            &context,
            &stored,
            self.config.decrypt_chunk_size,
        )
        .await?;

        if self.cancel.is_cancelled() {
            tracing::debug!(conversation = %self.conversation, "discarding batch decrypt");
            return Err(SessionError::Cancelled);
        }

        self.messages.clone_from(&decrypted);
        Ok(decrypted)
    }

    /// Close the session: cancel the peer subscription and discard any
    /// outstanding worker results. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.cancel.cancel();
        if let Err(error) = self.channel.handle(ChannelEvent::Teardown) {
            tracing::debug!(%error, "channel already closed");
        }
        self.peer_watch = None;
        self.pending.clear();
        self.workers.abort_all();
        self.closed = true;

        tracing::info!(conversation = %self.conversation, "session closed");
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() { Err(SessionError::Cancelled) } else { Ok(()) }
    }

    /// Create the record on first send and return the stored `isPrivate`
    /// flag. The channel learns about a new record on the next cycle.
    fn ensure_conversation(&mut self) -> Result<bool, SessionError> {
        if self.channel.conversation_exists() {
            return self.stored_privacy();
        }

        let record = self.store.create_conversation(
            &self.conversation,
            [self.local_user.clone(), self.peer_user.clone()],
            false,
        )?;
        self.pending.push_back(ChannelEvent::ConversationObserved { is_private: record.is_private });
        Ok(record.is_private)
    }

    fn stored_privacy(&self) -> Result<bool, SessionError> {
        let record = self.store.conversation(&self.conversation)?;
        Ok(record.is_some_and(|record| record.is_private))
    }

    /// Context for sealing outgoing text. The channel's view of `isPrivate`
    /// can lag the store by a cycle; the stored flag wins if it is set.
    fn sealing_context(&mut self, stored_private: bool) -> PrivacyContext {
        if stored_private && !self.channel.is_private() {
            self.pending.push_back(ChannelEvent::ConversationObserved { is_private: true });
        }

        let mut context = self.privacy_context();
        context.is_private |= stored_private;
        context
    }

    fn load_message(&self, id: MessageId) -> Result<StoredMessage, SessionError> {
        self.store.message(&self.conversation, id)?.ok_or_else(|| {
            SessionError::Store(SyncStoreError::MessageNotFound {
                conversation: self.conversation.clone(),
                message: id,
            })
        })
    }

    async fn apply(
        &mut self,
        event: ChannelEvent<E::Instant>,
    ) -> Result<Vec<SessionUpdate>, SessionError> {
        let actions = self.channel.handle(event)?;
        let mut updates = self.execute(actions)?;

        let established = updates.iter().any(|update| {
            matches!(update, SessionUpdate::ChannelStateChanged { to: ChannelState::Established, .. })
        });
        if established {
            let messages = self.refresh_messages().await?;
            updates.push(SessionUpdate::MessagesRefreshed(messages));
        }

        Ok(updates)
    }

    fn execute(&mut self, actions: Vec<ChannelAction>) -> Result<Vec<SessionUpdate>, SessionError> {
        let mut updates = Vec::new();

        for action in actions {
            match action {
                ChannelAction::LoadLocalKeys => {
                    self.workers.spawn_blocking(worker::load_local_keys(
                        self.keys.clone(),
                        self.conversation.clone(),
                        self.env.clone(),
                    ));
                },
                ChannelAction::SubscribePeerKey => self.subscribe_peer_key()?,
                ChannelAction::PublishPublicKey { encoded } => self.publish(encoded),
                ChannelAction::DeriveSecret { local, peer } => {
                    self.workers.spawn_blocking(worker::derive_shared_secret(local, peer));
                },
                ChannelAction::MarkConversationPrivate => {
                    if let Err(error) = self.store.set_private(&self.conversation, true) {
                        tracing::warn!(%error, "failed to mark conversation private");
                    }
                },
                ChannelAction::StateChanged { from, to } => {
                    updates.push(SessionUpdate::ChannelStateChanged { from, to });
                },
                ChannelAction::PeerKeyRejected { reason } => {
                    updates.push(SessionUpdate::PeerKeyRejected { reason });
                },
                ChannelAction::PeerKeyTimedOut { waited } => {
                    updates.push(SessionUpdate::PeerKeyTimedOut { waited });
                },
                ChannelAction::ChannelUnavailable { reason } => {
                    updates.push(SessionUpdate::ChannelUnavailable { reason });
                },
                ChannelAction::CancelSubscription => self.peer_watch = None,
            }
        }

        Ok(updates)
    }

    fn subscribe_peer_key(&mut self) -> Result<(), SessionError> {
        let mut watch = self.store.observe_public_key(&self.conversation, &self.peer_user)?;
        if let Some(encoded) = watch.current() {
            self.pending.push_back(ChannelEvent::PeerKeyObserved { encoded });
        }
        self.peer_watch = Some(watch);
        Ok(())
    }

    fn publish(&mut self, encoded: String) {
        let key = PublishedPublicKey {
            conversation_id: self.conversation.clone(),
            user_id: self.local_user.clone(),
            encoded_key: encoded,
        };

        match self.store.write_public_key(&key) {
            Ok(()) => {
                tracing::info!(conversation = %self.conversation, "published public key");
                self.unpublished = None;
            },
            Err(error) if error.is_transient() => {
                tracing::warn!(%error, "public key publication failed, will retry");
                self.unpublished = Some(key.encoded_key);
            },
            Err(error) => {
                tracing::warn!(%error, "public key publication rejected");
                self.unpublished = None;
            },
        }
    }

    fn retry_publication(&mut self) {
        if let Some(encoded) = self.unpublished.take() {
            self.publish(encoded);
        }
    }
}

impl<E, K, S> Drop for Session<E, K, S>
where
    E: Environment,
    K: KeyValueStore,
    S: SyncStore,
{
    fn drop(&mut self) {
        self.close();
    }
}

async fn next_peer_key(
    watch: &mut Option<PublicKeyWatch>,
) -> Result<Option<String>, SyncStoreError> {
    match watch {
        Some(watch) => watch.changed().await,
        None => std::future::pending().await,
    }
}
