//! Blocking crypto jobs.
//!
//! Each job is a plain closure run through `spawn_blocking`; it touches no
//! session state. The session applies the returned outcome on the loop.

use duet_client::{
    ChannelEvent, DisplayMessage, KeyStore, KeyStoreError, MessagePipeline, PrivacyContext,
};
use duet_core::{ConversationId, env::Environment, storage::KeyValueStore, sync::StoredMessage};
use duet_crypto::{CryptoError, KeyPair, PrivateKey, PublicKey, SymmetricKey, derive_secret};
use tokio::task::JoinSet;

use crate::error::SessionError;

/// Result of a channel worker job.
pub(crate) enum WorkerOutcome {
    LocalKeys(Result<KeyPair, KeyStoreError>),
    Secret { peer: PublicKey, result: Result<SymmetricKey, CryptoError> },
}

impl WorkerOutcome {
    pub(crate) fn into_event<I>(self) -> ChannelEvent<I> {
        match self {
            Self::LocalKeys(Ok(pair)) => ChannelEvent::LocalKeyReady(pair),
            Self::LocalKeys(Err(error)) => ChannelEvent::LocalKeyFailed { reason: error.to_string() },
            Self::Secret { peer, result: Ok(secret) } => {
                ChannelEvent::SecretDerived { peer_key: peer, secret }
            },
            Self::Secret { peer, result: Err(error) } => {
                ChannelEvent::SecretRejected { peer_key: peer, reason: error.to_string() }
            },
        }
    }
}

pub(crate) fn load_local_keys<E, K>(
    keys: KeyStore<K>,
    conversation: ConversationId,
    env: E,
) -> impl FnOnce() -> WorkerOutcome + Send + 'static
where
    E: Environment,
    K: KeyValueStore,
{
    move || WorkerOutcome::LocalKeys(keys.get_or_create_key_pair(&conversation, &env))
}

pub(crate) fn derive_shared_secret(
    local: PrivateKey,
    peer: PublicKey,
) -> impl FnOnce() -> WorkerOutcome + Send + 'static {
    move || WorkerOutcome::Secret { peer, result: derive_secret(&local, &peer) }
}

/// Decrypt `messages` in chunks on blocking workers and reassemble them in
/// input order, whatever order the chunks finish in.
pub(crate) async fn decrypt_in_chunks<E: Environment>(
    pipeline: &MessagePipeline<E>,
    context: &PrivacyContext,
    messages: &[StoredMessage],
    chunk_size: usize,
) -> Result<Vec<DisplayMessage>, SessionError> {
    let mut tasks = JoinSet::new();
    for (index, chunk) in messages.chunks(chunk_size.max(1)).enumerate() {
        let pipeline = pipeline.clone();
        let context = context.clone();
        let chunk = chunk.to_vec();
        tasks.spawn_blocking(move || (index, pipeline.decrypt_batch(&context, &chunk)));
    }

    let mut chunks: Vec<Option<Vec<DisplayMessage>>> = vec![None; tasks.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, decrypted) =
            joined.map_err(|e| SessionError::Worker { reason: e.to_string() })?;
        if let Some(slot) = chunks.get_mut(index) {
            *slot = Some(decrypted);
        }
    }

    Ok(chunks.into_iter().flatten().flatten().collect())
}
