//! Identity key store.
//!
//! One static X25519 key pair per conversation, generated on first use and
//! persisted in the installation-local key-value store as two Base64 entries.
//! Generate-or-load runs under a per-conversation lock so concurrent callers
//! never produce two different pairs for the same conversation.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use duet_core::{ConversationId, env::Environment, storage::KeyValueStore};
use duet_crypto::{KeyPair, PrivateKey, PublicKey};
use zeroize::Zeroizing;

use crate::error::KeyStoreError;

/// Local storage key of a conversation's private key.
pub fn private_key_entry(conversation: &ConversationId) -> String {
    format!("private_key_{conversation}")
}

/// Local storage key of a conversation's public key.
pub fn public_key_entry(conversation: &ConversationId) -> String {
    format!("public_key_{conversation}")
}

/// Generate-or-load access to per-conversation key pairs.
///
/// Clones share the storage handle and the lock table.
///
/// # Invariants
///
/// - A conversation never acquires two distinct key pairs through this store
/// - Corrupt stored material is reported, never overwritten
#[derive(Clone)]
pub struct KeyStore<K: KeyValueStore> {
    storage: K,
    locks: Arc<Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>>,
}

impl<K: KeyValueStore> KeyStore<K> {
    /// Key store over the given local storage.
    pub fn new(storage: K) -> Self {
        Self { storage, locks: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Stored key pair for a conversation. `None` if never generated.
    ///
    /// # Errors
    ///
    /// - `KeyMaterialCorrupt` if only one half is stored, either half fails
    ///   to decode, or the halves do not belong together
    /// - `Storage` if local storage fails
    pub fn load_key_pair(
        &self,
        conversation: &ConversationId,
    ) -> Result<Option<KeyPair>, KeyStoreError> {
        let private = self.storage.get(&private_key_entry(conversation))?.map(Zeroizing::new);
        let public = self.storage.get(&public_key_entry(conversation))?;

        let (private, public) = match (private, public) {
            (None, None) => return Ok(None),
            (Some(private), Some(public)) => (private, public),
            (None, Some(_)) => return Err(corrupt(conversation, "private key missing")),
            (Some(_), None) => return Err(corrupt(conversation, "public key missing")),
        };

        let private =
            PrivateKey::from_base64(&private).map_err(|e| corrupt(conversation, e.to_string()))?;
        let public =
            PublicKey::from_base64(&public).map_err(|e| corrupt(conversation, e.to_string()))?;

        KeyPair::from_parts(public, private)
            .map(Some)
            .map_err(|e| corrupt(conversation, e.to_string()))
    }

    /// Key pair for a conversation, generating and persisting one on first
    /// use.
    ///
    /// Seed bytes come from `env`. Both halves are written in one atomic
    /// put before the pair is returned.
    ///
    /// # Errors
    ///
    /// - `KeyMaterialCorrupt` if stored material exists but is unusable
    /// - `Storage` if local storage fails
    /// - `LockPoisoned` if a previous caller panicked mid-generation
    pub fn get_or_create_key_pair<E: Environment>(
        &self,
        conversation: &ConversationId,
        env: &E,
    ) -> Result<KeyPair, KeyStoreError> {
        let lock = self.conversation_lock(conversation)?;
        let result = lock
            .lock()
            .map_err(|_| KeyStoreError::LockPoisoned)
            .and_then(|_guard| self.load_or_generate(conversation, env));

        self.release_lock(conversation, lock);
        result
    }

    fn load_or_generate<E: Environment>(
        &self,
        conversation: &ConversationId,
        env: &E,
    ) -> Result<KeyPair, KeyStoreError> {
        if let Some(pair) = self.load_key_pair(conversation)? {
            tracing::debug!(%conversation, "loaded conversation key pair");
            return Ok(pair);
        }

        let pair = KeyPair::from_seed(env.random_array());
        let private = Zeroizing::new(pair.private_key().to_base64());
        let public = pair.public_key().to_base64();

        let private_entry = private_key_entry(conversation);
        let public_entry = public_key_entry(conversation);
        self.storage.put_all(&[
            (private_entry.as_str(), private.as_str()),
            (public_entry.as_str(), public.as_str()),
        ])?;

        tracing::info!(%conversation, "generated conversation key pair");
        Ok(pair)
    }

    fn conversation_lock(
        &self,
        conversation: &ConversationId,
    ) -> Result<Arc<Mutex<()>>, KeyStoreError> {
        let mut locks = self.locks.lock().map_err(|_| KeyStoreError::LockPoisoned)?;
        Ok(Arc::clone(locks.entry(conversation.clone()).or_default()))
    }

    /// Drop the caller's handle and remove the table entry once no other
    /// caller holds it. Handles are only cloned under the table lock, so a
    /// count of one there means the entry is idle.
    fn release_lock(&self, conversation: &ConversationId, lock: Arc<Mutex<()>>) {
        drop(lock);

        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if locks.get(conversation).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(conversation);
        }
    }
}

fn corrupt(conversation: &ConversationId, reason: impl Into<String>) -> KeyStoreError {
    KeyStoreError::KeyMaterialCorrupt { conversation: conversation.clone(), reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use duet_core::{env::test_utils::MockEnv, storage::MemoryKeyValueStore};

    use super::*;

    fn conversation() -> ConversationId {
        ConversationId::for_participants(&"alice".into(), &"bob".into())
    }

    #[test]
    fn entry_names_follow_storage_layout() {
        assert_eq!(private_key_entry(&conversation()), "private_key_alice_bob");
        assert_eq!(public_key_entry(&conversation()), "public_key_alice_bob");
    }

    #[test]
    fn generates_once_then_loads() {
        let env = MockEnv::with_seed(1);
        let keys = KeyStore::new(MemoryKeyValueStore::new());

        let first = keys.get_or_create_key_pair(&conversation(), &env).unwrap();
        let second = keys.get_or_create_key_pair(&conversation(), &env).unwrap();

        assert_eq!(first.public_key(), second.public_key());
    }

    #[test]
    fn persists_both_halves() {
        let storage = MemoryKeyValueStore::new();
        let keys = KeyStore::new(storage.clone());
        let pair = keys.get_or_create_key_pair(&conversation(), &MockEnv::new()).unwrap();

        assert_eq!(storage.len(), 2);
        assert_eq!(
            storage.get(&public_key_entry(&conversation())).unwrap(),
            Some(pair.public_key().to_base64())
        );
    }

    #[test]
    fn load_missing_returns_none() {
        let keys = KeyStore::new(MemoryKeyValueStore::new());
        assert!(keys.load_key_pair(&conversation()).unwrap().is_none());
    }

    #[test]
    fn separate_conversations_get_separate_pairs() {
        let env = MockEnv::with_seed(4);
        let keys = KeyStore::new(MemoryKeyValueStore::new());
        let other = ConversationId::for_participants(&"alice".into(), &"carol".into());

        let a = keys.get_or_create_key_pair(&conversation(), &env).unwrap();
        let b = keys.get_or_create_key_pair(&other, &env).unwrap();

        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn corrupt_private_key_is_not_regenerated() {
        let storage = MemoryKeyValueStore::new();
        let keys = KeyStore::new(storage.clone());
        keys.get_or_create_key_pair(&conversation(), &MockEnv::new()).unwrap();
        storage.put(&private_key_entry(&conversation()), "%%% not base64").unwrap();

        let result = keys.get_or_create_key_pair(&conversation(), &MockEnv::new());

        assert!(matches!(result, Err(KeyStoreError::KeyMaterialCorrupt { .. })));
        assert_eq!(
            storage.get(&private_key_entry(&conversation())).unwrap().as_deref(),
            Some("%%% not base64")
        );
    }

    #[test]
    fn half_missing_is_corrupt() {
        let storage = MemoryKeyValueStore::new();
        let keys = KeyStore::new(storage.clone());
        keys.get_or_create_key_pair(&conversation(), &MockEnv::new()).unwrap();
        storage.remove(&public_key_entry(&conversation())).unwrap();

        let err = keys.load_key_pair(&conversation()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn mismatched_halves_are_corrupt() {
        let storage = MemoryKeyValueStore::new();
        let keys = KeyStore::new(storage.clone());
        keys.get_or_create_key_pair(&conversation(), &MockEnv::with_seed(1)).unwrap();

        let stranger = KeyPair::from_seed([9; 32]);
        storage.put(&public_key_entry(&conversation()), &stranger.public_key().to_base64()).unwrap();

        let result = keys.load_key_pair(&conversation());
        assert!(matches!(result, Err(KeyStoreError::KeyMaterialCorrupt { .. })));
    }

    #[test]
    fn concurrent_callers_share_one_pair() {
        let env = MockEnv::with_seed(11);
        let keys = KeyStore::new(MemoryKeyValueStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let keys = keys.clone();
                let env = env.clone();
                thread::spawn(move || {
                    *keys.get_or_create_key_pair(&conversation(), &env).unwrap().public_key()
                })
            })
            .collect();

        let public_keys: Vec<PublicKey> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(public_keys.windows(2).all(|w| w[0] == w[1]));
        assert!(keys.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn lock_table_does_not_grow_with_conversations() {
        let env = MockEnv::with_seed(12);
        let keys = KeyStore::new(MemoryKeyValueStore::new());

        for peer in ["bob", "carol", "dave"] {
            let conversation = ConversationId::for_participants(&"alice".into(), &peer.into());
            keys.get_or_create_key_pair(&conversation, &env).unwrap();
        }

        assert!(keys.locks.lock().unwrap().is_empty());
    }
}
