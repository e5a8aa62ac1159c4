//! Decrypt entry point for push notifications.
//!
//! Runs outside any open conversation: it reloads the local key pair and the
//! peer's published key on every call and never generates keys.

use duet_core::{ConversationId, UserId, storage::KeyValueStore, sync::SyncStore};
use duet_crypto::{PublicKey, decrypt_text, derive_secret};

use crate::keystore::KeyStore;

/// Preview shown when a notification cannot be decrypted.
pub const ENCRYPTED_PLACEHOLDER: &str = "New encrypted message";

/// Standalone decryptor for notification payloads.
#[derive(Clone)]
pub struct NotificationDecryptor<K: KeyValueStore, S: SyncStore> {
    keys: KeyStore<K>,
    store: S,
}

impl<K: KeyValueStore, S: SyncStore> NotificationDecryptor<K, S> {
    /// Decryptor over the local key store and the synchronized store.
    pub fn new(keys: KeyStore<K>, store: S) -> Self {
        Self { keys, store }
    }

    /// Decrypt a notification payload. `None` if any key material is
    /// missing or unusable, or the payload does not open.
    pub fn decrypt(
        &self,
        ciphertext: &str,
        conversation: &ConversationId,
        peer: &UserId,
    ) -> Option<String> {
        let local = match self.keys.load_key_pair(conversation) {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                tracing::debug!(%conversation, "no local key pair for notification");
                return None;
            },
            Err(error) => {
                tracing::warn!(%conversation, %error, "local key pair unusable for notification");
                return None;
            },
        };

        let encoded = match self.store.read_public_key(conversation, peer) {
            Ok(Some(encoded)) => encoded,
            Ok(None) => {
                tracing::debug!(%conversation, %peer, "peer key not published");
                return None;
            },
            Err(error) => {
                tracing::debug!(%conversation, %error, "peer key unavailable");
                return None;
            },
        };

        let secret = PublicKey::from_base64(&encoded)
            .and_then(|peer_key| derive_secret(local.private_key(), &peer_key))
            .map_err(|error| tracing::debug!(%conversation, %error, "peer key unusable"))
            .ok()?;

        decrypt_text(ciphertext, &secret)
            .map_err(|error| tracing::debug!(%conversation, %error, "notification not decryptable"))
            .ok()
    }

    /// Text to show for a notification: the plaintext, or
    /// [`ENCRYPTED_PLACEHOLDER`] if it cannot be decrypted.
    pub fn preview(&self, ciphertext: &str, conversation: &ConversationId, peer: &UserId) -> String {
        self.decrypt(ciphertext, conversation, peer)
            .unwrap_or_else(|| ENCRYPTED_PLACEHOLDER.to_string())
    }
}
