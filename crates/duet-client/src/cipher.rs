//! Payload cipher facade.
//!
//! Wraps the pure crypto functions with environment-supplied nonces and
//! converts every failure to `None`. A `None` from [`PayloadCipher::encrypt`]
//! means "do not send"; a `None` from [`PayloadCipher::decrypt`] is an
//! expected condition for stale or foreign payloads.

use duet_core::env::Environment;
use duet_crypto::{EncryptedPayload, NONCE_SIZE, SymmetricKey, decrypt_text, encrypt_text};

/// Encrypts with fresh random nonces drawn from the environment.
#[derive(Clone)]
pub struct PayloadCipher<E: Environment> {
    env: E,
}

impl<E: Environment> PayloadCipher<E> {
    /// Cipher drawing nonces from `env`.
    pub fn new(env: E) -> Self {
        Self { env }
    }

    /// Encrypt `plaintext` under `key` with a fresh nonce.
    pub fn encrypt(&self, plaintext: &str, key: &SymmetricKey) -> Option<EncryptedPayload> {
        let nonce = self.env.random_array::<NONCE_SIZE>();
        match encrypt_text(plaintext, key, nonce) {
            Ok(payload) => Some(payload),
            Err(error) => {
                tracing::warn!(%error, "payload encryption failed");
                None
            },
        }
    }

    /// Decrypt an encoded payload. `None` on wrong key, tampering, or input
    /// that is not a payload at all.
    pub fn decrypt(&self, encoded: &str, key: &SymmetricKey) -> Option<String> {
        match decrypt_text(encoded, key) {
            Ok(plaintext) => Some(plaintext),
            Err(error) => {
                tracing::debug!(%error, malformed = error.is_malformed_input(), "payload not decryptable");
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use duet_core::env::test_utils::MockEnv;

    use super::*;

    #[test]
    fn roundtrip_through_facade() {
        let cipher = PayloadCipher::new(MockEnv::new());
        let key = SymmetricKey::from_bytes([3; 32]);

        let payload = cipher.encrypt("Hello", &key).unwrap();
        assert_eq!(cipher.decrypt(payload.as_str(), &key).as_deref(), Some("Hello"));
    }

    #[test]
    fn repeated_encryptions_use_fresh_nonces() {
        let cipher = PayloadCipher::new(MockEnv::new());
        let key = SymmetricKey::from_bytes([3; 32]);

        let a = cipher.encrypt("same", &key).unwrap();
        let b = cipher.encrypt("same", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn failures_become_none() {
        let cipher = PayloadCipher::new(MockEnv::new());
        let key = SymmetricKey::from_bytes([3; 32]);
        let other = SymmetricKey::from_bytes([4; 32]);

        let payload = cipher.encrypt("secret", &key).unwrap();
        assert_eq!(cipher.decrypt(payload.as_str(), &other), None);
        assert_eq!(cipher.decrypt("plain text", &key), None);
        assert_eq!(cipher.decrypt("", &key), None);
    }
}
