//! Text encryption using AES-256-GCM
//!
//! All functions are pure - the nonce must be provided by the caller.
//!
//! Wire format (standard Base64 with padding):
//!
//! ```text
//! base64( nonce (12 bytes) | ciphertext | tag (16 bytes) )
//! ```

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::{derivation::SymmetricKey, error::CryptoError};

/// Size of the AES-GCM nonce (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Base64 text of `nonce ‖ ciphertext ‖ tag`, as stored in the synchronized
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncryptedPayload(String);

impl EncryptedPayload {
    /// Borrow the encoded payload.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take ownership of the encoded payload.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EncryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<EncryptedPayload> for String {
    fn from(payload: EncryptedPayload) -> Self {
        payload.0
    }
}

/// Encrypt UTF-8 text under `key`.
///
/// # Security
///
/// - Caller MUST provide a fresh random nonce for every call under the same
///   key; reuse breaks GCM confidentiality and authenticity
///
/// # Errors
///
/// - `EncryptionFailed` if the AEAD rejects the input (plaintext exceeds the
///   GCM length limit)
pub fn encrypt_text(
    plaintext: &str,
    key: &SymmetricKey,
    nonce: [u8; NONCE_SIZE],
) -> Result<EncryptedPayload, CryptoError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut wire = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    wire.extend_from_slice(&nonce);
    wire.extend_from_slice(&ciphertext);

    Ok(EncryptedPayload(STANDARD.encode(wire)))
}

/// Decrypt an encoded payload back to UTF-8 text.
///
/// # Errors
///
/// - `InvalidBase64` if `encoded` is not Base64 (e.g. a plaintext message)
/// - `PayloadTooShort` if it cannot hold a nonce and a tag
/// - `DecryptionFailed` on wrong key or tampered bytes
/// - `InvalidUtf8` if the authenticated plaintext is not UTF-8
pub fn decrypt_text(encoded: &str, key: &SymmetricKey) -> Result<String, CryptoError> {
    let wire = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidBase64 { reason: e.to_string() })?;

    if wire.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::PayloadTooShort { len: wire.len() });
    }

    let (nonce, ciphertext) = wire.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_SIZE;

    fn test_key(byte: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = test_key(1);
        let encrypted = encrypt_text("Hello, World!", &key, [0xAB; NONCE_SIZE]).unwrap();
        assert_eq!(decrypt_text(encrypted.as_str(), &key).unwrap(), "Hello, World!");
    }

    #[test]
    fn encrypt_decrypt_empty_text() {
        let key = test_key(1);
        let encrypted = encrypt_text("", &key, [0; NONCE_SIZE]).unwrap();
        assert_eq!(decrypt_text(encrypted.as_str(), &key).unwrap(), "");
    }

    #[test]
    fn encrypt_decrypt_multibyte_text() {
        let key = test_key(1);
        let text = "naïve café ☕ 日本語";
        let encrypted = encrypt_text(text, &key, [7; NONCE_SIZE]).unwrap();
        assert_eq!(decrypt_text(encrypted.as_str(), &key).unwrap(), text);
    }

    #[test]
    fn wire_layout_is_nonce_ciphertext_tag() {
        let key = test_key(1);
        let nonce = [0x5A; NONCE_SIZE];
        let encrypted = encrypt_text("test", &key, nonce).unwrap();

        let wire = STANDARD.decode(encrypted.as_str()).unwrap();
        assert_eq!(wire.len(), NONCE_SIZE + 4 + TAG_SIZE);
        assert_eq!(&wire[..NONCE_SIZE], &nonce);
    }

    #[test]
    fn different_nonces_produce_different_payloads() {
        let key = test_key(1);
        let a = encrypt_text("same", &key, [0x00; NONCE_SIZE]).unwrap();
        let b = encrypt_text("same", &key, [0xFF; NONCE_SIZE]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let encrypted = encrypt_text("secret", &test_key(1), [0; NONCE_SIZE]).unwrap();
        let result = decrypt_text(encrypted.as_str(), &test_key(2));
        assert_eq!(result.unwrap_err(), CryptoError::DecryptionFailed);
    }

    #[test]
    fn tampered_payload_fails_decryption() {
        let key = test_key(1);
        let encrypted = encrypt_text("original message", &key, [0; NONCE_SIZE]).unwrap();

        let mut wire = STANDARD.decode(encrypted.as_str()).unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0x01;
        let tampered = STANDARD.encode(wire);

        assert_eq!(decrypt_text(&tampered, &key).unwrap_err(), CryptoError::DecryptionFailed);
    }

    #[test]
    fn plaintext_input_is_rejected_not_panicking() {
        let result = decrypt_text("hello there, not encrypted", &test_key(1));
        assert!(matches!(result, Err(CryptoError::InvalidBase64 { .. })));
    }

    #[test]
    fn short_payload_is_rejected() {
        let short = STANDARD.encode([0u8; NONCE_SIZE + TAG_SIZE - 1]);
        let result = decrypt_text(&short, &test_key(1));
        assert_eq!(result.unwrap_err(), CryptoError::PayloadTooShort { len: 27 });
    }
}
