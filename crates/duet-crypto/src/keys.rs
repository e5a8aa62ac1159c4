//! Static X25519 key pairs and their Base64 storage encoding.
//!
//! Private keys are zeroized on drop. Both halves encode to standard Base64
//! (with padding), the representation used in local storage and in the
//! synchronized store.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use x25519_dalek::{PublicKey as X25519PublicKey, SharedSecret, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Size of X25519 public and private keys in bytes
pub const KEY_SIZE: usize = 32;

/// A peer-shareable X25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Wrap raw public key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Standard Base64 encoding of the key.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Decode a Base64 public key.
    ///
    /// # Errors
    ///
    /// - `InvalidBase64` if the input is not Base64
    /// - `InvalidKeyLength` if it does not decode to 32 bytes
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = decode_key(encoded)?;
        Ok(Self(bytes))
    }
}

/// An X25519 private key. Never leaves the local installation.
#[derive(Clone)]
pub struct PrivateKey(StaticSecret);

impl PrivateKey {
    /// Build a private key from 32 secret bytes.
    ///
    /// X25519 clamping is applied during agreement, so any 32 bytes are a
    /// valid key.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Public key corresponding to this private key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(X25519PublicKey::from(&self.0).to_bytes())
    }

    /// Standard Base64 encoding of the secret bytes.
    pub fn to_base64(&self) -> String {
        let mut bytes = self.0.to_bytes();
        let encoded = STANDARD.encode(bytes);
        bytes.zeroize();
        encoded
    }

    /// Decode a Base64 private key.
    ///
    /// # Errors
    ///
    /// - `InvalidBase64` if the input is not Base64
    /// - `InvalidKeyLength` if it does not decode to 32 bytes
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut bytes = decode_key(encoded)?;
        let key = Self::from_bytes(bytes);
        bytes.zeroize();
        Ok(key)
    }

    pub(crate) fn diffie_hellman(&self, peer: &PublicKey) -> SharedSecret {
        self.0.diffie_hellman(&X25519PublicKey::from(peer.0))
    }
}

/// Compared by public key; secret bytes are never compared directly.
impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for PrivateKey {}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// A conversation's local key pair.
///
/// # Invariants
///
/// - `public` is always the public key of `private`
#[derive(Debug, Clone)]
pub struct KeyPair {
    public: PublicKey,
    private: PrivateKey,
}

impl KeyPair {
    /// Generate a key pair from 32 random seed bytes.
    ///
    /// Caller MUST provide cryptographically secure random bytes in
    /// production.
    pub fn from_seed(seed: [u8; KEY_SIZE]) -> Self {
        let private = PrivateKey::from_bytes(seed);
        let public = private.public_key();
        Self { public, private }
    }

    /// Reassemble a key pair from stored halves.
    ///
    /// # Errors
    ///
    /// - `KeyPairMismatch` if `public` is not the public key of `private`
    pub fn from_parts(public: PublicKey, private: PrivateKey) -> Result<Self, CryptoError> {
        if private.public_key() != public {
            return Err(CryptoError::KeyPairMismatch);
        }
        Ok(Self { public, private })
    }

    /// Public half, safe to publish.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Private half.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }
}

fn decode_key(encoded: &str) -> Result<[u8; KEY_SIZE], CryptoError> {
    let mut decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidBase64 { reason: e.to_string() })?;

    let result = <[u8; KEY_SIZE]>::try_from(decoded.as_slice())
        .map_err(|_| CryptoError::InvalidKeyLength { expected: KEY_SIZE, actual: decoded.len() });
    decoded.zeroize();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(byte: u8) -> [u8; KEY_SIZE] {
        let mut seed = [0u8; KEY_SIZE];
        for (i, b) in seed.iter_mut().enumerate() {
            *b = byte.wrapping_add(i as u8);
        }
        seed
    }

    #[test]
    fn same_seed_same_pair() {
        let a = KeyPair::from_seed(seed(1));
        let b = KeyPair::from_seed(seed(1));
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn different_seeds_different_public_keys() {
        let a = KeyPair::from_seed(seed(1));
        let b = KeyPair::from_seed(seed(2));
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn public_key_base64_roundtrip() {
        let pair = KeyPair::from_seed(seed(7));
        let encoded = pair.public_key().to_base64();
        assert_eq!(encoded.len(), 44);
        assert_eq!(PublicKey::from_base64(&encoded).unwrap(), *pair.public_key());
    }

    #[test]
    fn private_key_base64_roundtrip_preserves_public_key() {
        let pair = KeyPair::from_seed(seed(9));
        let restored = PrivateKey::from_base64(&pair.private_key().to_base64()).unwrap();
        assert_eq!(restored.public_key(), *pair.public_key());
    }

    #[test]
    fn from_parts_accepts_matching_halves() {
        let pair = KeyPair::from_seed(seed(3));
        let rebuilt = KeyPair::from_parts(*pair.public_key(), pair.private_key().clone()).unwrap();
        assert_eq!(rebuilt.public_key(), pair.public_key());
    }

    #[test]
    fn from_parts_rejects_mismatched_halves() {
        let a = KeyPair::from_seed(seed(3));
        let b = KeyPair::from_seed(seed(4));
        let result = KeyPair::from_parts(*a.public_key(), b.private_key().clone());
        assert_eq!(result.unwrap_err(), CryptoError::KeyPairMismatch);
    }

    #[test]
    fn rejects_non_base64() {
        let result = PublicKey::from_base64("not base64 at all!");
        assert!(matches!(result, Err(CryptoError::InvalidBase64 { .. })));
    }

    #[test]
    fn rejects_wrong_length() {
        let short = STANDARD.encode([0u8; 16]);
        let result = PublicKey::from_base64(&short);
        assert_eq!(result.unwrap_err(), CryptoError::InvalidKeyLength { expected: 32, actual: 16 });
    }

    #[test]
    fn debug_does_not_leak_private_key() {
        let pair = KeyPair::from_seed(seed(5));
        let rendered = format!("{:?}", pair.private_key());
        assert!(!rendered.contains(&pair.private_key().to_base64()));
        assert!(rendered.contains("redacted"));
    }
}
