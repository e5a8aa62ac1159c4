//! Shared-secret derivation: X25519 agreement normalized with SHA-256.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    error::CryptoError,
    keys::{KEY_SIZE, PrivateKey, PublicKey},
};

/// A 32-byte AES-256-GCM key shared by both parties of a conversation.
///
/// Held in memory only and zeroized on drop. Recomputing it from the two key
/// halves is cheap, so it is never persisted.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Derive the conversation key from the local private key and the peer's
/// public key.
///
/// The raw X25519 output is hashed once with SHA-256 to produce the cipher
/// key. No salt or context string is mixed in.
///
/// # Security
///
/// - Symmetric: `derive_secret(a, B) == derive_secret(b, A)`
/// - Deterministic: same inputs always produce the same key
///
/// # Errors
///
/// - `NonContributory` if the peer key is a low-order point
pub fn derive_secret(local: &PrivateKey, peer: &PublicKey) -> Result<SymmetricKey, CryptoError> {
    let shared = local.diffie_hellman(peer);
    if !shared.was_contributory() {
        return Err(CryptoError::NonContributory);
    }

    let digest = Sha256::digest(shared.as_bytes());

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest);
    Ok(SymmetricKey(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;

    #[test]
    fn derivation_is_symmetric() {
        let alice = KeyPair::from_seed([0x11; KEY_SIZE]);
        let bob = KeyPair::from_seed([0x22; KEY_SIZE]);

        let from_alice = derive_secret(alice.private_key(), bob.public_key()).unwrap();
        let from_bob = derive_secret(bob.private_key(), alice.public_key()).unwrap();

        assert_eq!(from_alice, from_bob);
    }

    #[test]
    fn derivation_is_deterministic() {
        let alice = KeyPair::from_seed([0x11; KEY_SIZE]);
        let bob = KeyPair::from_seed([0x22; KEY_SIZE]);

        let first = derive_secret(alice.private_key(), bob.public_key()).unwrap();
        let second = derive_secret(alice.private_key(), bob.public_key()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn different_peers_produce_different_keys() {
        let alice = KeyPair::from_seed([0x11; KEY_SIZE]);
        let bob = KeyPair::from_seed([0x22; KEY_SIZE]);
        let carol = KeyPair::from_seed([0x33; KEY_SIZE]);

        let with_bob = derive_secret(alice.private_key(), bob.public_key()).unwrap();
        let with_carol = derive_secret(alice.private_key(), carol.public_key()).unwrap();

        assert_ne!(with_bob, with_carol);
    }

    #[test]
    fn key_is_hash_of_raw_agreement() {
        let alice = KeyPair::from_seed([0x11; KEY_SIZE]);
        let bob = KeyPair::from_seed([0x22; KEY_SIZE]);

        let raw = alice.private_key().diffie_hellman(bob.public_key());
        let expected: [u8; KEY_SIZE] = Sha256::digest(raw.as_bytes()).into();

        let derived = derive_secret(alice.private_key(), bob.public_key()).unwrap();
        assert_eq!(derived.as_bytes(), &expected);
    }

    #[test]
    fn all_zero_peer_key_is_rejected() {
        let alice = KeyPair::from_seed([0x11; KEY_SIZE]);
        let zero = PublicKey::from_bytes([0u8; KEY_SIZE]);

        let result = derive_secret(alice.private_key(), &zero);
        assert_eq!(result.unwrap_err(), CryptoError::NonContributory);
    }
}
