//! Property-based tests for channel cryptography
//!
//! These tests verify the invariants the whole protocol depends on:
//!
//! 1. **Symmetry**: derive(a, B) == derive(b, A) for every pair of key pairs
//! 2. **Round-trip**: decrypt(encrypt(p, k), k) == p for all texts
//! 3. **Nonce freshness**: distinct nonces give distinct payloads
//! 4. **Tamper detection**: flipping any byte fails decryption
//! 5. **Wrong-key rejection**: a payload never opens under another key

use base64::{Engine as _, engine::general_purpose::STANDARD};
use duet_crypto::{
    CryptoError, KEY_SIZE, KeyPair, NONCE_SIZE, SymmetricKey, decrypt_text, derive_secret,
    encrypt_text,
};
use proptest::prelude::*;

fn key_seed() -> impl Strategy<Value = [u8; KEY_SIZE]> {
    any::<[u8; KEY_SIZE]>()
}

fn nonce() -> impl Strategy<Value = [u8; NONCE_SIZE]> {
    any::<[u8; NONCE_SIZE]>()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_derivation_is_symmetric(seed_a in key_seed(), seed_b in key_seed()) {
        let a = KeyPair::from_seed(seed_a);
        let b = KeyPair::from_seed(seed_b);

        let from_a = derive_secret(a.private_key(), b.public_key());
        let from_b = derive_secret(b.private_key(), a.public_key());

        prop_assert_eq!(from_a, from_b);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_encrypt_decrypt_roundtrip(
        text in ".{0,512}",
        key_bytes in key_seed(),
        nonce in nonce(),
    ) {
        let key = SymmetricKey::from_bytes(key_bytes);
        let encrypted = encrypt_text(&text, &key, nonce).unwrap();
        let decrypted = decrypt_text(encrypted.as_str(), &key).unwrap();

        prop_assert_eq!(decrypted, text);
    }

    #[test]
    fn prop_fresh_nonces_give_distinct_payloads(
        text in ".{0,128}",
        key_bytes in key_seed(),
        nonce_a in nonce(),
        nonce_b in nonce(),
    ) {
        prop_assume!(nonce_a != nonce_b);
        let key = SymmetricKey::from_bytes(key_bytes);

        let first = encrypt_text(&text, &key, nonce_a).unwrap();
        let second = encrypt_text(&text, &key, nonce_b).unwrap();

        prop_assert_ne!(&first, &second);
        prop_assert_eq!(decrypt_text(first.as_str(), &key).unwrap(), text.clone());
        prop_assert_eq!(decrypt_text(second.as_str(), &key).unwrap(), text);
    }

    #[test]
    fn prop_any_flipped_byte_is_detected(
        text in ".{1,128}",
        key_bytes in key_seed(),
        nonce in nonce(),
        position in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let key = SymmetricKey::from_bytes(key_bytes);
        let encrypted = encrypt_text(&text, &key, nonce).unwrap();

        let mut wire = STANDARD.decode(encrypted.as_str()).unwrap();
        let index = position.index(wire.len());
        wire[index] ^= flip;
        let tampered = STANDARD.encode(wire);

        prop_assert_eq!(decrypt_text(&tampered, &key), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn prop_wrong_key_is_rejected(
        text in ".{0,128}",
        key_a in key_seed(),
        key_b in key_seed(),
        nonce in nonce(),
    ) {
        prop_assume!(key_a != key_b);
        let encrypted = encrypt_text(&text, &SymmetricKey::from_bytes(key_a), nonce).unwrap();

        let result = decrypt_text(encrypted.as_str(), &SymmetricKey::from_bytes(key_b));
        prop_assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn prop_arbitrary_input_never_panics(input in ".{0,256}", key_bytes in key_seed()) {
        let _ = decrypt_text(&input, &SymmetricKey::from_bytes(key_bytes));
    }
}
