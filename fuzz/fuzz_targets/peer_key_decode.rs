//! Fuzz target for peer public key decoding and derivation
//!
//! The peer key path of the synchronized store is attacker controlled.
//!
//! # Invariants
//!
//! - Decoding never panics
//! - A decoded key either derives a secret or is rejected as
//!   non-contributory; both sides of a successful derivation agree

#![no_main]

use duet_crypto::{derive_secret, CryptoError, KeyPair, PublicKey};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (&str, [u8; 32])| {
    let (encoded, seed) = input;
    let Ok(peer) = PublicKey::from_base64(encoded) else {
        return;
    };

    let local = KeyPair::from_seed(seed);
    match derive_secret(local.private_key(), &peer) {
        Ok(secret) => {
            // Re-encoding must round-trip to the same key.
            let reparsed = PublicKey::from_base64(&peer.to_base64()).unwrap();
            assert_eq!(derive_secret(local.private_key(), &reparsed).unwrap(), secret);
        }
        Err(CryptoError::NonContributory) => {}
        Err(other) => panic!("unexpected derivation error: {other:?}"),
    }
});
