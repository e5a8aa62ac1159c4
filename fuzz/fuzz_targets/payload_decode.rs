//! Fuzz target for stored payload decryption
//!
//! Stored message text comes from the synchronized store and may be
//! anything: plaintext from before the upgrade, truncated payloads, or
//! hostile data.
//!
//! The fuzzer should NEVER panic. Invalid inputs return an error, and no
//! input opens under a key it was not sealed with.

#![no_main]

use duet_crypto::{decrypt_text, SymmetricKey};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (&str, [u8; 32])| {
    let (encoded, key_bytes) = input;
    let key = SymmetricKey::from_bytes(key_bytes);

    let _ = decrypt_text(encoded, &key);
});
