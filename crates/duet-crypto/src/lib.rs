//! Duet Cryptographic Primitives
//!
//! Cryptographic building blocks for two-party Duet channels. Pure functions
//! with no shared mutable state. Callers provide random bytes (key seeds,
//! nonces) so every operation is deterministic under test.
//!
//! # Key Lifecycle
//!
//! Each party holds one static X25519 key pair per conversation. Once both
//! public halves are known, each side derives the same symmetric key and uses
//! it for every message of the conversation.
//!
//! ```text
//! Local PrivateKey ─┐
//!                   ├─ X25519 ─▶ raw shared secret ─▶ SHA-256 ─▶ SymmetricKey
//! Peer PublicKey ───┘
//!
//! SymmetricKey + random nonce ─▶ AES-256-GCM ─▶ base64(nonce ‖ ciphertext ‖ tag)
//! ```
//!
//! # Security
//!
//! Confidentiality and authenticity:
//! - AES-256-GCM with a 128-bit tag; any modified byte fails authentication
//! - Nonces are 12 random bytes supplied per encryption call
//!
//! Agreement:
//! - Derivation is symmetric: `derive(a.private, b.public) == derive(b.private,
//!   a.public)`
//! - Low-order peer keys (all-zero shared secret) are rejected
//!
//! Limitations:
//! - The secret is normalized with a single SHA-256 pass, not a full KDF
//! - Keys are static for the lifetime of a conversation; there is no forward
//!   secrecy

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cipher;
mod derivation;
mod error;
mod keys;

pub use cipher::{EncryptedPayload, NONCE_SIZE, TAG_SIZE, decrypt_text, encrypt_text};
pub use derivation::{SymmetricKey, derive_secret};
pub use error::CryptoError;
pub use keys::{KEY_SIZE, KeyPair, PrivateKey, PublicKey};
