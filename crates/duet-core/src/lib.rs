//! Core types for Duet
//!
//! Shared vocabulary for every Duet crate: participant and conversation
//! identifiers, the [`env::Environment`] abstraction over time and entropy,
//! the installation-local key-value store, and the interface of the external
//! synchronized store that carries public keys and messages between the two
//! parties.
//!
//! # Components
//!
//! - [`ConversationId`], [`UserId`], [`MessageId`]: identifiers
//! - [`env::Environment`]: time and randomness for deterministic testing
//! - [`storage::KeyValueStore`]: local persistent storage (memory or redb)
//! - [`sync::SyncStore`]: synchronized store shared by both parties

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
mod ids;
pub mod storage;
pub mod sync;

pub use ids::{ConversationId, MessageId, UserId};
