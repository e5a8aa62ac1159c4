//! Application runtime for Duet
//!
//! Drives one conversation per [`Session`] on a tokio event loop. The loop
//! reacts to store subscriptions (peer public key, conversation record,
//! message list) and to timer ticks, and feeds the results into the sans-IO
//! channel state machine. Key generation, secret derivation, and every AEAD
//! call run on blocking workers; their results are applied on the loop
//! before any session state changes.
//!
//! # Components
//!
//! - [`Session`]: event loop, send/edit/delete, batch refresh
//! - [`SessionConfig`]: tick interval, decrypt chunk size, channel policy
//! - [`SessionUpdate`]: what the UI should react to after a cycle
//! - [`CancelToken`]: per-session cancellation shared with the UI
//! - [`SystemEnv`]: production environment (OS RNG, system clock)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cancel;
mod config;
mod error;
mod session;
mod system_env;
mod update;
mod worker;

pub use cancel::CancelToken;
pub use config::{DEFAULT_DECRYPT_CHUNK_SIZE, DEFAULT_TICK_INTERVAL, SessionConfig};
pub use error::SessionError;
pub use session::Session;
pub use system_env::SystemEnv;
pub use update::SessionUpdate;
