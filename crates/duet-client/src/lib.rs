//! Client
//!
//! Sans-IO logic for one end-to-end encrypted two-party conversation: the
//! identity key store, the key-exchange state machine, and the message
//! pipeline that seals outgoing text and opens stored history.
//!
//! # Architecture
//!
//! Nothing in this crate performs I/O on the synchronized store or sleeps.
//! The [`ChannelStateMachine`] receives [`ChannelEvent`]s and returns
//! [`ChannelAction`]s for the runtime to execute (publish a key, derive a
//! secret on a worker, flip the conversation to private). The
//! [`MessagePipeline`] is a pure transformation between stored records and
//! display records given a [`PrivacyContext`] snapshot.
//!
//! # Components
//!
//! - [`KeyStore`]: generate-or-load of the per-conversation key pair
//! - [`PayloadCipher`]: encrypt/decrypt returning `None` instead of errors
//! - [`ChannelStateMachine`]: Unestablished → AwaitingPeerKey → Established
//! - [`MessagePipeline`]: send, batch decrypt, edit, soft delete
//! - [`NotificationDecryptor`]: standalone decrypt for push notifications

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod channel;
mod cipher;
mod error;
mod keystore;
mod notification;
mod pipeline;

pub use channel::{
    ChannelAction, ChannelConfig, ChannelEvent, ChannelState, ChannelStateMachine, PeerKeyTimeout,
};
pub use cipher::PayloadCipher;
pub use duet_core::{ConversationId, MessageId, UserId, env::Environment};
pub use error::{ChannelError, KeyStoreError, PipelineError};
pub use keystore::{KeyStore, private_key_entry, public_key_entry};
pub use notification::{ENCRYPTED_PLACEHOLDER, NotificationDecryptor};
pub use pipeline::{
    DELETED_SENTINEL, DisplayMessage, DisplayQuote, DisplayText, MessagePipeline,
    PrivacyContext, QuotedMessage, TextState,
};
