//! Message pipeline.
//!
//! Converts between what the user sees and what the synchronized store holds.
//! Every operation takes a [`PrivacyContext`] snapshot of the channel, so the
//! pipeline itself holds no per-session state and can be cloned onto workers.
//!
//! Read path: decrypt failures are isolated per text field and fall back to
//! the stored string. Write path: a private conversation without a usable key
//! never falls back to plaintext.

use duet_core::{
    MessageId, UserId,
    env::Environment,
    sync::{NewMessage, StoredMessage},
};
use duet_crypto::SymmetricKey;

use crate::{cipher::PayloadCipher, error::PipelineError};

/// Text stored in place of a soft-deleted message.
pub const DELETED_SENTINEL: &str = "This message was deleted";

/// Snapshot of the channel used to seal or open one batch of messages.
#[derive(Debug, Clone, Default)]
pub struct PrivacyContext {
    /// Whether the conversation stores encrypted text
    pub is_private: bool,
    /// Shared secret, once established
    pub secret: Option<SymmetricKey>,
}

impl PrivacyContext {
    /// Non-private conversation: text is stored as-is.
    pub fn public() -> Self {
        Self { is_private: false, secret: None }
    }

    /// Private conversation with the secret known so far.
    pub fn private(secret: Option<SymmetricKey>) -> Self {
        Self { is_private: true, secret }
    }

    /// Whether an outgoing message can be stored right now.
    pub fn can_send(&self) -> bool {
        !self.is_private || self.secret.is_some()
    }
}

/// A message being quoted in a reply, in plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedMessage {
    /// Plaintext of the quoted message as displayed
    pub text: String,
    /// Author of the quoted message
    pub author: UserId,
}

/// How a displayed text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextState {
    /// Stored as plaintext
    Plain,
    /// Decrypted from a payload
    Decrypted,
    /// Could not be decrypted; the stored string is shown instead
    Undecryptable,
}

/// A text field ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayText {
    /// Text to show
    pub text: String,
    /// Where it came from
    pub state: TextState,
}

/// Quoted part of a displayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayQuote {
    /// Quoted text
    pub text: DisplayText,
    /// Quoted author
    pub author: Option<UserId>,
}

/// A message ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    /// Ordering key
    pub id: MessageId,
    /// Author
    pub sender_id: UserId,
    /// Message text
    pub text: DisplayText,
    /// Wall-clock milliseconds at send time
    pub timestamp: u64,
    /// Quoted message, if any
    pub quoted: Option<DisplayQuote>,
    /// Edited flag
    pub is_edited: bool,
    /// Seen flag
    pub is_seen: bool,
    /// Media references
    pub media_refs: Vec<String>,
}

/// Seals outgoing text and opens stored text for one local user.
#[derive(Clone)]
pub struct MessagePipeline<E: Environment> {
    local_user: UserId,
    env: E,
    cipher: PayloadCipher<E>,
}

impl<E: Environment> MessagePipeline<E> {
    /// Pipeline acting as `local_user`.
    pub fn new(local_user: UserId, env: E) -> Self {
        let cipher = PayloadCipher::new(env.clone());
        Self { local_user, env, cipher }
    }

    /// User this pipeline sends as.
    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    /// Build the stored form of an outgoing message.
    ///
    /// The quoted text is sealed independently under the current context,
    /// never copied from the quoted message's stored payload.
    ///
    /// # Errors
    ///
    /// - `ChannelNotEstablished` if the conversation is private and no secret
    ///   exists yet
    /// - `EncryptFailure` if encryption produced no payload
    pub fn prepare_outgoing(
        &self,
        context: &PrivacyContext,
        text: &str,
        quoted: Option<&QuotedMessage>,
        media_refs: Vec<String>,
    ) -> Result<NewMessage, PipelineError> {
        let message_text = self.seal(context, text)?;
        let quoted_message_text =
            quoted.map(|quote| self.seal(context, &quote.text)).transpose()?;

        Ok(NewMessage {
            sender_id: self.local_user.clone(),
            message_text,
            timestamp: self.env.wall_clock_millis(),
            quoted_message_text,
            quoted_message_author: quoted.map(|quote| quote.author.clone()),
            media_refs,
        })
    }

    /// Open one stored message for display. Never fails.
    pub fn decrypt_message(
        &self,
        context: &PrivacyContext,
        message: &StoredMessage,
    ) -> DisplayMessage {
        let quoted = message.quoted_message_text.as_deref().map(|text| DisplayQuote {
            text: self.open(context, text),
            author: message.quoted_message_author.clone(),
        });

        DisplayMessage {
            id: message.id,
            sender_id: message.sender_id.clone(),
            text: self.open(context, &message.message_text),
            timestamp: message.timestamp,
            quoted,
            is_edited: message.is_edited,
            is_seen: message.is_seen,
            media_refs: message.media_refs.clone(),
        }
    }

    /// Open a batch, preserving input order. A message that fails to decrypt
    /// only affects its own entry.
    pub fn decrypt_batch(
        &self,
        context: &PrivacyContext,
        messages: &[StoredMessage],
    ) -> Vec<DisplayMessage> {
        messages.iter().map(|message| self.decrypt_message(context, message)).collect()
    }

    /// Replace the text of an own message, re-sealed under the current
    /// context, and mark it edited.
    ///
    /// # Errors
    ///
    /// - `NotMessageAuthor` if the local user did not write the message
    /// - `ChannelNotEstablished` / `EncryptFailure` as for sending
    pub fn edit(
        &self,
        context: &PrivacyContext,
        message: &StoredMessage,
        new_text: &str,
    ) -> Result<StoredMessage, PipelineError> {
        self.check_author(message)?;

        let mut edited = message.clone();
        edited.message_text = self.seal(context, new_text)?;
        edited.is_edited = true;
        Ok(edited)
    }

    /// Replace the text of an own message with [`DELETED_SENTINEL`] and drop
    /// its media references. Quoted fields are kept.
    ///
    /// # Errors
    ///
    /// - `NotMessageAuthor` if the local user did not write the message
    /// - `ChannelNotEstablished` / `EncryptFailure` as for sending
    pub fn soft_delete(
        &self,
        context: &PrivacyContext,
        message: &StoredMessage,
    ) -> Result<StoredMessage, PipelineError> {
        self.check_author(message)?;

        let mut deleted = message.clone();
        deleted.message_text = self.seal(context, DELETED_SENTINEL)?;
        deleted.media_refs.clear();
        Ok(deleted)
    }

    fn check_author(&self, message: &StoredMessage) -> Result<(), PipelineError> {
        if message.sender_id == self.local_user {
            return Ok(());
        }

        Err(PipelineError::NotMessageAuthor {
            message: message.id,
            author: message.sender_id.clone(),
        })
    }

    fn seal(&self, context: &PrivacyContext, text: &str) -> Result<String, PipelineError> {
        if !context.is_private {
            return Ok(text.to_string());
        }

        let Some(secret) = &context.secret else {
            return Err(PipelineError::ChannelNotEstablished);
        };

        self.cipher
            .encrypt(text, secret)
            .map(String::from)
            .ok_or(PipelineError::EncryptFailure)
    }

    fn open(&self, context: &PrivacyContext, stored: &str) -> DisplayText {
        if !context.is_private || stored.is_empty() {
            return DisplayText { text: stored.to_string(), state: TextState::Plain };
        }

        let decrypted = context.secret.as_ref().and_then(|secret| self.cipher.decrypt(stored, secret));
        match decrypted {
            Some(text) => DisplayText { text, state: TextState::Decrypted },
            None => DisplayText { text: stored.to_string(), state: TextState::Undecryptable },
        }
    }
}
