//! Key-exchange state machine.
//!
//! One instance per open conversation, rebuilt from scratch every session.
//! Uses the action pattern: events go in, actions come out, and the runtime
//! performs all store access and runs the secret derivation on a worker.
//!
//! # State Machine
//!
//! ```text
//! ┌───────────────┐  LocalKeyReady  ┌─────────────────┐  SecretDerived  ┌─────────────┐
//! │ Unestablished │────────────────>│ AwaitingPeerKey │────────────────>│ Established │
//! └───────────────┘                 └─────────────────┘                 └─────────────┘
//!                                     │            ↑
//!                                     │ malformed  │
//!                                     │ peer key   │
//!                                     └────────────┘
//! ```
//!
//! Publication of the local public key waits until the conversation record
//! exists. The peer-key subscription starts immediately because the peer may
//! publish first.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use duet_crypto::{KeyPair, PrivateKey, PublicKey, SymmetricKey};

use crate::error::ChannelError;

/// Channel state. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChannelState {
    /// Session started, local key pair not ready yet
    Unestablished,
    /// Local key ready, waiting for a valid peer key
    AwaitingPeerKey,
    /// Shared secret derived
    Established,
}

/// Policy for a channel stuck in [`ChannelState::AwaitingPeerKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerKeyTimeout {
    /// Keep waiting silently
    #[default]
    WaitIndefinitely,
    /// Emit [`ChannelAction::PeerKeyTimedOut`] once after this long. The
    /// channel keeps listening afterwards.
    SurfaceAfter(Duration),
}

/// Channel configuration
#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    /// What to do when the peer key does not arrive
    pub peer_key_timeout: PeerKeyTimeout,
}

/// Events the runtime feeds into the channel.
///
/// Generic over `I` (Instant type) so tests can drive a virtual clock.
#[derive(Debug, Clone)]
pub enum ChannelEvent<I = Instant> {
    /// Local key pair loaded or generated.
    LocalKeyReady(KeyPair),

    /// Local key pair could not be loaded.
    LocalKeyFailed {
        /// Failure description
        reason: String,
    },

    /// The conversation record exists (or changed).
    ConversationObserved {
        /// Current `isPrivate` flag
        is_private: bool,
    },

    /// The peer's public key path has a value.
    PeerKeyObserved {
        /// Raw value at the path
        encoded: String,
    },

    /// A requested derivation finished.
    SecretDerived {
        /// Peer key the secret was derived with
        peer_key: PublicKey,
        /// The shared secret
        secret: SymmetricKey,
    },

    /// A requested derivation rejected the peer key.
    SecretRejected {
        /// Rejected peer key
        peer_key: PublicKey,
        /// Rejection reason
        reason: String,
    },

    /// Time tick for timeout processing.
    Tick {
        /// Current time from the environment
        now: I,
    },

    /// The conversation view is closing.
    Teardown,
}

/// Actions the channel produces for the runtime to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAction {
    /// Generate-or-load the local key pair (worker).
    LoadLocalKeys,

    /// Start observing the peer's public key path.
    SubscribePeerKey,

    /// Write the local public key to its path in the store.
    PublishPublicKey {
        /// Base64 public key
        encoded: String,
    },

    /// Derive the shared secret (worker), then feed back
    /// `SecretDerived` or `SecretRejected`.
    DeriveSecret {
        /// Local private key
        local: PrivateKey,
        /// Peer public key
        peer: PublicKey,
    },

    /// Set the conversation's `isPrivate` flag.
    MarkConversationPrivate,

    /// State moved forward.
    StateChanged {
        /// Previous state
        from: ChannelState,
        /// New state
        to: ChannelState,
    },

    /// Peer key data was unusable; still waiting.
    PeerKeyRejected {
        /// Why the key was rejected
        reason: String,
    },

    /// The configured peer-key timeout elapsed.
    PeerKeyTimedOut {
        /// Time since the channel opened
        waited: Duration,
    },

    /// No secure channel this session.
    ChannelUnavailable {
        /// Cause
        reason: String,
    },

    /// Drop the peer-key subscription.
    CancelSubscription,
}

/// Per-session key-exchange state machine.
///
/// Pure: no I/O, no environment. Time arrives through [`ChannelEvent::Tick`].
///
/// # Invariants
///
/// - State never moves backwards
/// - The local public key is published at most once per session, and only
///   after the conversation record exists
/// - Once established, the peer key and secret never change
pub struct ChannelStateMachine<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: ChannelConfig,
    state: ChannelState,
    opened_at: I,
    local: Option<KeyPair>,
    conversation: Option<bool>,
    published: bool,
    upgrade_requested: bool,
    /// Peer key seen before the local key was ready.
    held_peer: Option<PublicKey>,
    /// Peer key whose derivation is in flight.
    deriving: Option<PublicKey>,
    peer: Option<PublicKey>,
    secret: Option<SymmetricKey>,
    timeout_surfaced: bool,
    unavailable: Option<String>,
    closed: bool,
}

impl<I> ChannelStateMachine<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Fresh channel in [`ChannelState::Unestablished`].
    ///
    /// Returns the initial actions: load the local keys and subscribe to the
    /// peer key.
    pub fn new(config: ChannelConfig, now: I) -> (Self, Vec<ChannelAction>) {
        let machine = Self {
            config,
            state: ChannelState::Unestablished,
            opened_at: now,
            local: None,
            conversation: None,
            published: false,
            upgrade_requested: false,
            held_peer: None,
            deriving: None,
            peer: None,
            secret: None,
            timeout_surfaced: false,
            unavailable: None,
            closed: false,
        };

        (machine, vec![ChannelAction::LoadLocalKeys, ChannelAction::SubscribePeerKey])
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Shared secret. `None` until established.
    pub fn secret(&self) -> Option<&SymmetricKey> {
        self.secret.as_ref()
    }

    /// Whether the conversation is known to be private. `false` while the
    /// record does not exist yet.
    pub fn is_private(&self) -> bool {
        self.conversation.unwrap_or(false)
    }

    /// Whether the conversation record has been observed.
    pub fn conversation_exists(&self) -> bool {
        self.conversation.is_some()
    }

    /// Local public key, once ready.
    pub fn local_public_key(&self) -> Option<&PublicKey> {
        self.local.as_ref().map(KeyPair::public_key)
    }

    /// Peer public key the secret was derived with.
    pub fn peer_public_key(&self) -> Option<&PublicKey> {
        self.peer.as_ref()
    }

    /// Why the channel is unavailable this session, if it is.
    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }

    /// Whether [`ChannelEvent::Teardown`] was processed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// - `ChannelError::Closed` for any event after teardown
    /// - `ChannelError::InvalidState` for a second local key
    pub fn handle(&mut self, event: ChannelEvent<I>) -> Result<Vec<ChannelAction>, ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }

        match event {
            ChannelEvent::LocalKeyReady(pair) => self.handle_local_key(pair),
            ChannelEvent::LocalKeyFailed { reason } => Ok(self.handle_local_key_failed(reason)),
            ChannelEvent::ConversationObserved { is_private } => {
                Ok(self.handle_conversation(is_private))
            },
            ChannelEvent::PeerKeyObserved { encoded } => Ok(self.handle_peer_key(&encoded)),
            ChannelEvent::SecretDerived { peer_key, secret } => {
                Ok(self.handle_secret_derived(peer_key, secret))
            },
            ChannelEvent::SecretRejected { peer_key, reason } => {
                Ok(self.handle_secret_rejected(peer_key, reason))
            },
            ChannelEvent::Tick { now } => Ok(self.handle_tick(now)),
            ChannelEvent::Teardown => Ok(self.handle_teardown()),
        }
    }

    fn handle_local_key(&mut self, pair: KeyPair) -> Result<Vec<ChannelAction>, ChannelError> {
        if self.state != ChannelState::Unestablished || self.unavailable.is_some() {
            return Err(ChannelError::InvalidState {
                state: self.state,
                operation: "accept local key",
            });
        }

        self.local = Some(pair);
        let mut actions = vec![self.transition(ChannelState::AwaitingPeerKey)];
        self.publish_if_ready(&mut actions);

        if let Some(peer) = self.held_peer.take() {
            self.start_derivation(peer, &mut actions);
        }

        Ok(actions)
    }

    fn handle_local_key_failed(&mut self, reason: String) -> Vec<ChannelAction> {
        if self.unavailable.is_some() {
            return Vec::new();
        }

        tracing::warn!(%reason, "secure channel unavailable");
        self.unavailable = Some(reason.clone());
        self.held_peer = None;

        vec![ChannelAction::ChannelUnavailable { reason }, ChannelAction::CancelSubscription]
    }

    fn handle_conversation(&mut self, is_private: bool) -> Vec<ChannelAction> {
        // Privacy never downgrades within a session.
        let was_private = self.conversation.unwrap_or(false);
        self.conversation = Some(is_private || was_private);

        let mut actions = Vec::new();
        self.publish_if_ready(&mut actions);
        self.upgrade_if_needed(&mut actions);
        actions
    }

    fn handle_peer_key(&mut self, encoded: &str) -> Vec<ChannelAction> {
        if self.unavailable.is_some() {
            return Vec::new();
        }

        let peer = match PublicKey::from_base64(encoded) {
            Ok(peer) => peer,
            Err(error) => {
                tracing::warn!(%error, "ignoring malformed peer key");
                return vec![ChannelAction::PeerKeyRejected { reason: error.to_string() }];
            },
        };

        if let Some(established) = self.peer {
            if established != peer {
                tracing::warn!("ignoring different peer key after establishment");
            }
            return Vec::new();
        }

        if self.deriving == Some(peer) {
            return Vec::new();
        }

        if self.local.is_none() {
            self.held_peer = Some(peer);
            return Vec::new();
        }

        let mut actions = Vec::new();
        self.start_derivation(peer, &mut actions);
        actions
    }

    fn handle_secret_derived(&mut self, peer: PublicKey, secret: SymmetricKey) -> Vec<ChannelAction> {
        if self.deriving != Some(peer) {
            tracing::debug!("discarding stale derivation result");
            return Vec::new();
        }

        self.deriving = None;
        self.peer = Some(peer);
        self.secret = Some(secret);

        let mut actions = vec![self.transition(ChannelState::Established)];
        self.upgrade_if_needed(&mut actions);
        actions
    }

    fn handle_secret_rejected(&mut self, peer: PublicKey, reason: String) -> Vec<ChannelAction> {
        if self.deriving != Some(peer) {
            return Vec::new();
        }

        tracing::warn!(%reason, "peer key rejected during derivation");
        self.deriving = None;
        vec![ChannelAction::PeerKeyRejected { reason }]
    }

    fn handle_tick(&mut self, now: I) -> Vec<ChannelAction> {
        let PeerKeyTimeout::SurfaceAfter(limit) = self.config.peer_key_timeout else {
            return Vec::new();
        };

        if self.state == ChannelState::Established
            || self.timeout_surfaced
            || self.unavailable.is_some()
        {
            return Vec::new();
        }

        let waited = now - self.opened_at;
        if waited < limit {
            return Vec::new();
        }

        tracing::info!(?waited, "peer key still missing");
        self.timeout_surfaced = true;
        vec![ChannelAction::PeerKeyTimedOut { waited }]
    }

    fn handle_teardown(&mut self) -> Vec<ChannelAction> {
        self.closed = true;
        self.held_peer = None;
        self.deriving = None;

        if self.unavailable.is_some() {
            Vec::new()
        } else {
            vec![ChannelAction::CancelSubscription]
        }
    }

    fn transition(&mut self, to: ChannelState) -> ChannelAction {
        debug_assert!(to > self.state);
        let from = self.state;
        self.state = to;

        tracing::info!(?from, ?to, "channel state changed");
        ChannelAction::StateChanged { from, to }
    }

    fn publish_if_ready(&mut self, actions: &mut Vec<ChannelAction>) {
        if self.published || self.conversation.is_none() {
            return;
        }

        if let Some(pair) = &self.local {
            self.published = true;
            actions.push(ChannelAction::PublishPublicKey { encoded: pair.public_key().to_base64() });
        }
    }

    fn upgrade_if_needed(&mut self, actions: &mut Vec<ChannelAction>) {
        if self.state != ChannelState::Established || self.upgrade_requested {
            return;
        }

        match self.conversation {
            Some(false) => {
                self.upgrade_requested = true;
                self.conversation = Some(true);
                actions.push(ChannelAction::MarkConversationPrivate);
            },
            Some(true) => self.upgrade_requested = true,
            None => {},
        }
    }

    fn start_derivation(&mut self, peer: PublicKey, actions: &mut Vec<ChannelAction>) {
        let Some(pair) = &self.local else {
            return;
        };

        self.deriving = Some(peer);
        actions.push(ChannelAction::DeriveSecret { local: pair.private_key().clone(), peer });
    }
}
