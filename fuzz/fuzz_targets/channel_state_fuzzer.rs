//! Fuzz target for the key-exchange state machine
//!
//! Feeds arbitrary event sequences (duplicated keys, garbage peer keys,
//! stale derivations, teardown in the middle) into one channel.
//!
//! # Invariants
//!
//! - State never moves backwards
//! - The public key is published at most once
//! - Privacy never downgrades once observed
//! - Every event after teardown is rejected

#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use duet_client::{
    ChannelAction, ChannelConfig, ChannelError, ChannelEvent, ChannelStateMachine, PeerKeyTimeout,
};
use duet_crypto::{derive_secret, KeyPair};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    LocalKey(u8),
    LocalKeyFailed,
    Conversation { is_private: bool },
    PeerKey(u8),
    GarbagePeerKey(String),
    CompleteDerivation,
    Tick { millis: u16 },
    Teardown,
}

fn pair(seed: u8) -> KeyPair {
    KeyPair::from_seed([seed.max(1); 32])
}

fuzz_target!(|ops: Vec<Op>| {
    let start = Instant::now();
    let config = ChannelConfig { peer_key_timeout: PeerKeyTimeout::SurfaceAfter(Duration::from_secs(5)) };
    let (mut channel, _) = ChannelStateMachine::new(config, start);
    let mut elapsed = Duration::ZERO;
    let mut pending = Vec::new();
    let mut publications = 0;
    let mut saw_private = false;

    for op in ops {
        let event = match op {
            Op::LocalKey(seed) => ChannelEvent::LocalKeyReady(pair(seed)),
            Op::LocalKeyFailed => ChannelEvent::LocalKeyFailed { reason: "corrupt".to_string() },
            Op::Conversation { is_private } => ChannelEvent::ConversationObserved { is_private },
            Op::PeerKey(seed) => {
                ChannelEvent::PeerKeyObserved { encoded: pair(seed).public_key().to_base64() }
            }
            Op::GarbagePeerKey(encoded) => ChannelEvent::PeerKeyObserved { encoded },
            Op::CompleteDerivation => {
                let Some((local, peer)) = pending.pop() else {
                    continue;
                };
                match derive_secret(&local, &peer) {
                    Ok(secret) => ChannelEvent::SecretDerived { peer_key: peer, secret },
                    Err(e) => ChannelEvent::SecretRejected { peer_key: peer, reason: e.to_string() },
                }
            }
            Op::Tick { millis } => {
                elapsed += Duration::from_millis(u64::from(millis));
                ChannelEvent::Tick { now: start + elapsed }
            }
            Op::Teardown => ChannelEvent::Teardown,
        };

        let was_closed = channel.is_closed();
        let before = channel.state();

        match channel.handle(event) {
            Ok(actions) => {
                assert!(!was_closed, "event accepted after teardown");
                for action in actions {
                    match action {
                        ChannelAction::PublishPublicKey { .. } => publications += 1,
                        ChannelAction::DeriveSecret { local, peer } => pending.push((local, peer)),
                        _ => {}
                    }
                }
            }
            Err(ChannelError::Closed) => assert!(was_closed),
            Err(ChannelError::InvalidState { .. }) => {}
        }

        assert!(channel.state() >= before, "state moved backwards");
        assert!(publications <= 1, "public key published twice");

        saw_private |= channel.is_private();
        if saw_private {
            assert!(channel.is_private(), "privacy downgraded");
        }
    }
});
