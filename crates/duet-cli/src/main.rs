//! Duet demo binary.
//!
//! Runs two participants in one process against a shared in-memory
//! synchronized store: both open the conversation, exchange public keys,
//! upgrade it to private, and then exchange one encrypted message.
//!
//! # Usage
//!
//! ```bash
//! # Ephemeral keys
//! duet --alice alice --bob bob --message "Hello"
//!
//! # Key pairs persisted per participant in redb files
//! duet --data-dir ./duet-data --message "Hello"
//! ```

use std::{path::Path, time::Duration};

use clap::Parser;
use duet_app::{Session, SessionConfig, SessionUpdate, SystemEnv};
use duet_client::{ChannelConfig, ChannelState, KeyStore, PeerKeyTimeout};
use duet_core::{
    ConversationId, UserId,
    storage::{KeyValueStore, MemoryKeyValueStore, RedbKeyValueStore},
    sync::{MemorySyncStore, SyncStore},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type DemoSession<K> = Session<SystemEnv, K, MemorySyncStore>;

/// Duet two-party demo
#[derive(Parser, Debug)]
#[command(name = "duet")]
#[command(about = "End-to-end encrypted two-party conversation demo")]
#[command(version)]
struct Args {
    /// First participant
    #[arg(long, default_value = "alice")]
    alice: String,

    /// Second participant
    #[arg(long, default_value = "bob")]
    bob: String,

    /// Message the first participant sends once the channel is up
    #[arg(short, long, default_value = "Hello")]
    message: String,

    /// Directory for persistent key stores (in-memory if omitted)
    #[arg(long)]
    data_dir: Option<String>,

    /// Seconds before the session reports a missing peer key. The session
    /// keeps listening after the report; this demo treats it as fatal and
    /// exits.
    #[arg(long, default_value = "10")]
    peer_key_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Duet demo starting");

    match &args.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let alice_keys = open_key_store(dir, &args.alice)?;
            let bob_keys = open_key_store(dir, &args.bob)?;
            tracing::info!("Persisting key pairs under {dir}");
            run(&args, alice_keys, bob_keys).await
        },
        None => run(&args, MemoryKeyValueStore::new(), MemoryKeyValueStore::new()).await,
    }
}

fn open_key_store(dir: &str, user: &str) -> Result<RedbKeyValueStore, Box<dyn std::error::Error>> {
    Ok(RedbKeyValueStore::open(Path::new(dir).join(format!("{user}.redb")))?)
}

async fn run<K: KeyValueStore>(
    args: &Args,
    alice_keys: K,
    bob_keys: K,
) -> Result<(), Box<dyn std::error::Error>> {
    let alice_id = UserId::from(args.alice.as_str());
    let bob_id = UserId::from(args.bob.as_str());
    let store = MemorySyncStore::new();

    let config = SessionConfig {
        channel: ChannelConfig {
            peer_key_timeout: PeerKeyTimeout::SurfaceAfter(Duration::from_secs(
                args.peer_key_timeout_secs,
            )),
        },
        ..SessionConfig::default()
    };

    // The record must exist before either side publishes its key.
    let conversation = ConversationId::for_participants(&alice_id, &bob_id);
    store.create_conversation(&conversation, [alice_id.clone(), bob_id.clone()], false)?;

    let mut alice = Session::open(
        SystemEnv::new(),
        config.clone(),
        alice_id.clone(),
        bob_id.clone(),
        KeyStore::new(alice_keys),
        store.clone(),
    )?;
    let mut bob = Session::open(
        SystemEnv::new(),
        config,
        bob_id,
        alice_id,
        KeyStore::new(bob_keys),
        store.clone(),
    )?;

    tracing::info!(%conversation, "Waiting for key exchange");
    establish(&mut alice, &mut bob).await?;

    let sent = alice.send_message(&args.message, None, Vec::new()).await?;
    tracing::info!(message = %sent.id, stored = %sent.message_text, "Sent encrypted message");

    for message in bob.refresh_messages().await? {
        tracing::info!(
            from = %message.sender_id,
            state = ?message.text.state,
            "{}",
            message.text.text
        );
    }

    alice.close();
    bob.close();
    Ok(())
}

async fn establish<K: KeyValueStore>(
    alice: &mut DemoSession<K>,
    bob: &mut DemoSession<K>,
) -> Result<(), Box<dyn std::error::Error>> {
    while alice.state() != ChannelState::Established || bob.state() != ChannelState::Established {
        for session in [&mut *alice, &mut *bob] {
            for update in session.process_cycle().await? {
                report(session.local_user(), &update)?;
            }
        }
    }

    Ok(())
}

fn report(user: &UserId, update: &SessionUpdate) -> Result<(), Box<dyn std::error::Error>> {
    match update {
        SessionUpdate::ChannelStateChanged { from, to } => {
            tracing::info!(%user, ?from, ?to, "Channel state changed");
        },
        SessionUpdate::ConversationChanged { is_private } => {
            tracing::info!(%user, is_private, "Conversation updated");
        },
        SessionUpdate::MessagesRefreshed(messages) => {
            tracing::debug!(%user, count = messages.len(), "Messages refreshed");
        },
        SessionUpdate::PeerKeyRejected { reason } => {
            tracing::warn!(%user, %reason, "Peer key rejected");
        },
        SessionUpdate::PeerKeyTimedOut { waited } => {
            return Err(format!("{user}: no peer key after {waited:?}").into());
        },
        SessionUpdate::ChannelUnavailable { reason } => {
            return Err(format!("{user}: secure channel unavailable: {reason}").into());
        },
    }

    Ok(())
}
