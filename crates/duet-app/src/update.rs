//! Updates a session reports to its UI.

use std::time::Duration;

use duet_client::{ChannelState, DisplayMessage};

/// Something the UI should react to after a session cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// The channel moved forward.
    ChannelStateChanged {
        /// Previous state
        from: ChannelState,
        /// New state
        to: ChannelState,
    },

    /// Peer key data was unusable; the channel keeps waiting.
    PeerKeyRejected {
        /// Why it was rejected
        reason: String,
    },

    /// The configured peer-key timeout elapsed.
    PeerKeyTimedOut {
        /// Time since the session opened
        waited: Duration,
    },

    /// No secure channel for this session ("secure channel unavailable").
    ChannelUnavailable {
        /// Cause
        reason: String,
    },

    /// The conversation record appeared or its privacy flag changed.
    ConversationChanged {
        /// Current `isPrivate` flag
        is_private: bool,
    },

    /// The message list was re-read and decrypted, in store order.
    MessagesRefreshed(Vec<DisplayMessage>),
}
