//! Session configuration.

use std::time::Duration;

use duet_client::ChannelConfig;

/// Default number of messages decrypted per worker task.
pub const DEFAULT_DECRYPT_CHUNK_SIZE: usize = 16;

/// Default interval between timer ticks fed to the channel.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Key-exchange policy
    pub channel: ChannelConfig,
    /// Messages per batch-decrypt worker task (minimum 1)
    pub decrypt_chunk_size: usize,
    /// Interval between timer ticks
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            decrypt_chunk_size: DEFAULT_DECRYPT_CHUNK_SIZE,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}
