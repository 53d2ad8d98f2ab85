use std::time::Duration;

use datashare_cursor::StoreKind;
use datashare_frame::MessageConfig;

/// Consumer behavior configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Attempts per request send; a failed channel is replaced between attempts.
    pub send_attempts: u32,
    /// Attempts to launch a provider before giving up.
    pub launch_attempts: u32,
    /// Sleep between launch attempts.
    pub launch_backoff: Duration,
    /// How long [`Consumer::wait_for`](crate::Consumer::wait_for) blocks.
    pub response_timeout: Duration,
    /// Framing limits and socket timeouts for every channel.
    pub message: MessageConfig,
    /// Backing store for decoded result sets.
    pub store: StoreKind,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            send_attempts: 2,
            launch_attempts: 4,
            launch_backoff: Duration::from_secs(1),
            response_timeout: Duration::from_secs(5),
            message: MessageConfig::default(),
            store: StoreKind::Memory,
        }
    }
}

/// Provider behavior configuration.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub message: MessageConfig,
}
