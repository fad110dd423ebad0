//! Room configuration.

use std::time::Duration;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_MAX_PARTICIPANTS: usize = 1000;
pub const DEFAULT_MAX_CONCURRENT_SENDS: usize = 1000;
pub const DEFAULT_RATE_REFILL: Duration = Duration::from_secs(5);
pub const DEFAULT_RATE_BURST: u32 = 3;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Tunables for one chat room and its connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Number of recent messages kept in memory
    pub history_capacity: usize,
    /// Maximum number of concurrently registered participants
    pub max_participants: usize,
    /// Maximum number of in-flight fan-out sends, room wide
    pub max_concurrent_sends: usize,
    /// One rate-limit token is refilled every `rate_refill`
    pub rate_refill: Duration,
    /// Token bucket capacity
    pub rate_burst: u32,
    /// Upper bound for a single send to one connection
    pub send_timeout: Duration,
    /// Outbound queue length per WebSocket connection
    pub outbound_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            max_concurrent_sends: DEFAULT_MAX_CONCURRENT_SENDS,
            rate_refill: DEFAULT_RATE_REFILL,
            rate_burst: DEFAULT_RATE_BURST,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}
