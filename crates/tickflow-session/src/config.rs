//! Session configuration.

use tickflow_core::TRADE_WINDOW_CAPACITY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Trades requested from the snapshot endpoint.
    pub snapshot_limit: usize,
    /// Capacity of the connection event channel.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            snapshot_limit: TRADE_WINDOW_CAPACITY,
            event_buffer: 1024,
        }
    }
}
