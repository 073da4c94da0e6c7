//! Events delivered from the connection to its consumer.

use crate::connection::ConnectionState;

/// Event emitted by a market stream connection, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    /// The connection moved to a new lifecycle state.
    StateChanged(ConnectionState),
    /// Raw text frame, not yet parsed.
    Frame(String),
    /// The connection dropped unexpectedly (not on shutdown).
    Disconnected {
        /// Short cause label, see `WsError::label`.
        cause: &'static str,
        reason: String,
    },
}

