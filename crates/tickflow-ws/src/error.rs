//! WebSocket error types.
//!
//! Every variant is a transport-level failure: the connection manager reacts
//! to all of them by reconnecting.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

impl WsError {
    /// Short cause label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "connection_failed",
            Self::ConnectionClosed { .. } => "closed_by_server",
            Self::SendFailed(_) => "send_failed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Tungstenite(_) => "transport_error",
        }
    }
}

pub type WsResult<T> = Result<T, WsError>;
