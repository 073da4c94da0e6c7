//! Session error types.

use crate::report::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(#[from] tickflow_core::CoreError),

    #[error("Connection error: {0}")]
    Connection(#[from] tickflow_ws::WsError),

    #[error("Feed error: {0}")]
    Feed(#[from] tickflow_feed::FeedError),

    #[error("Snapshot fetch error: {0}")]
    SnapshotFetch(#[from] tickflow_rest::RestError),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// How the error is surfaced to the reporter.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSubscription(_) | Self::Connection(_) => ErrorKind::Connection,
            Self::Feed(_) => ErrorKind::MalformedFrame,
            Self::SnapshotFetch(_) => ErrorKind::SnapshotFetch,
        }
    }
}
