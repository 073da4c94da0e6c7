//! Feed error types.

use thiserror::Error;
use tickflow_core::CoreError;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Frame could not be decoded; the cached value is left as it was.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Depth update with too few levels on either side.
    #[error("Incomplete depth update: bids={bids}, asks={asks}")]
    IncompleteDepthUpdate { bids: usize, asks: usize },

    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),
}

impl FeedError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedFrame(_))
    }
}

impl From<CoreError> for FeedError {
    fn from(e: CoreError) -> Self {
        Self::MalformedFrame(e.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedFrame(e.to_string())
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
