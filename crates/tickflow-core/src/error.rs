//! Error types for tickflow-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
