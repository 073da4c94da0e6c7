//! REST error types.
//!
//! A failed snapshot is never fatal: the session reports it and keeps
//! streaming onto an empty trade window.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<tickflow_core::CoreError> for RestError {
    fn from(e: tickflow_core::CoreError) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type RestResult<T> = Result<T, RestError>;
