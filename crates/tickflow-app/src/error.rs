//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Invalid market parameters: {0}")]
    Market(#[from] tickflow_core::CoreError),

    #[error("Snapshot client error: {0}")]
    Rest(#[from] tickflow_rest::RestError),

    #[error("Session error: {0}")]
    Session(#[from] tickflow_session::SessionError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tickflow_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
