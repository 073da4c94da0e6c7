//! tickflow service.
//!
//! Wires the components together:
//! - Cache store shared by every session
//! - Trade snapshot client
//! - WebSocket transport and session controller
//! - Periodic cache and feed statistics summaries

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, CacheSummary};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
