//! REST snapshot loading for tickflow.
//!
//! Fetches the recent trade history that seeds a session's trade window
//! before the live stream takes over.

pub mod client;
pub mod error;
pub mod loader;

pub use client::{RawRestTrade, TradeSnapshotClient};
pub use error::{RestError, RestResult};
pub use loader::SnapshotLoader;
