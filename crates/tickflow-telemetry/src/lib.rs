//! Prometheus metrics and structured logging for tickflow.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus metrics for connection, session and frame handling
//! - Periodic feed statistics read back from the metrics

pub mod error;
pub mod logging;
pub mod metrics;
pub mod stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use stats::{FeedStats, FeedStatsReporter};
