//! Error surface for session failures.

use std::fmt;
use tickflow_telemetry::Metrics;
use tracing::warn;

/// Failures surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The connection dropped or could not be established.
    Connection,
    /// A frame could not be decoded and was skipped.
    MalformedFrame,
    /// The initial trade snapshot could not be loaded.
    SnapshotFetch,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::MalformedFrame => "malformed_frame",
            Self::SnapshotFetch => "snapshot_fetch",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Receives user-visible errors. Implementations must not block.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report_error(&self, kind: ErrorKind, message: &str);
}

/// Reporter that logs and counts errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report_error(&self, kind: ErrorKind, message: &str) {
        Metrics::error_reported(kind.label());
        warn!(kind = %kind, %message, "Market data error");
    }
}
