//! Market stream sessions.
//!
//! A session owns one connection for one (symbol, interval) pair, seeds the
//! trade window from a REST snapshot and feeds every frame through the
//! dispatcher into the shared cache store. Closing a session guarantees no
//! further cache writes from it, even for frames already in flight.

pub mod config;
pub mod controller;
pub mod epoch;
pub mod error;
pub mod report;
pub mod session;

pub use config::SessionConfig;
pub use controller::SessionController;
pub use epoch::EpochGuard;
pub use error::{SessionError, SessionResult};
pub use report::{ErrorKind, ErrorReporter, TracingReporter};
pub use session::{SessionHandle, SessionManager};
