//! Multiplexed market stream client.
//!
//! Provides one WebSocket connection per subscription with:
//! - All feeds of a (symbol, interval) pair carried on a single combined stream
//! - Automatic reconnection with capped exponential backoff
//! - Ping/pong liveness monitoring
//! - Channel-based, order-preserving frame delivery

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod subscription;
pub mod transport;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use error::{WsError, WsResult};
pub use message::WsEvent;
pub use subscription::StreamSubscription;
pub use transport::{Transport, TransportContext, WsTransport};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
