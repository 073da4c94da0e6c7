//! Transport seam between a session and its physical connection.
//!
//! Sessions depend on `Transport` rather than on `ConnectionManager`, so the
//! session worker can be driven by scripted frames in tests.

use crate::connection::{ConnectionConfig, ConnectionManager, ConnectionState};
use crate::error::WsResult;
use crate::message::WsEvent;
use crate::subscription::StreamSubscription;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Handles a transport run reports through.
#[derive(Clone)]
pub struct TransportContext {
    /// State owned by this run. Sessions do not read it; they track state
    /// from `WsEvent::StateChanged`.
    pub state: Arc<RwLock<ConnectionState>>,
    /// Ordered event channel to the session worker.
    pub events: mpsc::Sender<WsEvent>,
    /// Cancelled when the session is closed.
    pub shutdown: CancellationToken,
}

/// Opens a market stream for a subscription and runs it until shutdown.
pub trait Transport: Send + Sync + 'static {
    fn run(
        &self,
        subscription: StreamSubscription,
        ctx: TransportContext,
    ) -> BoxFuture<'static, WsResult<()>>;
}

/// Transport backed by a real WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsTransport {
    base_url: String,
    /// Reconnect and heartbeat settings; `url` is filled per subscription.
    template: ConnectionConfig,
}

impl WsTransport {
    pub fn new(base_url: impl Into<String>, template: ConnectionConfig) -> Self {
        Self {
            base_url: base_url.into(),
            template,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Connection config for a subscription; the URL is fixed from here on.
    pub fn config_for(&self, subscription: &StreamSubscription) -> ConnectionConfig {
        ConnectionConfig {
            url: subscription.url(&self.base_url),
            ..self.template.clone()
        }
    }
}

impl Transport for WsTransport {
    fn run(
        &self,
        subscription: StreamSubscription,
        ctx: TransportContext,
    ) -> BoxFuture<'static, WsResult<()>> {
        let config = self.config_for(&subscription);
        Box::pin(async move {
            info!(%subscription, url = %config.url, "Starting market stream");
            let manager = ConnectionManager::new(config, ctx.state, ctx.events, ctx.shutdown);
            manager.connect().await
        })
    }
}
