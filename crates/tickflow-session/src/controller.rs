//! Single active session for a changing subscription.
//!
//! Every parameter change tears the current session down, waits for its
//! connection to be released and only then opens the replacement, so at most
//! one connection is live and no frame of the old pair lands after the switch.

use crate::error::SessionResult;
use crate::session::{SessionHandle, SessionManager};
use std::sync::Arc;
use tickflow_core::{Interval, Symbol};
use tickflow_feed::FeedKeys;
use tickflow_ws::{ConnectionState, StreamSubscription};
use tokio::sync::Mutex;
use tracing::info;

pub struct SessionController {
    manager: Arc<SessionManager>,
    current: Mutex<Option<SessionHandle>>,
}

impl SessionController {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            current: Mutex::new(None),
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Switch to (symbol, interval).
    ///
    /// Keeps the running session when the parameters are unchanged.
    pub async fn subscribe(&self, symbol: Symbol, interval: Interval) -> StreamSubscription {
        let requested = StreamSubscription::new(symbol.clone(), interval.clone());
        let mut current = self.current.lock().await;

        if let Some(existing) = current.as_ref() {
            if existing.subscription() == &requested && !existing.is_closed() {
                return requested;
            }
        }

        if let Some(previous) = current.take() {
            info!(from = %previous.subscription(), to = %requested, "Switching subscription");
            previous.shutdown().await;
        }

        *current = Some(self.manager.open_session(symbol, interval));
        requested
    }

    /// `subscribe` with unvalidated input.
    pub async fn subscribe_raw(
        &self,
        symbol: &str,
        interval: &str,
    ) -> SessionResult<StreamSubscription> {
        let symbol = Symbol::new(symbol)?;
        let interval = Interval::new(interval)?;
        Ok(self.subscribe(symbol, interval).await)
    }

    /// Close the current session and wait for it. Returns false if none.
    pub async fn teardown(&self) -> bool {
        let previous = self.current.lock().await.take();
        match previous {
            Some(handle) => {
                handle.shutdown().await;
                true
            }
            None => false,
        }
    }

    pub async fn current(&self) -> Option<StreamSubscription> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|h| h.subscription().clone())
    }

    pub async fn state(&self) -> Option<ConnectionState> {
        self.current.lock().await.as_ref().map(|h| h.state())
    }

    pub async fn keys(&self) -> Option<FeedKeys> {
        self.current.lock().await.as_ref().map(|h| h.keys().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::report::TracingReporter;
    use futures_util::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tickflow_core::Trade;
    use tickflow_feed::CacheStore;
    use tickflow_rest::{RestResult, SnapshotLoader};
    use tickflow_ws::{Transport, TransportContext, WsResult};

    /// Transport that tracks how many runs overlap.
    #[derive(Default)]
    struct CountingTransport {
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        runs: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl Transport for CountingTransport {
        fn run(
            &self,
            subscription: StreamSubscription,
            ctx: TransportContext,
        ) -> BoxFuture<'static, WsResult<()>> {
            let active = self.active.clone();
            let max_active = self.max_active.clone();
            self.runs.lock().push(subscription.to_string());
            Box::pin(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                ctx.shutdown.cancelled().await;
                // Give an overlapping run a chance to show up.
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    struct EmptyLoader;

    impl SnapshotLoader for EmptyLoader {
        fn fetch_initial_trades(
            &self,
            _symbol: &Symbol,
            _limit: usize,
        ) -> BoxFuture<'static, RestResult<Vec<Trade>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn controller(transport: Arc<CountingTransport>) -> SessionController {
        let manager = SessionManager::new(
            Arc::new(CacheStore::default()),
            Arc::new(EmptyLoader),
            Arc::new(TracingReporter),
            transport,
            SessionConfig::default(),
        );
        SessionController::new(Arc::new(manager))
    }

    #[tokio::test]
    async fn test_switch_tears_down_before_reopening() {
        let transport = Arc::new(CountingTransport::default());
        let controller = controller(transport.clone());

        controller.subscribe_raw("btcusdt", "1h").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        controller.subscribe_raw("ethusdt", "5m").await.unwrap();
        controller.subscribe_raw("ethusdt", "15m").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(transport.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(
            *transport.runs.lock(),
            vec!["BTCUSDT/1h", "ETHUSDT/5m", "ETHUSDT/15m"]
        );
        assert_eq!(
            controller.current().await.map(|s| s.to_string()),
            Some("ETHUSDT/15m".to_string())
        );
    }

    #[tokio::test]
    async fn test_same_parameters_keep_session() {
        let transport = Arc::new(CountingTransport::default());
        let controller = controller(transport.clone());

        controller.subscribe_raw("BTCUSDT", "1h").await.unwrap();
        controller.subscribe_raw("btcusdt", "1h").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(transport.runs.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_teardown() {
        let transport = Arc::new(CountingTransport::default());
        let controller = controller(transport.clone());

        assert!(!controller.teardown().await);
        controller.subscribe_raw("BTCUSDT", "1h").await.unwrap();
        assert!(controller.teardown().await);

        assert_eq!(transport.active.load(Ordering::SeqCst), 0);
        assert!(controller.current().await.is_none());
        assert!(controller.state().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_symbol_rejected() {
        let controller = controller(Arc::new(CountingTransport::default()));
        assert!(controller.subscribe_raw("BTC/USDT", "1h").await.is_err());
        assert!(controller.current().await.is_none());
    }
}
