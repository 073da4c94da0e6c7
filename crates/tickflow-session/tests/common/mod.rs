//! Shared fixtures for session integration tests.

#![allow(dead_code)]

pub mod mock_ws;

use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tickflow_core::{Symbol, Trade};
use tickflow_feed::CacheStore;
use tickflow_rest::{RestResult, SnapshotLoader};
use tickflow_session::{ErrorKind, ErrorReporter, SessionConfig, SessionManager};
use tickflow_ws::{ConnectionConfig, WsTransport};

pub struct EmptyLoader;

impl SnapshotLoader for EmptyLoader {
    fn fetch_initial_trades(
        &self,
        _symbol: &Symbol,
        _limit: usize,
    ) -> BoxFuture<'static, RestResult<Vec<Trade>>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    errors: parking_lot::Mutex<Vec<(ErrorKind, String)>>,
}

impl RecordingReporter {
    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.errors.lock().iter().map(|(k, _)| *k).collect()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report_error(&self, kind: ErrorKind, message: &str) {
        self.errors.lock().push((kind, message.to_string()));
    }
}

/// Manager wired to a real WebSocket transport with fast reconnects.
pub fn manager(base_url: &str, reporter: Arc<RecordingReporter>) -> SessionManager {
    manager_with_backoff(base_url, reporter, 20, 100)
}

pub fn manager_with_backoff(
    base_url: &str,
    reporter: Arc<RecordingReporter>,
    base_delay_ms: u64,
    max_delay_ms: u64,
) -> SessionManager {
    let template = ConnectionConfig {
        reconnect_base_delay_ms: base_delay_ms,
        reconnect_max_delay_ms: max_delay_ms,
        ..Default::default()
    };
    SessionManager::new(
        Arc::new(CacheStore::default()),
        Arc::new(EmptyLoader),
        reporter,
        Arc::new(WsTransport::new(base_url, template)),
        SessionConfig::default(),
    )
}

pub fn trade_frame(symbol: &str, price: u32) -> String {
    serde_json::json!({
        "stream": format!("{}@trade", symbol.to_ascii_lowercase()),
        "data": {
            "e": "trade", "s": symbol, "p": price.to_string(), "q": "1",
            "T": 1_700_000_000_000i64 + i64::from(price), "m": false
        }
    })
    .to_string()
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
