//! Session lifecycle against a local market stream server.

mod common;

use common::mock_ws::MockWsServer;
use common::{manager, manager_with_backoff, trade_frame, wait_until, RecordingReporter};
use std::sync::Arc;
use std::time::Duration;
use tickflow_core::{Interval, Symbol};
use tickflow_feed::CacheStore;
use tickflow_session::{ErrorKind, SessionController, SessionHandle};

fn pair(symbol: &str, interval: &str) -> (Symbol, Interval) {
    (Symbol::new(symbol).unwrap(), Interval::new(interval).unwrap())
}

fn trade_count(store: &CacheStore, session: &SessionHandle) -> usize {
    store
        .get(&session.keys().trades)
        .map_or(0, |entry| entry.value.len())
}

#[tokio::test]
async fn test_closed_session_releases_connection_and_stops_writing() {
    let server = MockWsServer::start().await;
    let reporter = Arc::new(RecordingReporter::default());
    let manager = manager(&server.url(), reporter);
    let store = manager.store().clone();

    let (btc, h1) = pair("BTCUSDT", "1h");
    let (eth, _) = pair("ETHUSDT", "1h");
    let a = manager.open_session(btc, h1.clone());
    let b = manager.open_session(eth, h1);
    wait_until(|| server.active() == 2).await;

    server.push("btcusdt@trade", trade_frame("BTCUSDT", 100));
    server.push("ethusdt@trade", trade_frame("ETHUSDT", 200));
    wait_until(|| trade_count(&store, &a) == 1 && trade_count(&store, &b) == 1).await;

    a.shutdown().await;
    wait_until(|| server.active() == 1).await;
    let frozen = store.get(&a.keys().trades).unwrap();

    server.push("btcusdt@trade", trade_frame("BTCUSDT", 101));
    server.push("ethusdt@trade", trade_frame("ETHUSDT", 201));
    wait_until(|| trade_count(&store, &b) == 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after = store.get(&a.keys().trades).unwrap();
    assert_eq!(after.version, frozen.version);
    assert_eq!(after.value.len(), 1);
    assert!(!b.is_closed());
}

#[tokio::test]
async fn test_reconnect_reuses_subscription_parameters() {
    let server = MockWsServer::start().await;
    let reporter = Arc::new(RecordingReporter::default());
    let manager = manager(&server.url(), reporter.clone());
    let store = manager.store().clone();

    let (btc, h1) = pair("BTCUSDT", "1h");
    let session = manager.open_session(btc, h1);
    wait_until(|| server.active() == 1).await;

    server.drop_all();
    wait_until(|| server.total() == 2 && server.active() == 1).await;

    let paths = server.paths();
    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0], paths[1]);
    assert!(paths[0].contains("btcusdt@kline_1h"));
    wait_until(|| reporter.kinds().contains(&ErrorKind::Connection)).await;

    server.push("btcusdt@trade", trade_frame("BTCUSDT", 100));
    wait_until(|| trade_count(&store, &session) == 1).await;

    session.shutdown().await;
    wait_until(|| server.active() == 0).await;
}

#[tokio::test]
async fn test_controller_switch_keeps_one_connection() {
    let server = MockWsServer::start().await;
    let reporter = Arc::new(RecordingReporter::default());
    let controller = SessionController::new(Arc::new(manager(&server.url(), reporter)));

    controller.subscribe_raw("BTCUSDT", "1h").await.unwrap();
    wait_until(|| server.active() == 1).await;

    controller.subscribe_raw("ETHUSDT", "5m").await.unwrap();
    wait_until(|| server.total() == 2).await;
    assert_eq!(server.active(), 1);

    let paths = server.paths();
    assert!(paths[0].contains("btcusdt@kline_1h"));
    assert!(paths[1].contains("ethusdt@kline_5m"));

    assert!(controller.teardown().await);
    wait_until(|| server.active() == 0).await;
}

#[tokio::test]
async fn test_switch_during_backoff_abandons_old_reconnect() {
    let server = MockWsServer::start().await;
    let reporter = Arc::new(RecordingReporter::default());
    let manager = manager_with_backoff(&server.url(), reporter.clone(), 400, 400);
    let store = manager.store().clone();
    let controller = SessionController::new(Arc::new(manager));

    controller.subscribe_raw("BTCUSDT", "1h").await.unwrap();
    wait_until(|| server.active() == 1).await;

    // The disconnect is reported before the backoff starts.
    server.drop_all();
    wait_until(|| reporter.kinds().contains(&ErrorKind::Connection)).await;

    controller.subscribe_raw("ETHUSDT", "5m").await.unwrap();
    wait_until(|| server.total() == 2 && server.active() == 1).await;

    // Outlast the abandoned backoff, jitter included.
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    let paths = server.paths();
    assert_eq!(paths.len(), 2);
    assert!(paths[0].contains("btcusdt@kline_1h"));
    assert!(paths[1].contains("ethusdt@kline_5m"));
    assert_eq!(server.active(), 1);

    let keys = controller.keys().await.unwrap();
    server.push("ethusdt@trade", trade_frame("ETHUSDT", 300));
    wait_until(|| store.get(&keys.trades).map_or(0, |e| e.value.len()) == 1).await;

    assert!(controller.teardown().await);
    wait_until(|| server.active() == 0).await;
}
