//! Application wiring and main loop.

use crate::config::AppConfig;
use crate::error::AppResult;
use rust_decimal::Decimal;
use std::sync::Arc;
use tickflow_feed::{CacheStore, FeedKeys, Freshness};
use tickflow_rest::TradeSnapshotClient;
use tickflow_session::{SessionController, SessionManager, TracingReporter};
use tickflow_telemetry::FeedStatsReporter;
use tickflow_ws::WsTransport;
use tracing::info;

/// Point-in-time view of the cached market data for one subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSummary {
    pub trades: usize,
    pub last_price: Option<Decimal>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub candles: usize,
    pub ticker_freshness: Option<Freshness>,
    pub book_freshness: Option<Freshness>,
}

impl CacheSummary {
    pub fn collect(store: &CacheStore, keys: &FeedKeys) -> Self {
        let trades = store.get(&keys.trades);
        let ticker = store.get(&keys.ticker);
        let book = store.get(&keys.order_book);
        let candles = store.get(&keys.candles);

        let last_price = ticker
            .as_ref()
            .map(|t| t.value.last_price.inner())
            .or_else(|| {
                trades
                    .as_ref()
                    .and_then(|t| t.value.latest().map(|trade| trade.price.inner()))
            });

        Self {
            trades: trades.as_ref().map_or(0, |t| t.value.len()),
            last_price,
            best_bid: book
                .as_ref()
                .and_then(|b| b.value.best_bid())
                .map(|l| l.price.inner()),
            best_ask: book
                .as_ref()
                .and_then(|b| b.value.best_ask())
                .map(|l| l.price.inner()),
            candles: candles.as_ref().map_or(0, |c| c.value.len()),
            ticker_freshness: ticker.as_ref().map(|t| t.freshness()),
            book_freshness: book.as_ref().map(|b| b.freshness()),
        }
    }

    fn log(&self, subscription: &str) {
        info!(
            %subscription,
            trades = self.trades,
            last_price = ?self.last_price,
            best_bid = ?self.best_bid,
            best_ask = ?self.best_ask,
            candles = self.candles,
            ticker = self.ticker_freshness.map_or("missing", |f| f.label()),
            book = self.book_freshness.map_or("missing", |f| f.label()),
            "Cache summary"
        );
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    store: Arc<CacheStore>,
    controller: SessionController,
    stats: FeedStatsReporter,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let store = Arc::new(CacheStore::new(config.cache_policy()));
        let loader = Arc::new(TradeSnapshotClient::new(config.rest_url.clone())?);
        let transport = Arc::new(WsTransport::new(
            config.ws_url.clone(),
            config.websocket.clone().into(),
        ));
        let manager = SessionManager::new(
            store.clone(),
            loader,
            Arc::new(TracingReporter),
            transport,
            config.session_config(),
        );

        Ok(Self {
            config,
            store,
            controller: SessionController::new(Arc::new(manager)),
            stats: FeedStatsReporter::new(),
        })
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Subscribe and run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        let (symbol, interval) = self.config.market()?;
        let subscription = self.controller.subscribe(symbol, interval).await;
        let label = subscription.to_string();
        info!(subscription = %label, ws_url = %self.config.ws_url, "Starting application");

        let mut summary_interval = tokio::time::interval(self.config.summary_interval());
        let mut stats_interval = tokio::time::interval(self.config.stats_interval());
        // The first tick of an interval fires immediately.
        summary_interval.tick().await;
        stats_interval.tick().await;

        loop {
            tokio::select! {
                _ = summary_interval.tick() => {
                    if let Some(keys) = self.controller.keys().await {
                        CacheSummary::collect(&self.store, &keys).log(&label);
                    }
                }

                _ = stats_interval.tick() => {
                    self.stats.log_summary();
                }

                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.controller.teardown().await;
        info!("Final statistics summary:");
        self.stats.log_summary();
        Ok(())
    }
}
