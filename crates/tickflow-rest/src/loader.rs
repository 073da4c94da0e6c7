//! Snapshot loader seam used by sessions.

use crate::client::TradeSnapshotClient;
use crate::error::RestResult;
use futures_util::future::BoxFuture;
use tickflow_core::{Symbol, Trade};

/// Loads the initial trade history for a symbol.
pub trait SnapshotLoader: Send + Sync + 'static {
    fn fetch_initial_trades(
        &self,
        symbol: &Symbol,
        limit: usize,
    ) -> BoxFuture<'static, RestResult<Vec<Trade>>>;
}

impl SnapshotLoader for TradeSnapshotClient {
    fn fetch_initial_trades(
        &self,
        symbol: &Symbol,
        limit: usize,
    ) -> BoxFuture<'static, RestResult<Vec<Trade>>> {
        let client = self.clone();
        let symbol = symbol.clone();
        Box::pin(async move { client.fetch_recent_trades(&symbol, limit).await })
    }
}
