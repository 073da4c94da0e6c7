//! HTTP client for the recent trades endpoint.
//!
//! `GET {base}/trades?symbol=BTCUSDT&limit=100` returns the most recent
//! trades, oldest first.

use crate::error::{RestError, RestResult};
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tickflow_core::{CoreError, Price, Size, Symbol, Trade};
use tracing::{debug, info};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest `limit` the endpoint accepts.
pub const MAX_TRADE_LIMIT: usize = 1000;

/// Trade as returned by the REST API. Extra fields are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRestTrade {
    pub price: String,
    pub qty: String,
    pub time: i64,
    pub is_buyer_maker: bool,
}

impl RawRestTrade {
    pub fn into_trade(self) -> RestResult<Trade> {
        let timestamp = Utc
            .timestamp_millis_opt(self.time)
            .single()
            .ok_or(CoreError::InvalidTimestamp(self.time))?;
        Ok(Trade::new(
            Price::parse_field("price", &self.price)?,
            Size::parse_field("qty", &self.qty)?,
            timestamp,
            self.is_buyer_maker,
        ))
    }
}

/// Client for the trade snapshot endpoint.
#[derive(Debug, Clone)]
pub struct TradeSnapshotClient {
    client: Client,
    /// REST base URL, e.g. `https://api.binance.com/api/v3`.
    base_url: String,
}

impl TradeSnapshotClient {
    pub fn new(base_url: impl Into<String>) -> RestResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RestError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch up to `limit` recent trades for `symbol`, oldest first.
    pub async fn fetch_recent_trades(&self, symbol: &Symbol, limit: usize) -> RestResult<Vec<Trade>> {
        let limit = limit.clamp(1, MAX_TRADE_LIMIT);
        let url = format!("{}/trades", self.base_url);
        let limit_param = limit.to_string();
        info!(%symbol, limit, "Fetching trade snapshot");

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str()), ("limit", limit_param.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let raw: Vec<RawRestTrade> =
            serde_json::from_str(&body).map_err(|e| RestError::Decode(e.to_string()))?;
        let trades = raw
            .into_iter()
            .map(RawRestTrade::into_trade)
            .collect::<RestResult<Vec<_>>>()?;

        debug!(%symbol, count = trades.len(), "Trade snapshot received");
        Ok(trades)
    }
}
