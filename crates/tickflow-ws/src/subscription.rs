//! Stream subscription for one (symbol, interval) pair.
//!
//! All four feeds are requested in the connection URL of a combined stream,
//! so one physical connection carries the whole subscription and no
//! subscribe messages are sent after the handshake.

use tickflow_core::{FeedKind, Interval, Symbol};

/// Subscription parameters captured when a session starts connecting.
///
/// Cloned into the connection task, so reconnects always reuse the
/// parameters the session was opened with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamSubscription {
    symbol: Symbol,
    interval: Interval,
}

impl StreamSubscription {
    pub fn new(symbol: Symbol, interval: Interval) -> Self {
        Self { symbol, interval }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    /// Stream names in feed order: trade, ticker, depth, kline.
    pub fn stream_names(&self) -> Vec<String> {
        FeedKind::ALL
            .iter()
            .map(|kind| kind.stream_name(&self.symbol, &self.interval))
            .collect()
    }

    /// Combined stream URL for this subscription.
    ///
    /// `base_url` is the stream endpoint without path,
    /// e.g. `wss://stream.binance.com:9443`.
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/stream?streams={}",
            base_url.trim_end_matches('/'),
            self.stream_names().join("/")
        )
    }
}

impl std::fmt::Display for StreamSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.symbol, self.interval)
    }
}
