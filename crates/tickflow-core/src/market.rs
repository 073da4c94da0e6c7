//! Subscription parameters and feed kinds.
//!
//! A session is identified by a trading pair (`Symbol`) and a candle
//! `Interval`. The four `FeedKind`s are the logical sub-streams that share a
//! single physical connection.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading pair symbol (e.g., "BTCUSDT").
///
/// Stored upper-cased, which is how the REST API and the `s` field of
/// stream payloads spell it. Stream names use the lower-cased form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, normalizing case and surrounding whitespace.
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidSymbol(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form used to build stream names.
    pub fn stream_prefix(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Case-insensitive comparison against a symbol as spelled by the feed.
    pub fn matches(&self, raw: &str) -> bool {
        self.0.eq_ignore_ascii_case(raw)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Candle interval token (e.g., "1m", "1h", "1d").
///
/// The exchange decides which tokens exist; an unsupported token is a caller
/// error that surfaces as a stream that never delivers klines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Interval(String);

impl Interval {
    /// Intervals the exchange documents for kline streams.
    pub const KNOWN: &'static [&'static str] = &[
        "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d",
        "1w", "1M",
    ];

    /// Create an interval. Only emptiness is rejected.
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidInterval(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        Self::KNOWN.contains(&self.0.as_str())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical feed multiplexed over the market stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Trade,
    Ticker,
    Depth,
    Kline,
}

impl FeedKind {
    pub const ALL: [FeedKind; 4] = [Self::Trade, Self::Ticker, Self::Depth, Self::Kline];

    /// Event type (`e` field) carried by payloads of this feed.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Ticker => "24hrTicker",
            Self::Depth => "depthUpdate",
            Self::Kline => "kline",
        }
    }

    /// Classify an event type. Unknown event types return `None`.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_type() == event_type)
    }

    /// Stream name for this feed, e.g. `btcusdt@kline_1h`.
    pub fn stream_name(&self, symbol: &Symbol, interval: &Interval) -> String {
        let prefix = symbol.stream_prefix();
        match self {
            Self::Trade => format!("{prefix}@trade"),
            Self::Ticker => format!("{prefix}@ticker"),
            Self::Depth => format!("{prefix}@depth"),
            Self::Kline => format!("{prefix}@kline_{interval}"),
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Ticker => "ticker",
            Self::Depth => "depth",
            Self::Kline => "kline",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
