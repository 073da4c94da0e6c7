//! Market data value types and their bounded containers.
//!
//! Containers enforce their own capacity; how an update is merged into the
//! previous value is decided by the feed normalizer, not here.

use crate::{Price, Size, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of trades kept per symbol.
pub const TRADE_WINDOW_CAPACITY: usize = 100;

/// Number of price levels kept per order book side.
pub const ORDER_BOOK_DEPTH: usize = 17;

/// Maximum number of candles kept per (symbol, interval).
pub const CANDLE_SERIES_CAPACITY: usize = 200;

/// Executed public trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub price: Price,
    pub quantity: Size,
    /// Exchange trade time.
    pub timestamp: DateTime<Utc>,
    /// True when the buyer was the resting (maker) side, i.e. a sell aggressor.
    pub is_buyer_maker: bool,
}

impl Trade {
    pub fn new(price: Price, quantity: Size, timestamp: DateTime<Utc>, is_buyer_maker: bool) -> Self {
        Self {
            price,
            quantity,
            timestamp,
            is_buyer_maker,
        }
    }
}

/// Sliding window of the most recent trades, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TradeWindow {
    trades: VecDeque<Trade>,
}

impl TradeWindow {
    pub fn new() -> Self {
        Self {
            trades: VecDeque::with_capacity(TRADE_WINDOW_CAPACITY),
        }
    }

    /// Build a window from trades in arrival order, keeping the newest.
    pub fn from_trades(trades: impl IntoIterator<Item = Trade>) -> Self {
        let mut window = Self::new();
        for trade in trades {
            window.push(trade);
        }
        window
    }

    /// Append a trade, evicting the oldest on overflow.
    pub fn push(&mut self, trade: Trade) {
        if self.trades.len() == TRADE_WINDOW_CAPACITY {
            self.trades.pop_front();
        }
        self.trades.push_back(trade);
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Trade> + ExactSizeIterator {
        self.trades.iter()
    }

    pub fn latest(&self) -> Option<&Trade> {
        self.trades.back()
    }

    pub fn oldest(&self) -> Option<&Trade> {
        self.trades.front()
    }
}

/// One order book level as sent by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub quantity: Size,
}

impl PriceLevel {
    pub fn new(price: Price, quantity: Size) -> Self {
        Self { price, quantity }
    }
}

/// Top-of-book snapshot, replaced as a whole on every complete update.
///
/// Level order is the feed's order; it is not re-sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl OrderBookSnapshot {
    /// Build a snapshot from a depth update.
    ///
    /// Returns `None` unless both sides carry at least `ORDER_BOOK_DEPTH`
    /// levels; longer sides are truncated to the first `ORDER_BOOK_DEPTH`.
    pub fn from_levels(mut bids: Vec<PriceLevel>, mut asks: Vec<PriceLevel>) -> Option<Self> {
        if bids.len() < ORDER_BOOK_DEPTH || asks.len() < ORDER_BOOK_DEPTH {
            return None;
        }
        bids.truncate(ORDER_BOOK_DEPTH);
        asks.truncate(ORDER_BOOK_DEPTH);
        Some(Self { bids, asks })
    }

    /// Highest bid with non-zero quantity.
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .filter(|level| !level.quantity.is_zero())
            .max_by_key(|level| level.price)
            .copied()
    }

    /// Lowest ask with non-zero quantity.
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks
            .iter()
            .filter(|level| !level.quantity.is_zero())
            .min_by_key(|level| level.price)
            .copied()
    }

    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }
}

/// Rolling 24h statistics for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub symbol: Symbol,
    pub last_price: Price,
    pub price_change: Price,
    pub price_change_percent: Price,
    pub high_price: Price,
    pub low_price: Price,
    /// Base asset volume.
    pub volume: Size,
    /// Quote asset volume.
    pub quote_volume: Size,
    /// Local receive time of the update.
    pub observed_at: DateTime<Utc>,
}

/// OHLC candle keyed by its open time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
}

/// How a candle landed in a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleUpdate {
    /// Same open time as the last candle: the forming candle was replaced.
    Replaced,
    /// New open time: appended (and the oldest evicted on overflow).
    Appended,
}

/// Candle history for one (symbol, interval), oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CandleSeries {
    candles: VecDeque<Candle>,
}

impl CandleSeries {
    pub fn new() -> Self {
        Self {
            candles: VecDeque::with_capacity(CANDLE_SERIES_CAPACITY),
        }
    }

    /// Insert a candle, deduplicating on the last candle's open time.
    pub fn upsert(&mut self, candle: Candle) -> CandleUpdate {
        if let Some(last) = self.candles.back_mut() {
            if last.open_time == candle.open_time {
                *last = candle;
                return CandleUpdate::Replaced;
            }
        }
        if self.candles.len() == CANDLE_SERIES_CAPACITY {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
        CandleUpdate::Appended
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Candle> + ExactSizeIterator {
        self.candles.iter()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }
}
