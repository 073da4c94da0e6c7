//! Merge policies, one per feed.
//!
//! Each function takes the value currently cached (if any) and a decoded
//! update and returns the value to store. They are pure and total; the
//! containers in `tickflow_core` enforce capacity.

use crate::error::{FeedError, FeedResult};
use crate::wire::DepthUpdate;
use tickflow_core::{
    Candle, CandleSeries, OrderBookSnapshot, TickerSnapshot, Trade, TradeWindow,
    ORDER_BOOK_DEPTH,
};

/// Sliding window: append, evicting the oldest trade past capacity.
pub fn apply_trade(prev: Option<&TradeWindow>, trade: Trade) -> TradeWindow {
    let mut window = prev.cloned().unwrap_or_default();
    window.push(trade);
    window
}

/// Append a batch in order.
pub fn apply_trades(
    prev: Option<&TradeWindow>,
    trades: impl IntoIterator<Item = Trade>,
) -> TradeWindow {
    let mut window = prev.cloned().unwrap_or_default();
    for trade in trades {
        window.push(trade);
    }
    window
}

/// Singleton: the latest ticker replaces the previous one.
pub fn apply_ticker(_prev: Option<&TickerSnapshot>, ticker: TickerSnapshot) -> TickerSnapshot {
    ticker
}

/// Top-of-book snapshot from a depth update, if it is complete.
pub fn depth_snapshot(update: DepthUpdate) -> FeedResult<OrderBookSnapshot> {
    let (bids, asks) = (update.bids.len(), update.asks.len());
    OrderBookSnapshot::from_levels(update.bids, update.asks)
        .ok_or(FeedError::IncompleteDepthUpdate { bids, asks })
}

/// Whole-value replace; an incomplete update keeps the previous book.
pub fn apply_depth(prev: Option<&OrderBookSnapshot>, update: DepthUpdate) -> OrderBookSnapshot {
    depth_snapshot(update).unwrap_or_else(|_| prev.cloned().unwrap_or_default())
}

/// Dedup on the forming candle's open time, otherwise append.
pub fn apply_kline(prev: Option<&CandleSeries>, candle: Candle) -> CandleSeries {
    let mut series = prev.cloned().unwrap_or_default();
    series.upsert(candle);
    series
}

/// True when both sides carry enough levels to replace the book.
pub fn is_complete_depth(update: &DepthUpdate) -> bool {
    update.bids.len() >= ORDER_BOOK_DEPTH && update.asks.len() >= ORDER_BOOK_DEPTH
}
