//! Core market data types for tickflow.
//!
//! This crate provides the value types shared by every other crate:
//! - `Symbol`, `Interval`: subscription parameters
//! - `FeedKind`: the logical sub-streams multiplexed over one connection
//! - `Price`, `Size`: precision-safe numeric types
//! - `Trade`, `TickerSnapshot`, `OrderBookSnapshot`, `Candle` and the bounded
//!   containers (`TradeWindow`, `CandleSeries`) the cache stores

pub mod decimal;
pub mod error;
pub mod market;
pub mod types;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::{FeedKind, Interval, Symbol};
pub use types::{
    Candle, CandleSeries, CandleUpdate, OrderBookSnapshot, PriceLevel, TickerSnapshot, Trade,
    TradeWindow, CANDLE_SERIES_CAPACITY, ORDER_BOOK_DEPTH, TRADE_WINDOW_CAPACITY,
};
