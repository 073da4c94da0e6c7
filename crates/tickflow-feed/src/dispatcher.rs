//! Routes decoded frames of one subscription into the cache store.

use crate::error::FeedResult;
use crate::normalizer;
use crate::store::{CacheStore, TypedKey};
use crate::wire::{self, FeedMessage, FeedUpdate};
use chrono::Utc;
use std::sync::Arc;
use tickflow_core::{
    CandleSeries, FeedKind, Interval, OrderBookSnapshot, Symbol, TickerSnapshot, Trade,
    TradeWindow,
};
use tracing::{debug, trace};

/// Store keys written by one (symbol, interval) subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedKeys {
    pub trades: TypedKey<TradeWindow>,
    pub ticker: TypedKey<TickerSnapshot>,
    pub order_book: TypedKey<OrderBookSnapshot>,
    pub candles: TypedKey<CandleSeries>,
}

impl FeedKeys {
    pub fn new(symbol: &Symbol, interval: &Interval) -> Self {
        Self {
            trades: TypedKey::trades(symbol.clone()),
            ticker: TypedKey::ticker(symbol.clone()),
            order_book: TypedKey::order_book(symbol.clone()),
            candles: TypedKey::candles(symbol.clone(), interval.clone()),
        }
    }
}

/// What happened to a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Written to the store.
    Applied(FeedKind),
    /// Depth update with too few levels; the previous book is kept.
    DroppedIncompleteDepth { bids: usize, asks: usize },
    /// Unhandled event type.
    Ignored(String),
    /// Payload names a different symbol.
    ForeignSymbol(String),
}

impl DispatchOutcome {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied(kind) => kind.label(),
            Self::DroppedIncompleteDepth { .. } => "incomplete_depth",
            Self::Ignored(_) => "unknown_event",
            Self::ForeignSymbol(_) => "foreign_symbol",
        }
    }
}

/// Feed dispatcher for one subscription.
#[derive(Debug, Clone)]
pub struct FeedDispatcher {
    store: Arc<CacheStore>,
    symbol: Symbol,
    interval: Interval,
    keys: FeedKeys,
}

impl FeedDispatcher {
    pub fn new(store: Arc<CacheStore>, symbol: Symbol, interval: Interval) -> Self {
        let keys = FeedKeys::new(&symbol, &interval);
        Self {
            store,
            symbol,
            interval,
            keys,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn keys(&self) -> &FeedKeys {
        &self.keys
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Decode a frame without touching the store.
    pub fn decode(&self, text: &str) -> FeedResult<FeedMessage> {
        wire::decode(text, Utc::now())
    }

    /// False for payloads that name another symbol.
    pub fn accepts(&self, message: &FeedMessage) -> bool {
        message
            .symbol
            .as_deref()
            .map_or(true, |s| self.symbol.matches(s))
    }

    /// Apply a decoded frame to the store.
    pub fn apply(&self, message: FeedMessage) -> DispatchOutcome {
        if !self.accepts(&message) {
            let foreign = message.symbol.unwrap_or_default();
            debug!(expected = %self.symbol, got = %foreign, "Ignoring frame for foreign symbol");
            return DispatchOutcome::ForeignSymbol(foreign);
        }

        match message.update {
            FeedUpdate::Trade(trade) => {
                self.store
                    .set(&self.keys.trades, |prev| normalizer::apply_trade(prev, trade));
                DispatchOutcome::Applied(FeedKind::Trade)
            }
            FeedUpdate::Ticker(ticker) => {
                self.store
                    .set(&self.keys.ticker, |prev| normalizer::apply_ticker(prev, ticker));
                DispatchOutcome::Applied(FeedKind::Ticker)
            }
            FeedUpdate::Depth(update) => {
                let (bids, asks) = (update.bids.len(), update.asks.len());
                match normalizer::depth_snapshot(update) {
                    Ok(book) => {
                        self.store.set(&self.keys.order_book, |_| book);
                        DispatchOutcome::Applied(FeedKind::Depth)
                    }
                    Err(_) => {
                        debug!(bids, asks, "Dropping incomplete depth update");
                        DispatchOutcome::DroppedIncompleteDepth { bids, asks }
                    }
                }
            }
            FeedUpdate::Kline(candle) => {
                self.store
                    .set(&self.keys.candles, |prev| normalizer::apply_kline(prev, candle));
                DispatchOutcome::Applied(FeedKind::Kline)
            }
            FeedUpdate::Unknown(event_type) => {
                debug!(event_type = %event_type, stream = ?message.stream, "Ignoring unknown event");
                DispatchOutcome::Ignored(event_type)
            }
        }
    }

    /// Decode and apply. Only malformed frames are errors.
    pub fn dispatch(&self, text: &str) -> FeedResult<DispatchOutcome> {
        let message = self.decode(text)?;
        let outcome = self.apply(message);
        trace!(outcome = outcome.label(), "Frame dispatched");
        Ok(outcome)
    }

    /// Replace the trade window with a snapshot followed by `pending`.
    pub fn seed_trades(&self, snapshot: Vec<Trade>, pending: Vec<Trade>) {
        let (seeded, held) = (snapshot.len(), pending.len());
        self.store.set(&self.keys.trades, |_| {
            normalizer::apply_trades(None, snapshot.into_iter().chain(pending))
        });
        debug!(symbol = %self.symbol, seeded, held, "Trade window seeded");
    }
}
