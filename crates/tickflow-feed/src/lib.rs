//! Market feed handling for tickflow.
//!
//! Raw stream frames are decoded into typed updates (`wire`), merged into
//! their previous values (`normalizer`) and written to a bounded, observable
//! cache (`store`). `dispatcher` ties the three together for one
//! (symbol, interval) subscription.

pub mod dispatcher;
pub mod error;
pub mod normalizer;
pub mod store;
pub mod wire;

pub use dispatcher::{DispatchOutcome, FeedDispatcher, FeedKeys};
pub use error::{FeedError, FeedResult};
pub use store::{
    CachePolicy, CacheEntry, CacheKey, CacheStore, CacheValue, CachedValue, Freshness,
    SubscriptionId, TypedKey,
};
pub use wire::{DepthUpdate, FeedMessage, FeedUpdate};
