//! Bounded market data cache.
//!
//! One entry per key, written through caller-supplied updaters so the merge
//! policy stays with the feed that owns the key. Every write stamps the
//! entry and notifies the key's subscribers once the write is complete.
//!
//! The store is an explicit instance shared through `Arc`; it never awaits
//! and never removes entries on its own. Freshness is judged on read.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tickflow_core::{CandleSeries, Interval, OrderBookSnapshot, Symbol, TickerSnapshot, TradeWindow};

/// Staleness thresholds for cached entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Age after which a value is stale but still usable.
    pub stale_after: Duration,
    /// Age after which a value should be treated as missing.
    pub expire_after: Duration,
}

impl CachePolicy {
    /// Live market data.
    pub const REALTIME: Self = Self {
        stale_after: Duration::from_millis(200),
        expire_after: Duration::from_millis(1000),
    };

    /// Slow-moving reference data.
    pub const GENERAL: Self = Self {
        stale_after: Duration::from_secs(10),
        expire_after: Duration::from_secs(120),
    };

    pub fn new(stale_after: Duration, expire_after: Duration) -> Self {
        Self {
            stale_after,
            expire_after,
        }
    }

    pub fn classify(&self, age: Duration) -> Freshness {
        if age <= self.stale_after {
            Freshness::Fresh
        } else if age <= self.expire_after {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::REALTIME
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

impl Freshness {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Untyped cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Trades(Symbol),
    Ticker(Symbol),
    OrderBook(Symbol),
    Candles(Symbol, Interval),
}

impl CacheKey {
    pub fn symbol(&self) -> &Symbol {
        match self {
            Self::Trades(s) | Self::Ticker(s) | Self::OrderBook(s) | Self::Candles(s, _) => s,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trades(s) => write!(f, "trades:{s}"),
            Self::Ticker(s) => write!(f, "ticker:{s}"),
            Self::OrderBook(s) => write!(f, "orderbook:{s}"),
            Self::Candles(s, i) => write!(f, "candles:{s}:{i}"),
        }
    }
}

/// Cache key bound to the value type it stores.
pub struct TypedKey<T> {
    key: CacheKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedKey<T> {
    fn new(key: CacheKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    pub fn raw(&self) -> &CacheKey {
        &self.key
    }
}

impl TypedKey<TradeWindow> {
    pub fn trades(symbol: Symbol) -> Self {
        Self::new(CacheKey::Trades(symbol))
    }
}

impl TypedKey<TickerSnapshot> {
    pub fn ticker(symbol: Symbol) -> Self {
        Self::new(CacheKey::Ticker(symbol))
    }
}

impl TypedKey<OrderBookSnapshot> {
    pub fn order_book(symbol: Symbol) -> Self {
        Self::new(CacheKey::OrderBook(symbol))
    }
}

impl TypedKey<CandleSeries> {
    pub fn candles(symbol: Symbol, interval: Interval) -> Self {
        Self::new(CacheKey::Candles(symbol, interval))
    }
}

impl<T> Clone for TypedKey<T> {
    fn clone(&self) -> Self {
        Self::new(self.key.clone())
    }
}

impl<T> fmt::Debug for TypedKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedKey({})", self.key)
    }
}

impl<T> PartialEq for TypedKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for TypedKey<T> {}

/// Stored value, one variant per key kind.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Trades(TradeWindow),
    Ticker(TickerSnapshot),
    OrderBook(OrderBookSnapshot),
    Candles(CandleSeries),
}

/// A value type that can live in the store.
pub trait CacheValue: Clone + Send + Sync + 'static {
    fn into_cached(self) -> CachedValue;
    fn from_cached(value: &CachedValue) -> Option<&Self>;
}

macro_rules! impl_cache_value {
    ($ty:ty, $variant:ident) => {
        impl CacheValue for $ty {
            fn into_cached(self) -> CachedValue {
                CachedValue::$variant(self)
            }

            fn from_cached(value: &CachedValue) -> Option<&Self> {
                match value {
                    CachedValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_cache_value!(TradeWindow, Trades);
impl_cache_value!(TickerSnapshot, Ticker);
impl_cache_value!(OrderBookSnapshot, OrderBook);
impl_cache_value!(CandleSeries, Candles);

#[derive(Debug, Clone)]
struct Slot {
    value: CachedValue,
    last_written_at: Instant,
    written_at: DateTime<Utc>,
    version: u64,
}

impl Slot {
    fn new(value: CachedValue) -> Self {
        Self {
            value,
            last_written_at: Instant::now(),
            written_at: Utc::now(),
            version: 1,
        }
    }

    fn replace(&mut self, value: CachedValue) {
        self.value = value;
        self.last_written_at = Instant::now();
        self.written_at = Utc::now();
        self.version += 1;
    }
}

/// Read-only snapshot of a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    /// Monotonic time of the last write.
    pub last_written_at: Instant,
    /// Wall-clock time of the last write.
    pub written_at: DateTime<Utc>,
    pub stale_after: Duration,
    pub expire_after: Duration,
    /// Write counter for this key, starting at 1.
    pub version: u64,
}

impl<T: CacheValue> CacheEntry<T> {
    fn from_slot(slot: &Slot, policy: CachePolicy) -> Option<Self> {
        Some(Self {
            value: T::from_cached(&slot.value)?.clone(),
            last_written_at: slot.last_written_at,
            written_at: slot.written_at,
            stale_after: policy.stale_after,
            expire_after: policy.expire_after,
            version: slot.version,
        })
    }
}

impl<T> CacheEntry<T> {
    pub fn age(&self) -> Duration {
        self.last_written_at.elapsed()
    }

    pub fn freshness(&self) -> Freshness {
        CachePolicy::new(self.stale_after, self.expire_after).classify(self.age())
    }

    pub fn is_stale(&self) -> bool {
        self.freshness() != Freshness::Fresh
    }

    pub fn is_expired(&self) -> bool {
        self.freshness() == Freshness::Expired
    }
}

/// Handle returned by `CacheStore::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&Slot) + Send + Sync>;

/// Subscribers of one key plus the last version delivered to them.
#[derive(Default)]
struct KeyListeners {
    list: Vec<(SubscriptionId, Listener)>,
    delivered: Arc<Mutex<u64>>,
}

/// Keyed market data cache.
pub struct CacheStore {
    slots: DashMap<CacheKey, Slot>,
    policy: CachePolicy,
    listeners: RwLock<HashMap<CacheKey, KeyListeners>>,
    next_subscription: AtomicU64,
}

impl CacheStore {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            slots: DashMap::new(),
            policy,
            listeners: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Current entry for `key`, regardless of age.
    pub fn get<T: CacheValue>(&self, key: &TypedKey<T>) -> Option<CacheEntry<T>> {
        let slot = self.slots.get(key.raw())?;
        CacheEntry::from_slot(&slot, self.policy)
    }

    /// Current value unless it has expired.
    pub fn get_fresh<T: CacheValue>(&self, key: &TypedKey<T>) -> Option<T> {
        self.get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value)
    }

    /// Replace the value with `updater(previous)`.
    pub fn set<T, F>(&self, key: &TypedKey<T>, updater: F)
    where
        T: CacheValue,
        F: FnOnce(Option<&T>) -> T,
    {
        self.update(key, |prev| Some(updater(prev)));
    }

    /// Replace the value unless `updater` returns `None`.
    ///
    /// Returns whether a write happened. A skipped write leaves the entry
    /// and its timestamps untouched and notifies nobody.
    pub fn update<T, F>(&self, key: &TypedKey<T>, updater: F) -> bool
    where
        T: CacheValue,
        F: FnOnce(Option<&T>) -> Option<T>,
    {
        let notify = self.has_listeners(key.raw());

        // The entry guard holds the shard lock for the whole read-modify-write.
        let written = match self.slots.entry(key.raw().clone()) {
            Entry::Occupied(mut occupied) => {
                let Some(next) = updater(T::from_cached(&occupied.get().value)) else {
                    return false;
                };
                let slot = occupied.get_mut();
                slot.replace(next.into_cached());
                notify.then(|| slot.clone())
            }
            Entry::Vacant(vacant) => {
                let Some(next) = updater(None) else {
                    return false;
                };
                let slot = vacant.insert(Slot::new(next.into_cached()));
                notify.then(|| slot.clone())
            }
        };

        if let Some(slot) = written {
            self.notify(key.raw(), &slot);
        }
        true
    }

    /// Register a callback invoked after every write to `key`.
    ///
    /// Callbacks run on the writer's thread, outside the entry lock, so they
    /// may read the store again. Deliveries for one key are serialized and
    /// never go backwards: under concurrent writers a callback may skip a
    /// version but never sees an older one after a newer one. A callback
    /// must not write the key it observes.
    pub fn subscribe<T, F>(&self, key: &TypedKey<T>, callback: F) -> SubscriptionId
    where
        T: CacheValue,
        F: Fn(&CacheEntry<T>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let policy = self.policy;
        let listener: Listener = Arc::new(move |slot: &Slot| {
            if let Some(entry) = CacheEntry::<T>::from_slot(slot, policy) {
                callback(&entry);
            }
        });
        self.listeners
            .write()
            .entry(key.raw().clone())
            .or_default()
            .list
            .push((id, listener));
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let mut found = false;
        listeners.retain(|_, key_listeners| {
            let list = &mut key_listeners.list;
            let before = list.len();
            list.retain(|(sub, _)| *sub != id);
            found |= list.len() != before;
            !list.is_empty()
        });
        found
    }

    pub fn contains<T: CacheValue>(&self, key: &TypedKey<T>) -> bool {
        self.slots.contains_key(key.raw())
    }

    /// Number of populated keys.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn has_listeners(&self, key: &CacheKey) -> bool {
        self.listeners.read().contains_key(key)
    }

    fn notify(&self, key: &CacheKey, slot: &Slot) {
        let (listeners, delivered): (Vec<Listener>, _) = match self.listeners.read().get(key) {
            Some(entry) => (
                entry.list.iter().map(|(_, l)| l.clone()).collect(),
                entry.delivered.clone(),
            ),
            None => return,
        };

        // Writers release the entry lock before notifying, so a newer
        // version can get here first.
        let mut delivered = delivered.lock();
        if slot.version <= *delivered {
            return;
        }
        *delivered = slot.version;
        for listener in listeners {
            listener(slot);
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.slots.len())
            .field("policy", &self.policy)
            .finish()
    }
}
