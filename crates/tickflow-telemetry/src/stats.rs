//! Feed statistics read back from the metrics registry.
//!
//! Used for the periodic summary log line; counters are cumulative since
//! process start.

use crate::metrics::{
    FRAMES_DROPPED_TOTAL, FRAMES_TOTAL, FRAME_PROCESSING_US, SNAPSHOT_FETCH_TOTAL,
    WS_RECONNECT_TOTAL,
};
use prometheus::core::Collector;
use prometheus::CounterVec;
use std::time::Instant;
use tracing::info;

const FEED_KINDS: [&str; 4] = ["trade", "ticker", "depth", "kline"];
const DROP_REASONS: [&str; 5] = [
    "malformed",
    "incomplete_depth",
    "unknown_event",
    "foreign_symbol",
    "stale_epoch",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedStats {
    pub trades: u64,
    pub tickers: u64,
    pub depth_updates: u64,
    pub klines: u64,
    pub dropped: u64,
    pub malformed: u64,
    pub reconnects: u64,
    pub snapshot_failures: u64,
    pub processing_p50_us: f64,
    pub processing_p99_us: f64,
}

impl FeedStats {
    pub fn applied(&self) -> u64 {
        self.trades + self.tickers + self.depth_updates + self.klines
    }
}

/// Builds `FeedStats` snapshots and logs them.
pub struct FeedStatsReporter {
    started_at: Instant,
}

impl FeedStatsReporter {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> FeedStats {
        let [trades, tickers, depth_updates, klines] =
            FEED_KINDS.map(|kind| counter_value(&FRAMES_TOTAL, &[kind]));
        let (processing_p50_us, processing_p99_us) = processing_percentiles();

        FeedStats {
            trades,
            tickers,
            depth_updates,
            klines,
            dropped: DROP_REASONS
                .iter()
                .map(|reason| counter_value(&FRAMES_DROPPED_TOTAL, &[reason]))
                .sum(),
            malformed: counter_value(&FRAMES_DROPPED_TOTAL, &["malformed"]),
            reconnects: counter_total(&WS_RECONNECT_TOTAL),
            snapshot_failures: counter_value(&SNAPSHOT_FETCH_TOTAL, &["error"]),
            processing_p50_us,
            processing_p99_us,
        }
    }

    pub fn log_summary(&self) -> FeedStats {
        let stats = self.snapshot();
        info!(
            uptime_secs = self.started_at.elapsed().as_secs(),
            applied = stats.applied(),
            trades = stats.trades,
            tickers = stats.tickers,
            depth = stats.depth_updates,
            klines = stats.klines,
            dropped = stats.dropped,
            malformed = stats.malformed,
            reconnects = stats.reconnects,
            snapshot_failures = stats.snapshot_failures,
            p50_us = stats.processing_p50_us,
            p99_us = stats.processing_p99_us,
            "Feed statistics"
        );
        stats
    }
}

impl Default for FeedStatsReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn counter_value(counter: &CounterVec, labels: &[&str]) -> u64 {
    counter.with_label_values(labels).get() as u64
}

/// Sum across every label combination seen so far.
fn counter_total(counter: &CounterVec) -> u64 {
    counter
        .collect()
        .iter()
        .flat_map(|mf| mf.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

fn processing_percentiles() -> (f64, f64) {
    for mf in FRAME_PROCESSING_US.collect() {
        if let Some(m) = mf.get_metric().first() {
            let h = m.get_histogram();
            let count = h.get_sample_count();
            if count == 0 {
                return (0.0, 0.0);
            }
            let buckets = h.get_bucket();
            return (
                percentile_from_buckets(buckets, count, 0.50),
                percentile_from_buckets(buckets, count, 0.99),
            );
        }
    }
    (0.0, 0.0)
}

/// Linear interpolation within the bucket holding the target rank.
fn percentile_from_buckets(
    buckets: &[prometheus::proto::Bucket],
    total_count: u64,
    percentile: f64,
) -> f64 {
    let target = ((total_count as f64 * percentile).ceil() as u64).max(1);
    let mut prev_bound = 0.0;
    let mut prev_count = 0u64;

    for bucket in buckets {
        let upper_bound = bucket.get_upper_bound();
        let cumulative_count = bucket.get_cumulative_count();

        if cumulative_count >= target {
            let bucket_count = cumulative_count - prev_count;
            if bucket_count == 0 {
                return upper_bound;
            }
            let position = (target - prev_count) as f64 / bucket_count as f64;
            return prev_bound + position * (upper_bound - prev_bound);
        }

        prev_bound = upper_bound;
        prev_count = cumulative_count;
    }

    buckets.last().map(|b| b.get_upper_bound()).unwrap_or(0.0)
}
