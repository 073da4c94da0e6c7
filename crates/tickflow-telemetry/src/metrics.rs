//! Prometheus metrics for tickflow.
//!
//! Covers:
//! - Connection state and reconnects
//! - Session lifecycle state
//! - Frame throughput, drops and processing time
//! - Snapshot fetches and reported errors
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure there means a duplicate
//! metric name, which is a programming error caught on first use; it never
//! happens at steady state.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram, register_int_gauge,
    CounterVec, Encoder, GaugeVec, Histogram, IntGauge, TextEncoder,
};

/// Session state labels, one gauge series each.
pub const SESSION_STATES: [&str; 6] = [
    "idle",
    "connecting",
    "open",
    "reconnecting",
    "closing",
    "closed",
];

/// Market stream connection state (1 = open).
pub static WS_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "tickflow_ws_connected",
        "Market stream connection state (1=open)"
    )
    .unwrap()
});

/// Session lifecycle state.
/// Labels: state (idle/connecting/open/reconnecting/closing/closed)
pub static SESSION_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "tickflow_session_state",
        "Session lifecycle current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Unexpected disconnects that led to a reconnect attempt.
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickflow_ws_reconnect_total",
        "Total market stream reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Frames applied to the cache, by feed.
pub static FRAMES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickflow_frames_total",
        "Total frames applied to the cache",
        &["kind"]
    )
    .unwrap()
});

/// Frames that did not reach the cache.
/// Labels: reason (malformed/incomplete_depth/unknown_event/foreign_symbol/stale_epoch)
pub static FRAMES_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickflow_frames_dropped_total",
        "Total frames not applied to the cache",
        &["reason"]
    )
    .unwrap()
});

/// Trade snapshot fetches.
/// Labels: outcome (ok/error)
pub static SNAPSHOT_FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickflow_snapshot_fetch_total",
        "Total trade snapshot fetches",
        &["outcome"]
    )
    .unwrap()
});

/// Errors passed to the error reporter.
pub static ERRORS_REPORTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickflow_errors_reported_total",
        "Total errors surfaced to the error reporter",
        &["kind"]
    )
    .unwrap()
});

/// Time from frame receipt to cache write, in microseconds.
pub static FRAME_PROCESSING_US: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "tickflow_frame_processing_us",
        "Frame decode and dispatch time in microseconds",
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn ws_connected() {
        WS_CONNECTED.set(1);
    }

    pub fn ws_disconnected() {
        WS_CONNECTED.set(0);
    }

    /// Set the active session state; all others go to 0.
    pub fn session_state_set(state: &str) {
        for s in SESSION_STATES {
            SESSION_STATE.with_label_values(&[s]).set(0.0);
        }
        SESSION_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn frame_applied(kind: &str) {
        FRAMES_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn frame_dropped(reason: &str) {
        FRAMES_DROPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn snapshot_fetch(outcome: &str) {
        SNAPSHOT_FETCH_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn error_reported(kind: &str) {
        ERRORS_REPORTED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn frame_processing(micros: f64) {
        FRAME_PROCESSING_US.observe(micros);
    }

    /// Text exposition of every registered metric.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
