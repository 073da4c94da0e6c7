//! Liveness monitoring for market stream connections.
//!
//! The server pushes data continuously while a subscription is healthy. When
//! the stream goes quiet for `interval` a WebSocket ping is sent; if neither
//! a pong nor any other frame arrives within `timeout`, the connection is
//! considered dead.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct HeartbeatState {
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
    last_message: Instant,
    waiting_for_pong: bool,
}

/// Heartbeat manager for one connection.
#[derive(Debug)]
pub struct HeartbeatManager {
    /// Silence after which a ping is sent.
    interval: Duration,
    /// How long to wait for any traffic after a ping.
    timeout: Duration,
    state: Mutex<HeartbeatState>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
            state: Mutex::new(HeartbeatState {
                last_ping: None,
                last_pong: None,
                last_message: Instant::now(),
                waiting_for_pong: false,
            }),
        }
    }

    /// Reset heartbeat state (called on every new connection).
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.last_ping = None;
        state.last_pong = None;
        state.last_message = Instant::now();
        state.waiting_for_pong = false;
    }

    pub fn record_ping(&self) {
        let mut state = self.state.lock();
        state.last_ping = Some(Instant::now());
        state.waiting_for_pong = true;
    }

    pub fn record_pong(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        if let Some(ping) = state.last_ping {
            debug!(rtt_ms = (now - ping).as_millis() as u64, "Received pong");
        }
        state.last_pong = Some(now);
        state.last_message = now;
        state.waiting_for_pong = false;
    }

    /// Any inbound frame proves the connection is alive.
    pub fn record_message(&self) {
        let mut state = self.state.lock();
        state.last_message = Instant::now();
        state.waiting_for_pong = false;
    }

    /// True when a ping went unanswered for longer than the timeout.
    pub fn is_timed_out(&self) -> bool {
        let state = self.state.lock();
        match (state.waiting_for_pong, state.last_ping) {
            (true, Some(ping)) => ping.elapsed() > self.timeout,
            _ => false,
        }
    }

    /// True when the stream has been silent for a full interval.
    pub fn should_send_ping(&self) -> bool {
        let state = self.state.lock();
        !state.waiting_for_pong && state.last_message.elapsed() >= self.interval
    }

    /// How often the connection loop should evaluate the heartbeat.
    pub fn check_period(&self) -> Duration {
        (self.interval.min(self.timeout) / 2).max(Duration::from_millis(10))
    }

    pub fn stats(&self) -> HeartbeatStats {
        let state = self.state.lock();
        HeartbeatStats {
            since_last_message: state.last_message.elapsed(),
            since_last_pong: state.last_pong.map(|t| t.elapsed()),
            waiting_for_pong: state.waiting_for_pong,
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub since_last_message: Duration,
    pub since_last_pong: Option<Duration>,
    pub waiting_for_pong: bool,
}
