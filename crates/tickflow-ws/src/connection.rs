//! Market stream connection manager.
//!
//! Owns exactly one physical connection at a time. Handles the connection
//! lifecycle, automatic reconnection with capped exponential backoff and
//! cancellation-aware teardown. The URL is fixed at construction, so every
//! reconnect resubscribes to the same streams.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::WsEvent;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Upper bound for reconnect jitter.
const MAX_JITTER_MS: u64 = 1000;

/// How long a graceful close may take before the socket is dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Full combined stream URL.
    pub url: String,
    /// Maximum consecutive failed attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Silence after which a ping is sent.
    pub heartbeat_interval_ms: u64,
    /// Time allowed for traffic to resume after a ping.
    pub heartbeat_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 0, // Infinite
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 30_000,
            heartbeat_interval_ms: 20_000,
            heartbeat_timeout_ms: 10_000,
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Closing,
    Closed,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 6] = [
        Self::Idle,
        Self::Connecting,
        Self::Open,
        Self::Reconnecting,
        Self::Closing,
        Self::Closed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// WebSocket connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    heartbeat: HeartbeatManager,
    events: mpsc::Sender<WsEvent>,
    /// Consecutive failed attempts since the last successful handshake.
    reconnect_count: AtomicU32,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    /// Create a new connection manager.
    ///
    /// `state` is shared with the owner so it can observe the lifecycle;
    /// cancelling `shutdown_token` stops the manager at any point.
    pub fn new(
        config: ConnectionConfig,
        state: Arc<RwLock<ConnectionState>>,
        events: mpsc::Sender<WsEvent>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let heartbeat =
            HeartbeatManager::new(config.heartbeat_interval_ms, config.heartbeat_timeout_ms);
        Self {
            config,
            state,
            heartbeat,
            events,
            reconnect_count: AtomicU32::new(0),
            shutdown_token,
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    /// Signal graceful shutdown.
    pub fn shutdown(&self) {
        info!(url = %self.config.url, "Connection shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and run until shutdown, reconnecting on failure.
    ///
    /// Returns `Ok(())` after shutdown or once the event receiver is gone,
    /// and an error only when `max_reconnect_attempts` is exhausted.
    pub async fn connect(&self) -> WsResult<()> {
        let result = self.connect_with_retry().await;
        self.set_state_now(ConnectionState::Closed);
        result
    }

    async fn connect_with_retry(&self) -> WsResult<()> {
        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting connect loop");
                return Ok(());
            }

            if !self.set_state(ConnectionState::Connecting).await {
                return Ok(());
            }

            let error = match self.try_connect().await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                return Ok(());
            }

            let attempt = self.reconnect_count.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(%error, attempt, "Market stream disconnected");

            if !self
                .emit(WsEvent::Disconnected {
                    cause: error.label(),
                    reason: error.to_string(),
                })
                .await
            {
                return Ok(());
            }

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                return Err(WsError::ConnectionFailed(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            if !self.set_state(ConnectionState::Reconnecting).await {
                return Ok(());
            }

            let delay = self.calculate_backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            // Teardown wins over a pending reconnect.
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    return Ok(());
                }
            }
        }
    }

    /// Run one connection. `Ok(())` means stop for good; `Err` means retry.
    async fn try_connect(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to market stream");

        // TCP_NODELAY: frames are small and latency-sensitive.
        let connect = connect_async_tls_with_config(self.config.url.as_str(), None, true, None);
        let (ws_stream, _response) = tokio::select! {
            result = connect => result?,
            () = self.shutdown_token.cancelled() => return Ok(()),
        };
        let (mut write, mut read) = ws_stream.split();

        self.reconnect_count.store(0, Ordering::Relaxed);
        self.heartbeat.reset();
        if !self.set_state(ConnectionState::Open).await {
            return self.close_gracefully(&mut write).await;
        }
        info!(url = %self.config.url, "Market stream connected");

        let mut heartbeat_check = tokio::time::interval(self.heartbeat.check_period());
        heartbeat_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    return self.close_gracefully(&mut write).await;
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.heartbeat.record_message();
                            if !self.emit(WsEvent::Frame(text)).await {
                                return self.close_gracefully(&mut write).await;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_message();
                            write
                                .send(Message::Pong(data))
                                .await
                                .map_err(|e| WsError::SendFailed(format!("pong: {e}")))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Market stream closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Ok(_)) => {
                            self.heartbeat.record_message();
                            debug!("Ignoring non-text frame");
                        }
                        Some(Err(e)) => {
                            error!(?e, "Market stream read error");
                            return Err(e.into());
                        }
                        None => {
                            return Err(WsError::ConnectionClosed {
                                code: 1006,
                                reason: "Stream ended".to_string(),
                            });
                        }
                    }
                }

                _ = heartbeat_check.tick() => {
                    if self.heartbeat.is_timed_out() {
                        error!(stats = ?self.heartbeat.stats(), "Heartbeat timeout");
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_ping() {
                        write
                            .send(Message::Ping(Vec::new()))
                            .await
                            .map_err(|e| WsError::SendFailed(format!("ping: {e}")))?;
                        self.heartbeat.record_ping();
                        debug!("Sent heartbeat ping");
                    }
                }
            }
        }
    }

    async fn close_gracefully(&self, write: &mut WsSink) -> WsResult<()> {
        self.set_state_now(ConnectionState::Closing);
        match tokio::time::timeout(CLOSE_TIMEOUT, write.send(Message::Close(None))).await {
            Ok(Ok(())) => debug!("Close frame sent"),
            Ok(Err(e)) => warn!(?e, "Failed to send Close frame"),
            Err(_) => warn!("Timed out sending Close frame"),
        }
        Ok(())
    }

    /// Deliver an event, giving up on shutdown or when the receiver is gone.
    async fn emit(&self, event: WsEvent) -> bool {
        tokio::select! {
            biased;
            () = self.shutdown_token.cancelled() => false,
            sent = self.events.send(event) => {
                if sent.is_err() {
                    debug!("Event receiver dropped");
                }
                sent.is_ok()
            }
        }
    }

    async fn set_state(&self, state: ConnectionState) -> bool {
        *self.state.write() = state;
        self.emit(WsEvent::StateChanged(state)).await
    }

    /// Best-effort state change for the shutdown path.
    fn set_state_now(&self, state: ConnectionState) {
        *self.state.write() = state;
        let _ = self.events.try_send(WsEvent::StateChanged(state));
    }

    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        backoff_delay(
            self.config.reconnect_base_delay_ms,
            self.config.reconnect_max_delay_ms,
            attempt,
            rand_jitter(self.config.reconnect_base_delay_ms.min(MAX_JITTER_MS)),
        )
    }
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped at `max`, plus jitter.
fn backoff_delay(base_ms: u64, max_ms: u64, attempt: u32, jitter_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = base_ms.saturating_mul(1u64 << exponent).min(max_ms);
    Duration::from_millis(delay + jitter_ms)
}

/// Random jitter in `[0, bound)`.
fn rand_jitter(bound: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    if bound == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % bound
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unused_local_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{addr}/stream?streams=btcusdt@trade")
    }

    fn manager(
        config: ConnectionConfig,
    ) -> (ConnectionManager, mpsc::Receiver<WsEvent>, CancellationToken) {
        let (tx, rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let state = Arc::new(RwLock::new(ConnectionState::Idle));
        (
            ConnectionManager::new(config, state, tx, token.clone()),
            rx,
            token,
        )
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0); // Infinite
        assert_eq!(config.reconnect_base_delay_ms, 1000);
        assert_eq!(config.heartbeat_interval_ms, 20_000);
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(1000, 30_000, 1, 0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1000, 30_000, 2, 0), Duration::from_millis(2000));
        assert_eq!(backoff_delay(1000, 30_000, 3, 0), Duration::from_millis(4000));
        assert_eq!(backoff_delay(1000, 30_000, 6, 0), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(1000, 30_000, 40, 0), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(1000, 30_000, 1, 250), Duration::from_millis(1250));
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(rand_jitter(0), 0);
        for _ in 0..100 {
            assert!(rand_jitter(7) < 7);
        }
    }

    #[test]
    fn test_state_labels() {
        let labels: Vec<&str> = ConnectionState::ALL.iter().map(|s| s.label()).collect();
        assert_eq!(
            labels,
            vec!["idle", "connecting", "open", "reconnecting", "closing", "closed"]
        );
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Reconnecting.is_open());
    }

    #[tokio::test]
    async fn test_respects_max_reconnect_attempts() {
        let config = ConnectionConfig {
            url: unused_local_url(),
            max_reconnect_attempts: 2,
            reconnect_base_delay_ms: 10,
            ..Default::default()
        };
        let (manager, mut rx, _token) = manager(config);

        let result = tokio::time::timeout(Duration::from_secs(5), manager.connect()).await;
        let result = result.expect("connect loop must give up");
        assert!(matches!(result, Err(WsError::ConnectionFailed(_))));
        assert_eq!(manager.state(), ConnectionState::Closed);

        let mut disconnects = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, WsEvent::Disconnected { .. }) {
                disconnects += 1;
            }
        }
        assert_eq!(disconnects, 2);
    }

    #[tokio::test]
    async fn test_shutdown_wins_over_backoff() {
        let config = ConnectionConfig {
            url: unused_local_url(),
            reconnect_base_delay_ms: 60_000,
            reconnect_max_delay_ms: 60_000,
            ..Default::default()
        };
        let (manager, mut rx, token) = manager(config);
        let manager = Arc::new(manager);

        let runner = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.connect().await })
        };

        // Wait for the first failure, then cancel during the long backoff.
        loop {
            match rx.recv().await {
                Some(WsEvent::Disconnected { .. }) => break,
                Some(_) => continue,
                None => panic!("event channel closed early"),
            }
        }
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("shutdown must interrupt backoff")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(manager.state(), ConnectionState::Closed);
    }
}
