//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tickflow_core::{Interval, Symbol};
use tickflow_feed::CachePolicy;
use tickflow_session::SessionConfig;
use tickflow_ws::ConnectionConfig;

/// Prefix for environment overrides, e.g. `TICKFLOW__SYMBOL=ETHUSDT` or
/// `TICKFLOW__WEBSOCKET__HEARTBEAT_INTERVAL_MS=15000`.
pub const ENV_PREFIX: &str = "TICKFLOW";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Market symbol, e.g. "BTCUSDT".
    pub symbol: String,
    /// Candle interval, e.g. "1h".
    pub interval: String,
    /// Market stream endpoint without path.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// REST API base for the trade snapshot.
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    /// Trades requested by the initial snapshot.
    #[serde(default = "default_snapshot_limit")]
    pub snapshot_limit: usize,
    /// WebSocket configuration.
    #[serde(default)]
    pub websocket: WsConfig,
    /// Cache freshness configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_ws_url() -> String {
    "wss://stream.binance.com:9443".to_string()
}

fn default_rest_url() -> String {
    "https://api.binance.com/api/v3".to_string()
}

fn default_snapshot_limit() -> usize {
    100
}

/// WebSocket configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Maximum consecutive reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for reconnection backoff (ms).
    pub reconnect_base_delay_ms: u64,
    /// Backoff cap (ms).
    pub reconnect_max_delay_ms: u64,
    /// Ping interval (ms).
    pub heartbeat_interval_ms: u64,
    /// Time without a pong before the connection is considered dead (ms).
    pub heartbeat_timeout_ms: u64,
    /// Capacity of the frame channel between connection and session.
    pub event_buffer: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        let base = ConnectionConfig::default();
        Self {
            max_reconnect_attempts: base.max_reconnect_attempts,
            reconnect_base_delay_ms: base.reconnect_base_delay_ms,
            reconnect_max_delay_ms: base.reconnect_max_delay_ms,
            heartbeat_interval_ms: base.heartbeat_interval_ms,
            heartbeat_timeout_ms: base.heartbeat_timeout_ms,
            event_buffer: SessionConfig::default().event_buffer,
        }
    }
}

impl From<WsConfig> for ConnectionConfig {
    fn from(cfg: WsConfig) -> Self {
        Self {
            url: String::new(), // Set per subscription
            max_reconnect_attempts: cfg.max_reconnect_attempts,
            reconnect_base_delay_ms: cfg.reconnect_base_delay_ms,
            reconnect_max_delay_ms: cfg.reconnect_max_delay_ms,
            heartbeat_interval_ms: cfg.heartbeat_interval_ms,
            heartbeat_timeout_ms: cfg.heartbeat_timeout_ms,
        }
    }
}

/// Cache freshness thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub stale_after_ms: u64,
    pub expire_after_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let realtime = CachePolicy::REALTIME;
        Self {
            stale_after_ms: realtime.stale_after.as_millis() as u64,
            expire_after_ms: realtime.expire_after.as_millis() as u64,
        }
    }
}

impl From<&CacheConfig> for CachePolicy {
    fn from(cfg: &CacheConfig) -> Self {
        CachePolicy::new(
            Duration::from_millis(cfg.stale_after_ms),
            Duration::from_millis(cfg.expire_after_ms),
        )
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Cache summary log period (ms).
    pub summary_interval_ms: u64,
    /// Feed statistics log period (ms).
    pub stats_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            summary_interval_ms: 5_000,
            stats_interval_ms: 60_000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            interval: "1h".to_string(),
            ws_url: default_ws_url(),
            rest_url: default_rest_url(),
            snapshot_limit: default_snapshot_limit(),
            websocket: WsConfig::default(),
            cache: CacheConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a specific TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` (if present) with `TICKFLOW__*` environment overrides on top.
    pub fn load(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            tracing::warn!(path = %path, "Config file not found, using defaults");
        }

        let config: Self = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        self.market()?;

        if self.ws_url.trim().is_empty() {
            return Err(AppError::Config("ws_url must not be empty".to_string()));
        }
        if self.rest_url.trim().is_empty() {
            return Err(AppError::Config("rest_url must not be empty".to_string()));
        }
        if self.cache.stale_after_ms > self.cache.expire_after_ms {
            return Err(AppError::Config(format!(
                "cache.stale_after_ms ({}) exceeds cache.expire_after_ms ({})",
                self.cache.stale_after_ms, self.cache.expire_after_ms
            )));
        }
        if self.websocket.reconnect_base_delay_ms > self.websocket.reconnect_max_delay_ms {
            return Err(AppError::Config(
                "websocket.reconnect_base_delay_ms exceeds reconnect_max_delay_ms".to_string(),
            ));
        }
        if self.telemetry.summary_interval_ms == 0 || self.telemetry.stats_interval_ms == 0 {
            return Err(AppError::Config(
                "telemetry intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Validated (symbol, interval) pair.
    pub fn market(&self) -> AppResult<(Symbol, Interval)> {
        Ok((Symbol::new(&self.symbol)?, Interval::new(&self.interval)?))
    }

    pub fn cache_policy(&self) -> CachePolicy {
        (&self.cache).into()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            snapshot_limit: self.snapshot_limit,
            event_buffer: self.websocket.event_buffer,
        }
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry.summary_interval_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry.stats_interval_ms)
    }
}
