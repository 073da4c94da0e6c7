//! tickflow: live market data cache fed by a combined exchange stream.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Market data ingestion service
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TICKFLOW_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Symbol override, e.g. ETHUSDT
    #[arg(long)]
    symbol: Option<String>,

    /// Candle interval override, e.g. 5m
    #[arg(long)]
    interval: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection is opened
    tickflow_ws::init_crypto();

    let args = Args::parse();

    tickflow_telemetry::init_logging()?;

    info!("Starting tickflow v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > TICKFLOW_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TICKFLOW_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let mut config = tickflow_app::AppConfig::load(&config_path)?;
    if let Some(symbol) = args.symbol {
        config.symbol = symbol;
    }
    if let Some(interval) = args.interval {
        config.interval = interval;
    }
    info!(symbol = %config.symbol, interval = %config.interval, "Configuration loaded");

    let app = tickflow_app::Application::new(config)?;
    app.run().await?;

    Ok(())
}
