use anyhow::Context;
use clap::Parser;
use equitybot::{AlpacaClient, Driver, Settings};
use std::sync::Arc;

/// Mean-reversion trader for a single instrument
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Instrument to trade (defaults to the configured symbol)
    symbol: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;
    if !settings.has_credentials() {
        anyhow::bail!("API credentials missing: set EQUITYBOT_API_KEY and EQUITYBOT_API_SECRET");
    }

    let symbol = cli
        .symbol
        .unwrap_or_else(|| settings.default_symbol.clone())
        .to_uppercase();

    let venue = AlpacaClient::new(&settings).context("Failed to build venue client")?;

    tracing::info!("🚀 EquityBot starting");
    tracing::info!("  Symbol: {}", symbol);
    tracing::info!("  Endpoint: {}", settings.trading_url());
    tracing::info!("  Poll interval: {}s", settings.poll_interval_secs);
    tracing::info!("  Window: {} bars", settings.bar_window);

    let mut driver = Driver::new(Arc::new(venue), &symbol, &settings);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        _ = driver.run() => {}
    }

    tracing::info!("👋 EquityBot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("equitybot=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
