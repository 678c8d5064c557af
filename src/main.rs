mod comfy_table;
mod tui;

use anyhow::{Context, Result};
use rsi_screener::storage_utils::AsyncStorageManager;
use rsi_screener::{Scanner, ScreenerConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(tui_mode: bool, storage: &AsyncStorageManager) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if tui_mode {
        // The terminal belongs to the TUI; logs go to a file next to the config.
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(storage.path_for("screener.log"))?;
        builder
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let tui_mode = std::env::args().skip(1).any(|arg| arg == "--tui");

    // Step 1: Storage + logging
    let storage = AsyncStorageManager::new_relative("storage").await?;
    init_logging(tui_mode, &storage)?;

    // Step 2: Configuration (defaults written on first run)
    let config: ScreenerConfig = storage.load_or_init("config").await?;
    let scanner = Scanner::from_config(&config)?;
    let zone = config.display_zone().unwrap_or_default();
    let thresholds = scanner.settings().gate.thresholds;

    // Step 3: Scan on demand
    if tui_mode {
        let quote_asset = config.exchange.quote_asset.clone();
        return tui::run_tui(Arc::new(scanner), zone, thresholds, quote_asset).await;
    }

    info!("Fetching RSI data for all {} pairs...", config.exchange.quote_asset);
    let result = scanner.run_scan().await.context("Scan failed")?;
    comfy_table::run(&result, &zone, &thresholds);
    Ok(())
}
