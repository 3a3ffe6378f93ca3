// =============================================================================
// Vela Scanner — Main Entry Point
// =============================================================================
//
// Batch scanner: load config, open the store, prune aged history, run one
// scan cycle over the configured universe, report the summary, exit.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod cache;
mod config;
mod fetch;
mod indicators;
mod scanner;
mod store;
mod types;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ScannerConfig;
use crate::fetch::HttpBarSource;
use crate::scanner::Scanner;
use crate::store::Store;

const CONFIG_PATH: &str = "scanner_config.json";
const DEFAULT_DATA_URL: &str = "http://127.0.0.1:9000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Vela Scanner — Starting Up                        ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = ScannerConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        ScannerConfig::default()
    });

    // Override symbols from env if available.
    config.apply_symbol_override(std::env::var("VELA_SYMBOLS").ok());

    info!(symbols = ?config.symbols, "Configured scan universe");
    info!(
        oscillator_window = config.rsi_window,
        volatility_window = config.atr_window,
        hist_days = config.hist_days,
        db_path = %config.db_path,
        "Scanner configuration"
    );

    // ── 2. Open the store & prune aged history ───────────────────────────
    let store = Arc::new(Store::open(&config.db_path)?);

    let today = Utc::now().date_naive();
    let cutoff = today - ChronoDuration::days(config.retention_days);
    match store.prune_older_than(cutoff) {
        Ok(0) => {}
        Ok(removed) => info!(removed, %cutoff, "Pruned aged rows"),
        Err(e) => warn!(error = %e, "Retention prune failed"),
    }

    // ── 3. Build the data source ─────────────────────────────────────────
    let base_url =
        std::env::var("VELA_DATA_URL").unwrap_or_else(|_| DEFAULT_DATA_URL.to_string());
    let source = HttpBarSource::new(base_url, Duration::from_secs(config.fetch_timeout_secs));

    // ── 4. Run one scan cycle ────────────────────────────────────────────
    let scanner = Scanner::new(store, source, config);
    let summary = scanner.run_cycle(today).await;

    if summary.alerts.is_empty() {
        info!("No alerts this cycle");
    } else {
        for alert in &summary.alerts {
            info!(symbol = %alert.symbol, status = %alert.status, "ALERT");
        }
    }

    info!(
        scanned = summary.scanned,
        errors = summary.errors,
        duration_secs = summary.duration.as_secs_f64(),
        "Vela Scanner finished"
    );

    Ok(())
}
