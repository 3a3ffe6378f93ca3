// =============================================================================
// Scanner Configuration — windows, thresholds, and cache tuning
// =============================================================================
//
// Every tunable parameter of the scan pipeline lives here and is threaded
// explicitly through the cache coordinator and indicator engine — there is no
// ambient/global state.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_rsi_window() -> usize {
    14
}

fn default_atr_window() -> usize {
    14
}

fn default_rsi_lookback_days() -> usize {
    7
}

fn default_rsi_high_threshold() -> f64 {
    90.0
}

fn default_rsi_low_threshold() -> f64 {
    10.0
}

fn default_overextended_lookback_days() -> usize {
    5
}

fn default_overextended_atr_multiplier() -> f64 {
    5.0
}

fn default_hist_days() -> i64 {
    30
}

fn default_max_cache_age_days() -> i64 {
    1
}

fn default_retention_days() -> i64 {
    90
}

fn default_request_delay_ms() -> u64 {
    120
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_db_path() -> String {
    "data/scanner.db".to_string()
}

fn default_symbols() -> Vec<String> {
    vec![
        "AAPL".to_string(),
        "MSFT".to_string(),
        "NVDA".to_string(),
        "AMZN".to_string(),
        "GOOGL".to_string(),
        "META".to_string(),
        "TSLA".to_string(),
        "JPM".to_string(),
    ]
}

// =============================================================================
// ScannerConfig
// =============================================================================

/// Top-level configuration for the Vela scanner.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    // --- Indicator windows ---------------------------------------------------

    /// Trailing window for the RSI oscillator.
    #[serde(default = "default_rsi_window")]
    pub rsi_window: usize,

    /// Trailing window for the ATR volatility measure.
    #[serde(default = "default_atr_window")]
    pub atr_window: usize,

    // --- Extreme detection ---------------------------------------------------

    /// How many recent RSI samples to inspect for extreme values.
    #[serde(default = "default_rsi_lookback_days")]
    pub rsi_lookback_days: usize,

    /// RSI at or above this value counts as an extreme high.
    #[serde(default = "default_rsi_high_threshold")]
    pub rsi_high_threshold: f64,

    /// RSI at or below this value counts as an extreme low.
    #[serde(default = "default_rsi_low_threshold")]
    pub rsi_low_threshold: f64,

    // --- Overextension -------------------------------------------------------

    /// Days to look back for the swing low (the current bar is excluded).
    #[serde(default = "default_overextended_lookback_days")]
    pub overextended_lookback_days: usize,

    /// ATR multiplier that sets the overextension threshold above the swing
    /// low.
    #[serde(default = "default_overextended_atr_multiplier")]
    pub overextended_atr_multiplier: f64,

    // --- Cache tuning --------------------------------------------------------

    /// Calendar days of history required for each scan.
    #[serde(default = "default_hist_days")]
    pub hist_days: i64,

    /// Cached data older than this many days triggers a refetch.
    #[serde(default = "default_max_cache_age_days")]
    pub max_cache_age_days: i64,

    /// Bars and indicator samples older than this are pruned at startup.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    // --- External source pacing ----------------------------------------------

    /// Pause between per-symbol fetches — the upstream source is rate-limited.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Hard timeout on every outbound data request.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    // --- Storage & universe --------------------------------------------------

    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Instrument universe to scan.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            rsi_window: default_rsi_window(),
            atr_window: default_atr_window(),
            rsi_lookback_days: default_rsi_lookback_days(),
            rsi_high_threshold: default_rsi_high_threshold(),
            rsi_low_threshold: default_rsi_low_threshold(),
            overextended_lookback_days: default_overextended_lookback_days(),
            overextended_atr_multiplier: default_overextended_atr_multiplier(),
            hist_days: default_hist_days(),
            max_cache_age_days: default_max_cache_age_days(),
            retention_days: default_retention_days(),
            request_delay_ms: default_request_delay_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            db_path: default_db_path(),
            symbols: default_symbols(),
        }
    }
}

impl ScannerConfig {
    /// Minimum bar count for a usable series: enough to cover both indicator
    /// windows plus the one extra bar their seeding consumes.
    pub fn min_required_bars(&self) -> usize {
        self.rsi_window.max(self.atr_window) + 1
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scanner config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse scanner config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = config.symbols.len(),
            hist_days = config.hist_days,
            "scanner config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise scanner config")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "scanner config saved (atomic)");
        Ok(())
    }

    /// Replace the symbol universe from a comma-separated env value, keeping
    /// the configured list when the variable is unset or empty.
    pub fn apply_symbol_override(&mut self, value: Option<String>) {
        if let Some(raw) = value {
            let symbols: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !symbols.is_empty() {
                self.symbols = symbols;
            }
        }
    }
}
