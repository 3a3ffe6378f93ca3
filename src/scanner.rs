// =============================================================================
// Scan Orchestrator — per-symbol pipeline and cycle loop
// =============================================================================
//
// For each instrument: ask the cache coordinator for a ready series, hand it
// to the indicator engine, and append the outcome to the scan log.  Every
// per-symbol failure is folded into the status label of its own scan row —
// nothing that happens to one symbol may abort the rest of the cycle.
//
// Instruments are processed sequentially with a pacing delay between fetches;
// the upstream data source is rate-limited.
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::cache::CacheCoordinator;
use crate::config::ScannerConfig;
use crate::fetch::BarSource;
use crate::indicators::extremes::check_extremes;
use crate::indicators::overextension::check_overextended;
use crate::indicators::{atr, rsi};
use crate::store::Store;
use crate::types::{DailyBar, IndicatorSample, ScanRecord};

/// Everything the cycle loop wants to know about one symbol's scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub symbol: String,
    pub status: String,
    pub oscillator: Option<f64>,
    pub volatility: Option<f64>,
    pub hit_high: bool,
    pub hit_low: bool,
    pub is_overextended: bool,
    pub proximity_pct: Option<f64>,
    pub current_price: Option<f64>,
    pub swing_low: Option<f64>,
    pub threshold: Option<f64>,
    pub data_points: usize,
    pub cache_hit: bool,
    pub degraded: bool,
}

impl ScanOutcome {
    fn empty(symbol: &str, status: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            status: status.into(),
            oscillator: None,
            volatility: None,
            hit_high: false,
            hit_low: false,
            is_overextended: false,
            proximity_pct: None,
            current_price: None,
            swing_low: None,
            threshold: None,
            data_points: 0,
            cache_hit: false,
            degraded: false,
        }
    }

    pub fn is_alert(&self) -> bool {
        self.hit_high || self.hit_low || self.is_overextended
    }

    pub fn is_error(&self) -> bool {
        self.status.starts_with("error:")
    }
}

/// Aggregate numbers for one full pass over the universe.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub scanned: usize,
    pub successful: usize,
    pub insufficient: usize,
    pub errors: usize,
    pub cache_hits: usize,
    pub alerts: Vec<ScanOutcome>,
    pub duration: Duration,
}

/// Compose the status label in its fixed order: extreme high, extreme low,
/// overextension, separated by `;`.  No signal at all is `no_hit`.
fn build_status(hit_high: bool, hit_low: bool, is_overextended: bool, config: &ScannerConfig) -> String {
    let mut parts: Vec<String> = Vec::new();
    if hit_high {
        parts.push(format!("RSI>={}", config.rsi_high_threshold));
    }
    if hit_low {
        parts.push(format!("RSI<={}", config.rsi_low_threshold));
    }
    if is_overextended {
        parts.push("overextended".to_string());
    }
    if parts.is_empty() {
        "no_hit".to_string()
    } else {
        parts.join(";")
    }
}

/// Derive per-date indicator samples from the aligned RSI and ATR series.
/// Only dates where both windows are fully populated produce a sample.
fn build_samples(
    bars: &[DailyBar],
    rsi_series: &[f64],
    atr_series: &[f64],
    rsi_window: usize,
    atr_window: usize,
) -> Vec<IndicatorSample> {
    let offset = rsi_window.max(atr_window);
    let mut samples = Vec::new();
    for (i, bar) in bars.iter().enumerate().skip(offset) {
        let oscillator = rsi_series.get(i - rsi_window);
        let volatility = atr_series.get(i - atr_window);
        if let (Some(&oscillator), Some(&volatility)) = (oscillator, volatility) {
            samples.push(IndicatorSample {
                date: bar.date,
                oscillator,
                volatility,
            });
        }
    }
    samples
}

pub struct Scanner<S: BarSource> {
    store: Arc<Store>,
    coordinator: CacheCoordinator<S>,
    config: ScannerConfig,
}

impl<S: BarSource> Scanner<S> {
    pub fn new(store: Arc<Store>, source: S, config: ScannerConfig) -> Self {
        let coordinator = CacheCoordinator::new(store.clone(), source, config.clone());
        Self {
            store,
            coordinator,
            config,
        }
    }

    /// Scan a single symbol.  Never returns an error: failures become the
    /// outcome's status label and are persisted alongside real results.
    pub async fn scan_symbol(&self, symbol: &str, today: NaiveDate) -> ScanOutcome {
        let series = match self.coordinator.load_series(symbol, today).await {
            Ok(series) => series,
            Err(e) => {
                warn!(symbol, error = %e, "store failure during series load");
                let outcome = ScanOutcome::empty(symbol, format!("error:{e}"));
                self.record(&outcome, today);
                return outcome;
            }
        };

        if series.degraded {
            warn!(symbol, bars = series.bars.len(), "scanning on degraded (cache-only) data");
        }

        if series.bars.len() < self.config.min_required_bars() {
            let mut outcome = ScanOutcome::empty(symbol, "insufficient_data");
            outcome.cache_hit = series.cache_hit;
            outcome.degraded = series.degraded;
            outcome.data_points = series.bars.len();
            self.record(&outcome, today);
            return outcome;
        }

        let closes: Vec<f64> = series.bars.iter().map(|b| b.close).collect();
        let rsi_series = rsi::rsi_series(&closes, self.config.rsi_window);
        let atr_series = atr::atr_series(&series.bars, self.config.atr_window);

        let latest_rsi = rsi_series.last().copied();
        let latest_atr = atr_series.last().copied();

        let latest_rsi = match latest_rsi {
            Some(v) => v,
            None => {
                let mut outcome = ScanOutcome::empty(symbol, "calculation_failed");
                outcome.cache_hit = series.cache_hit;
                outcome.degraded = series.degraded;
                outcome.data_points = series.bars.len();
                self.record(&outcome, today);
                return outcome;
            }
        };

        let samples = build_samples(
            &series.bars,
            &rsi_series,
            &atr_series,
            self.config.rsi_window,
            self.config.atr_window,
        );
        if let Err(e) = self.store.upsert_indicators(symbol, &samples) {
            warn!(symbol, error = %e, "failed to persist indicator samples");
            let outcome = ScanOutcome::empty(symbol, format!("error:{e}"));
            self.record(&outcome, today);
            return outcome;
        }

        let extremes = check_extremes(
            &rsi_series,
            self.config.rsi_lookback_days,
            self.config.rsi_high_threshold,
            self.config.rsi_low_threshold,
        );
        let overextension = check_overextended(
            &series.bars,
            latest_atr,
            self.config.overextended_lookback_days,
            self.config.overextended_atr_multiplier,
        );
        let measure = overextension.measure();
        let is_overextended = measure.map(|m| m.is_overextended).unwrap_or(false);

        let status = build_status(extremes.hit_high, extremes.hit_low, is_overextended, &self.config);

        let outcome = ScanOutcome {
            symbol: symbol.to_string(),
            status,
            oscillator: Some(latest_rsi),
            volatility: latest_atr,
            hit_high: extremes.hit_high,
            hit_low: extremes.hit_low,
            is_overextended,
            proximity_pct: measure.map(|m| m.proximity_pct),
            current_price: measure.map(|m| m.current_price),
            swing_low: measure.map(|m| m.swing_low),
            threshold: measure.map(|m| m.threshold),
            data_points: series.bars.len(),
            cache_hit: series.cache_hit,
            degraded: series.degraded,
        };
        self.record(&outcome, today);
        outcome
    }

    /// One pass over the whole universe with pacing between symbols.
    pub async fn run_cycle(&self, today: NaiveDate) -> CycleSummary {
        let started = Instant::now();
        let symbols = self.config.symbols.clone();
        let mut summary = CycleSummary::default();

        info!(symbols = symbols.len(), "scan cycle starting");

        for (i, symbol) in symbols.iter().enumerate() {
            debug!(symbol = %symbol, progress = format!("{}/{}", i + 1, symbols.len()), "scanning");
            let outcome = self.scan_symbol(symbol, today).await;

            summary.scanned += 1;
            if outcome.is_error() {
                summary.errors += 1;
            } else if outcome.status == "insufficient_data" {
                summary.insufficient += 1;
            } else if outcome.oscillator.is_some() {
                summary.successful += 1;
            }
            if outcome.cache_hit {
                summary.cache_hits += 1;
            }
            if outcome.is_alert() {
                info!(
                    symbol = %outcome.symbol,
                    status = %outcome.status,
                    oscillator = ?outcome.oscillator,
                    price = ?outcome.current_price,
                    threshold = ?outcome.threshold,
                    proximity_pct = ?outcome.proximity_pct,
                    "alert"
                );
                summary.alerts.push(outcome);
            }

            // Pacing: the external source is rate-limited.
            tokio::time::sleep(Duration::from_millis(self.config.request_delay_ms)).await;
        }

        summary.duration = started.elapsed();

        let hit_rate = if summary.scanned > 0 {
            summary.cache_hits as f64 / summary.scanned as f64 * 100.0
        } else {
            0.0
        };
        info!(
            scanned = summary.scanned,
            successful = summary.successful,
            insufficient = summary.insufficient,
            errors = summary.errors,
            alerts = summary.alerts.len(),
            cache_hit_rate = format!("{hit_rate:.1}%"),
            duration_secs = summary.duration.as_secs_f64(),
            "scan cycle finished"
        );

        match self.store.stats(self.config.max_cache_age_days) {
            Ok(stats) => info!(
                price_rows = stats.price_rows,
                indicator_rows = stats.indicator_rows,
                scan_rows = stats.scan_rows,
                symbols = stats.symbols,
                fresh_symbols = stats.fresh_symbols,
                "store statistics"
            ),
            Err(e) => warn!(error = %e, "failed to read store statistics"),
        }

        summary
    }

    /// Append the outcome to the scan log.  A failing append is logged and
    /// swallowed — the scan itself already happened and the cycle continues.
    fn record(&self, outcome: &ScanOutcome, today: NaiveDate) {
        let record = ScanRecord {
            scan_date: today,
            symbol: outcome.symbol.clone(),
            oscillator: outcome.oscillator,
            volatility: outcome.volatility,
            hit_high: outcome.hit_high,
            hit_low: outcome.hit_low,
            is_overextended: outcome.is_overextended,
            swing_low: outcome.swing_low,
            overextended_threshold: outcome.threshold,
            current_price: outcome.current_price,
            status: outcome.status.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.record_scan_result(&record) {
            warn!(symbol = %outcome.symbol, error = %e, "failed to append scan result");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::types::DateRange;
    use async_trait::async_trait;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    /// Deterministic trending source: the close rises by exactly 1.0 per
    /// calendar day, anchored to the date itself, with a fixed 2.0 daily
    /// range.  A strictly rising series pins the RSI at 100.
    struct TrendSource {
        fail: bool,
    }

    fn trend_close(date: NaiveDate) -> f64 {
        let epoch = d("2025-01-01");
        100.0 + (date - epoch).num_days() as f64
    }

    #[async_trait]
    impl BarSource for TrendSource {
        async fn fetch_daily_bars(
            &self,
            _symbol: &str,
            range: DateRange,
        ) -> Result<Vec<DailyBar>, FetchError> {
            if self.fail {
                return Err(FetchError::Timeout);
            }
            let mut out = Vec::new();
            let mut day = range.start;
            while day <= range.end {
                let close = trend_close(day);
                out.push(DailyBar {
                    date: day,
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000,
                });
                day += chrono::Duration::days(1);
            }
            Ok(out)
        }
    }

    fn test_config() -> ScannerConfig {
        let mut config = ScannerConfig::default();
        config.symbols = vec!["AAPL".to_string()];
        config.request_delay_ms = 0;
        config
    }

    fn scanner_with(config: ScannerConfig, fail: bool) -> (Arc<Store>, Scanner<TrendSource>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let scanner = Scanner::new(store.clone(), TrendSource { fail }, config);
        (store, scanner)
    }

    // ---- build_status ------------------------------------------------------

    #[test]
    fn status_with_no_signal_is_no_hit() {
        assert_eq!(
            build_status(false, false, false, &ScannerConfig::default()),
            "no_hit"
        );
    }

    #[test]
    fn status_joins_signals_in_fixed_order() {
        let config = ScannerConfig::default();
        assert_eq!(build_status(true, false, false, &config), "RSI>=90");
        assert_eq!(build_status(false, true, false, &config), "RSI<=10");
        assert_eq!(build_status(false, false, true, &config), "overextended");
        assert_eq!(
            build_status(true, true, true, &config),
            "RSI>=90;RSI<=10;overextended"
        );
    }

    #[test]
    fn status_labels_follow_configured_thresholds() {
        let mut config = ScannerConfig::default();
        config.rsi_high_threshold = 80.0;
        config.rsi_low_threshold = 20.0;
        assert_eq!(build_status(true, true, false, &config), "RSI>=80;RSI<=20");
    }

    // ---- build_samples -----------------------------------------------------

    #[test]
    fn samples_start_at_the_longer_window() {
        let bars: Vec<DailyBar> = (0..31)
            .map(|i| {
                let date = d("2025-06-01") + chrono::Duration::days(i);
                let close = trend_close(date);
                DailyBar {
                    date,
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1,
                }
            })
            .collect();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let rsi = rsi::rsi_series(&closes, 14);
        let atr = atr::atr_series(&bars, 14);

        let samples = build_samples(&bars, &rsi, &atr, 14, 14);
        // 31 bars, window 14: samples for bar indexes 14..=30.
        assert_eq!(samples.len(), 17);
        assert_eq!(samples[0].date, bars[14].date);
        assert_eq!(samples.last().unwrap().date, bars[30].date);
        assert!((samples.last().unwrap().oscillator - 100.0).abs() < 1e-9);
    }

    // ---- scan_symbol -------------------------------------------------------

    #[tokio::test]
    async fn rising_series_flags_the_high_extreme() {
        let (store, scanner) = scanner_with(test_config(), false);
        let today = d("2025-06-30");

        let outcome = scanner.scan_symbol("AAPL", today).await;

        assert_eq!(outcome.status, "RSI>=90");
        assert!(outcome.hit_high);
        assert!(!outcome.hit_low);
        // Threshold sits 4 price units above the close, so no overextension:
        // swing_low = close - 6, atr = 2, contribution = 10.
        assert!(!outcome.is_overextended);
        let close = trend_close(today);
        assert!((outcome.current_price.unwrap() - close).abs() < 1e-9);
        assert!((outcome.threshold.unwrap() - (close + 4.0)).abs() < 1e-6);
        assert!((outcome.proximity_pct.unwrap() - 60.0).abs() < 0.5);

        // The scan row landed in the store.
        let history = store.scan_history(1).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].symbol, "AAPL");
        assert_eq!(history[0].status, "RSI>=90");
        assert!(history[0].hit_high);

        // And so did the indicator samples.
        let range = DateRange::new(today - chrono::Duration::days(30), today);
        let samples = store.get_indicators("AAPL", range).unwrap();
        assert_eq!(samples.len(), 17);
    }

    #[tokio::test]
    async fn tight_multiplier_adds_the_overextension_label() {
        let mut config = test_config();
        config.overextended_atr_multiplier = 1.0;
        let (_store, scanner) = scanner_with(config, false);

        let outcome = scanner.scan_symbol("AAPL", d("2025-06-30")).await;

        // Threshold = swing_low + 2 = close - 4, so the close clears it.
        assert!(outcome.is_overextended);
        assert_eq!(outcome.status, "RSI>=90;overextended");
        assert!((outcome.proximity_pct.unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn failed_fetch_with_empty_cache_is_insufficient() {
        let (store, scanner) = scanner_with(test_config(), true);

        let outcome = scanner.scan_symbol("AAPL", d("2025-06-30")).await;

        assert_eq!(outcome.status, "insufficient_data");
        assert!(outcome.degraded);
        assert_eq!(outcome.data_points, 0);
        assert!(outcome.oscillator.is_none());

        let history = store.scan_history(1).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, "insufficient_data");
        assert!(history[0].oscillator.is_none());
    }

    #[tokio::test]
    async fn second_scan_is_served_from_cache() {
        let (_store, scanner) = scanner_with(test_config(), false);
        let today = d("2025-06-30");

        let first = scanner.scan_symbol("AAPL", today).await;
        assert!(!first.cache_hit);

        let second = scanner.scan_symbol("AAPL", today).await;
        assert!(second.cache_hit);
        assert_eq!(second.status, first.status);
    }

    // ---- run_cycle ---------------------------------------------------------

    #[tokio::test]
    async fn cycle_tallies_every_symbol() {
        let mut config = test_config();
        config.symbols = vec!["AAPL".to_string(), "MSFT".to_string(), "NVDA".to_string()];
        let (store, scanner) = scanner_with(config, false);

        let summary = scanner.run_cycle(d("2025-06-30")).await;

        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.successful, 3);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.insufficient, 0);
        // Every symbol pinned at RSI 100 raises an alert.
        assert_eq!(summary.alerts.len(), 3);

        assert_eq!(store.scan_history(1).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cycle_survives_a_dead_source() {
        let mut config = test_config();
        config.symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let (store, scanner) = scanner_with(config, true);

        let summary = scanner.run_cycle(d("2025-06-30")).await;

        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.successful, 0);
        assert_eq!(summary.insufficient, 2);
        assert!(summary.alerts.is_empty());
        // Both failures were still logged as scan rows.
        assert_eq!(store.scan_history(1).unwrap().len(), 2);
    }
}
