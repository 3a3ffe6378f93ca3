// =============================================================================
// Cache Coordinator — decides what to fetch and reconciles partial coverage
// =============================================================================
//
// Per instrument and scan cycle the coordinator answers two questions: is the
// stored history fresh and sufficient, and if not, exactly which date
// range(s) are still missing.  When both the leading and trailing edge of the
// required window are missing, two disjoint ranges are requested — collapsing
// them into one request would produce an inverted (start > end) range.
//
// After a fetch the coordinator always re-reads the full required window from
// the store as the canonical series; a fetched payload may be a partial gap
// fill and is never trusted alone.
// =============================================================================

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{debug, warn};

use crate::config::ScannerConfig;
use crate::fetch::BarSource;
use crate::store::{Coverage, Store, StoreError};
use crate::types::{DailyBar, DateRange};

/// What the coordinator decided for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPlan {
    /// Cached data is fresh and sufficient — no fetch needed.
    Satisfied,
    /// These ranges (one, or two disjoint gaps) must be fetched and merged.
    Fetch(Vec<DateRange>),
}

/// The merged series handed to the indicator engine.
#[derive(Debug, Clone)]
pub struct CachedSeries {
    pub bars: Vec<DailyBar>,
    /// True when a fetch failed and the series is whatever the cache held.
    pub degraded: bool,
    /// True when the series was served without touching the external source.
    pub cache_hit: bool,
}

/// Compute the gap ranges between the actually-cached coverage and the
/// required window.  Empty result means the window is fully covered.
pub fn compute_gaps(required: DateRange, coverage: Option<Coverage>) -> Vec<DateRange> {
    let cov = match coverage {
        Some(cov) => cov,
        None => return vec![required],
    };

    let mut gaps = Vec::new();
    if cov.start > required.start {
        gaps.push(DateRange::new(required.start, cov.start - Duration::days(1)));
    }
    if cov.end < required.end {
        gaps.push(DateRange::new(cov.end + Duration::days(1), required.end));
    }
    gaps
}

/// Stateless with respect to persistence: reads and writes go through the
/// store, which remains the single source of truth.
pub struct CacheCoordinator<S: BarSource> {
    store: Arc<Store>,
    source: S,
    config: ScannerConfig,
}

impl<S: BarSource> CacheCoordinator<S> {
    pub fn new(store: Arc<Store>, source: S, config: ScannerConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// The window of history every scan needs, ending today.
    pub fn required_range(&self, today: NaiveDate) -> DateRange {
        DateRange::new(today - Duration::days(self.config.hist_days), today)
    }

    /// Freshness check, then sufficiency check, then gap computation.
    ///
    /// Coverage that fully contains the required window is always
    /// `Satisfied` — when the covered window still holds too few trading
    /// days, fetching the same range again would not add bars, and the
    /// indicator engine re-validates sufficiency independently.
    pub fn plan(&self, symbol: &str, today: NaiveDate) -> Result<FetchPlan, StoreError> {
        let required = self.required_range(today);

        if self.store.is_fresh(symbol, self.config.max_cache_age_days)? {
            let cached = self.store.get_bars(symbol, required)?;
            if cached.len() >= self.config.min_required_bars() {
                return Ok(FetchPlan::Satisfied);
            }
        }

        let gaps = compute_gaps(required, self.store.coverage(symbol)?);
        if gaps.is_empty() {
            Ok(FetchPlan::Satisfied)
        } else {
            Ok(FetchPlan::Fetch(gaps))
        }
    }

    /// Produce the canonical merged series for `symbol`.
    ///
    /// Fetch failures are not fatal: the coordinator falls back to whatever
    /// the store already holds for the window and marks the series degraded.
    pub async fn load_series(
        &self,
        symbol: &str,
        today: NaiveDate,
    ) -> Result<CachedSeries, StoreError> {
        let required = self.required_range(today);

        let gaps = match self.plan(symbol, today)? {
            FetchPlan::Satisfied => {
                let bars = self.store.get_bars(symbol, required)?;
                debug!(symbol, bars = bars.len(), "cache satisfied");
                return Ok(CachedSeries {
                    bars,
                    degraded: false,
                    cache_hit: true,
                });
            }
            FetchPlan::Fetch(gaps) => gaps,
        };

        let mut degraded = false;
        for gap in &gaps {
            match self.source.fetch_daily_bars(symbol, *gap).await {
                Ok(bars) => {
                    debug!(symbol, range = %gap, fetched = bars.len(), "gap fetched");
                    self.store.upsert_bars(symbol, &bars)?;
                }
                Err(e) => {
                    warn!(symbol, range = %gap, error = %e, "fetch failed — falling back to cache");
                    degraded = true;
                }
            }
        }

        // Canonical view: the merged window as the store now holds it.
        let bars = self.store.get_bars(symbol, required)?;
        Ok(CachedSeries {
            bars,
            degraded,
            cache_hit: false,
        })
    }
}
