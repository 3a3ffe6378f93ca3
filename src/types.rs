// =============================================================================
// Shared types used across the Vela scanner
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single daily OHLCV bar for one instrument.
///
/// One bar per trading day; intraday data is out of scope. Bars are immutable
/// once stored — re-merging the same bar is an idempotent upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// An inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// True when `other` lies entirely inside this range.
    pub fn contains(&self, other: &DateRange) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// True when a single date lies inside this range.
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered, inclusive of both endpoints.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A derived indicator sample for one (symbol, date).
///
/// Only produced for dates where the underlying smoothing window is fully
/// populated — there are no partial-window samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSample {
    pub date: NaiveDate,
    pub oscillator: f64,
    pub volatility: f64,
}

/// One row of the append-only scan log.
///
/// Column names of the backing `scan_results` table are stable — external
/// reporting tools query them by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub scan_date: NaiveDate,
    pub symbol: String,
    pub oscillator: Option<f64>,
    pub volatility: Option<f64>,
    pub hit_high: bool,
    pub hit_low: bool,
    pub is_overextended: bool,
    pub swing_low: Option<f64>,
    pub overextended_threshold: Option<f64>,
    pub current_price: Option<f64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl ScanRecord {
    /// An all-null record carrying only a status label, used when a symbol
    /// could not be evaluated (insufficient data, failed calculation, error).
    pub fn empty(scan_date: NaiveDate, symbol: &str, status: impl Into<String>) -> Self {
        Self {
            scan_date,
            symbol: symbol.to_string(),
            oscillator: None,
            volatility: None,
            hit_high: false,
            hit_low: false,
            is_overextended: false,
            swing_low: None,
            overextended_threshold: None,
            current_price: None,
            status: status.into(),
            created_at: Utc::now(),
        }
    }
}
