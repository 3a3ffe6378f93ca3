// =============================================================================
// External Data Source — daily OHLCV bars over HTTP
// =============================================================================
//
// The market-data provider is an external collaborator: the scanner only
// depends on the `BarSource` trait, which returns a typed `FetchError` so the
// cache coordinator can pattern-match on the failure instead of swallowing a
// generic exception.  Every request carries an explicit timeout; on failure
// the coordinator falls back to cached data.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{DailyBar, DateRange};

/// Why a fetch from the external data source failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(reqwest::Error),

    #[error("source returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }
}

/// Boundary trait for anything that can supply daily bars for a symbol and
/// date range.  Implementations must return bars one per trading day; order
/// is normalised on this side before the merge.
#[async_trait]
pub trait BarSource: Send + Sync {
    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<DailyBar>, FetchError>;
}

/// Sort ascending by date, drop same-day duplicates (last one wins), and drop
/// bars with non-finite prices.
pub fn normalize_bars(mut bars: Vec<DailyBar>) -> Vec<DailyBar> {
    bars.retain(|b| {
        let finite =
            b.open.is_finite() && b.high.is_finite() && b.low.is_finite() && b.close.is_finite();
        if !finite {
            warn!(date = %b.date, "dropping bar with non-finite prices");
        }
        finite
    });
    bars.sort_by_key(|b| b.date);
    // Same-day duplicates: keep the later submission.
    bars.reverse();
    bars.dedup_by_key(|b| b.date);
    bars.reverse();
    bars
}

// -----------------------------------------------------------------------------
// HTTP implementation
// -----------------------------------------------------------------------------

/// REST client for a daily-bars endpoint:
///
/// `GET {base_url}/v1/daily/{symbol}?start=YYYY-MM-DD&end=YYYY-MM-DD`
///
/// The response is a JSON array of `{date, open, high, low, close, volume}`
/// objects.
#[derive(Clone)]
pub struct HttpBarSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBarSource {
    /// Build a client with a hard per-request `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");

        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl BarSource for HttpBarSource {
    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<DailyBar>, FetchError> {
        let url = format!(
            "{}/v1/daily/{}?start={}&end={}",
            self.base_url, symbol, range.start, range.end
        );
        debug!(symbol, range = %range, "fetching daily bars");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status { status, body });
        }

        let bars: Vec<DailyBar> = serde_json::from_str(&body)?;
        let bars = normalize_bars(bars);
        debug!(symbol, count = bars.len(), "daily bars fetched");
        Ok(bars)
    }
}

impl std::fmt::Debug for HttpBarSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBarSource")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(date: &str, close: f64) -> DailyBar {
        DailyBar {
            date: date.parse().unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100,
        }
    }

    #[test]
    fn normalize_sorts_ascending() {
        let bars = vec![bar("2025-06-04", 3.0), bar("2025-06-02", 1.0), bar("2025-06-03", 2.0)];
        let out = normalize_bars(bars);
        let dates: Vec<NaiveDate> = out.iter().map(|b| b.date).collect();
        assert_eq!(
            dates,
            vec![
                "2025-06-02".parse::<NaiveDate>().unwrap(),
                "2025-06-03".parse().unwrap(),
                "2025-06-04".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn normalize_keeps_last_duplicate() {
        let bars = vec![bar("2025-06-02", 1.0), bar("2025-06-02", 9.0)];
        let out = normalize_bars(bars);
        assert_eq!(out.len(), 1);
        assert!((out[0].close - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn normalize_drops_non_finite_bars() {
        let mut bad = bar("2025-06-03", 2.0);
        bad.high = f64::NAN;
        let bars = vec![bar("2025-06-02", 1.0), bad];
        let out = normalize_bars(bars);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].date, "2025-06-02".parse::<NaiveDate>().unwrap());
    }

    #[test]
    fn wire_format_parses() {
        let json = r#"[
            {"date": "2025-06-02", "open": 100.0, "high": 102.0,
             "low": 99.0, "close": 101.5, "volume": 12345}
        ]"#;
        let bars: Vec<DailyBar> = serde_json::from_str(json).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, "2025-06-02".parse::<NaiveDate>().unwrap());
        assert!((bars[0].close - 101.5).abs() < f64::EPSILON);
        assert_eq!(bars[0].volume, 12345);
    }
}
