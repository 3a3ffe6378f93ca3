// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing
// =============================================================================
//
// Volatility-range measure in price units.  True Range per bar:
//
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is the smoothed average of TR with the same discipline as the RSI:
//   ATR_0 = SMA of the first `period` TR values
//   ATR_t = (ATR_{t-1} * (period - 1) + TR_t) / period
// =============================================================================

use crate::types::DailyBar;

/// True range of `bar` given the previous bar's close.
pub fn true_range(bar: &DailyBar, prev_close: f64) -> f64 {
    let hl = bar.high - bar.low;
    let hc = (bar.high - prev_close).abs();
    let lc = (bar.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Compute the full ATR series for `bars` (oldest first).
///
/// The first value belongs to bar index `period`, so `series[i]` aligns with
/// `bars[period + i]`.  Values are non-negative wherever defined.
///
/// # Edge cases
/// - `period == 0` or fewer than `period + 1` bars => empty vec (each TR
///   needs a previous close, and `period` TR values seed the average).
/// - A non-finite intermediate truncates the series at that point.
pub fn atr_series(bars: &[DailyBar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return Vec::new();
    }

    let period_f = period as f64;

    // Seed with the simple average of the first `period` true ranges.
    let mut seed = 0.0;
    for i in 1..=period {
        seed += true_range(&bars[i], bars[i - 1].close);
    }
    let mut atr = seed / period_f;

    let mut series = Vec::with_capacity(bars.len() - period);
    if !atr.is_finite() {
        return series;
    }
    series.push(atr);

    for i in (period + 1)..bars.len() {
        let tr = true_range(&bars[i], bars[i - 1].close);
        atr = (atr * (period_f - 1.0) + tr) / period_f;
        if !atr.is_finite() {
            break;
        }
        series.push(atr);
    }

    series
}

/// Most recent ATR value, if the series is computable at all.
pub fn latest_atr(bars: &[DailyBar], period: usize) -> Option<f64> {
    atr_series(bars, period).last().copied()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bars_from_ohlc(ohlc: &[(f64, f64, f64, f64)]) -> Vec<DailyBar> {
        let start: NaiveDate = "2025-06-02".parse().unwrap();
        ohlc.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| DailyBar {
                date: start + Duration::days(i as i64),
                open,
                high,
                low,
                close,
                volume: 1_000,
            })
            .collect()
    }

    fn symmetric_bars(count: usize, spread: f64) -> Vec<DailyBar> {
        let ohlc: Vec<(f64, f64, f64, f64)> = (0..count)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.1;
                (base, base + spread, base - spread, base)
            })
            .collect();
        bars_from_ohlc(&ohlc)
    }

    #[test]
    fn period_zero_yields_empty_series() {
        assert!(atr_series(&symmetric_bars(20, 5.0), 0).is_empty());
    }

    #[test]
    fn insufficient_data_yields_empty_series() {
        assert!(atr_series(&symmetric_bars(10, 5.0), 14).is_empty());
        assert!(latest_atr(&symmetric_bars(10, 5.0), 14).is_none());
    }

    #[test]
    fn series_alignment_offset() {
        // 30 bars, period 14 => 16 samples.
        assert_eq!(atr_series(&symmetric_bars(30, 5.0), 14).len(), 16);
    }

    #[test]
    fn constant_range_converges_to_that_range() {
        // Every bar spans H-L = 10 with closes at the midpoint.
        let atr = latest_atr(&symmetric_bars(30, 5.0), 14).unwrap();
        assert!((atr - 10.0).abs() < 1.0, "expected ATR near 10.0, got {atr}");
    }

    #[test]
    fn values_are_non_negative() {
        let ohlc: Vec<(f64, f64, f64, f64)> = (0..50)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.5).sin() * 10.0;
                (base - 0.5, base + 2.0, base - 2.0, base + 0.5)
            })
            .collect();
        let series = atr_series(&bars_from_ohlc(&ohlc), 14);
        assert!(!series.is_empty());
        for v in series {
            assert!(v >= 0.0, "ATR must be non-negative, got {v}");
        }
    }

    #[test]
    fn gap_days_use_previous_close() {
        // Overnight gap: |H - prevClose| exceeds the intraday range.
        let bars = bars_from_ohlc(&[
            (100.0, 105.0, 95.0, 95.0),
            (110.0, 115.0, 108.0, 112.0), // |115 - 95| = 20 > 115 - 108 = 7
            (112.0, 118.0, 110.0, 115.0),
            (115.0, 120.0, 113.0, 118.0),
        ]);
        assert!((true_range(&bars[1], bars[0].close) - 20.0).abs() < f64::EPSILON);
        let atr = latest_atr(&bars, 3).unwrap();
        assert!(atr > 7.0, "ATR should reflect the gap, got {atr}");
    }

    #[test]
    fn non_finite_input_truncates() {
        let mut bars = symmetric_bars(6, 2.0);
        bars[1].high = f64::NAN;
        assert!(atr_series(&bars, 5).is_empty());
        assert!(latest_atr(&bars, 5).is_none());
    }
}
