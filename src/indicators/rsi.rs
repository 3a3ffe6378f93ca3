// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Bounded 0–100 momentum oscillator over smoothed average gains/losses.
//
// Step 1 — Price deltas between consecutive closes.
// Step 2 — Seed average gain / average loss with the SMA of the first
//          `period` deltas.
// Step 3 — Wilder's exponential smoothing:
//            avg = (prev_avg * (period - 1) + current) / period
// Step 4 — RS = avg_gain / avg_loss, RSI = 100 - 100 / (1 + RS)
// =============================================================================

/// Compute the full RSI series for `closes`.
///
/// The first value belongs to close index `period` (the first `period` deltas
/// are consumed to seed the averages), so `series[i]` aligns with
/// `closes[period + i]`.
///
/// # Edge cases
/// - `period == 0` or fewer than `period + 1` closes => empty vec.
/// - Zero average loss (only gains) => 100.0; no movement at all => 50.0.
/// - A non-finite intermediate truncates the series at that point.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let period_f = period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    // Seed with the simple average of the first `period` gains/losses.
    for w in closes[..=period].windows(2) {
        let delta = w[1] - w[0];
        if delta > 0.0 {
            avg_gain += delta;
        } else {
            avg_loss += delta.abs();
        }
    }
    avg_gain /= period_f;
    avg_loss /= period_f;

    let mut series = Vec::with_capacity(closes.len() - period);
    match rsi_value(avg_gain, avg_loss) {
        Some(v) => series.push(v),
        None => return series,
    }

    // Wilder smoothing for every subsequent close.
    for w in closes[period..].windows(2) {
        let delta = w[1] - w[0];
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_value(avg_gain, avg_loss) {
            Some(v) => series.push(v),
            None => break,
        }
    }

    series
}

/// Most recent RSI value, if the series is computable at all.
pub fn latest_rsi(closes: &[f64], period: usize) -> Option<f64> {
    rsi_series(closes, period).last().copied()
}

/// Convert smoothed averages into an RSI value in [0, 100].
///
/// Both averages zero (flat market) => 50.0.  Zero loss => 100.0.
fn rsi_value(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}
