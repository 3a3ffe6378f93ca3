// =============================================================================
// Overextension measurement — distance of price from a recent swing low
// =============================================================================
//
// The central derived signal: take the swing low of the previous `L` bars
// (the current bar is excluded), raise it by a configurable multiple of the
// volatility measure, and ask whether the latest close has climbed past that
// threshold.  Proximity expresses how far price has travelled from the swing
// low toward the threshold regardless of whether it has been crossed.
// =============================================================================

use crate::types::DailyBar;

/// A fully-populated overextension measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct OverextensionMeasure {
    /// Lowest low of the previous `L` bars.
    pub swing_low: f64,
    /// Highest high of the previous `L` bars.
    pub swing_high: f64,
    /// Volatility measure the threshold was built from.
    pub atr: f64,
    /// `atr * multiplier`.
    pub atr_contribution: f64,
    /// `swing_low + atr_contribution`.
    pub threshold: f64,
    /// Most recent close.
    pub current_price: f64,
    /// `current_price - threshold` in price units.
    pub distance_from_threshold: f64,
    /// Distance as a percentage of the threshold; undefined when the
    /// threshold is zero or negative.
    pub distance_pct: Option<f64>,
    /// Position of price between swing low (0) and threshold (100), clamped.
    pub proximity_pct: f64,
    /// `swing_high - swing_low`, for downstream diagnostics.
    pub price_range: f64,
    /// Strict inequality — price exactly at the threshold is not
    /// overextended.
    pub is_overextended: bool,
}

/// Outcome of the measurement: either every field is populated, or the
/// inputs were insufficient and no partial numbers are reported.
#[derive(Debug, Clone, PartialEq)]
pub enum Overextension {
    Invalid,
    Valid(OverextensionMeasure),
}

impl Overextension {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn measure(&self) -> Option<&OverextensionMeasure> {
        match self {
            Self::Valid(m) => Some(m),
            Self::Invalid => None,
        }
    }
}

/// Measure overextension of the latest close against the swing low of the
/// previous `lookback_days` bars.
///
/// Returns [`Overextension::Invalid`] when fewer than `lookback_days + 1`
/// bars exist or when `atr` is missing or non-finite.
pub fn check_overextended(
    bars: &[DailyBar],
    atr: Option<f64>,
    lookback_days: usize,
    atr_multiplier: f64,
) -> Overextension {
    if lookback_days == 0 || bars.len() < lookback_days + 1 {
        return Overextension::Invalid;
    }
    let atr = match atr {
        Some(v) if v.is_finite() => v,
        _ => return Overextension::Invalid,
    };

    // Last lookback + 1 bars; the swing is taken from the previous
    // `lookback_days` of them, excluding the current bar.
    let recent = &bars[bars.len() - (lookback_days + 1)..];
    let previous = &recent[..lookback_days];

    let swing_low = previous.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let swing_high = previous
        .iter()
        .map(|b| b.high)
        .fold(f64::NEG_INFINITY, f64::max);
    let current_price = recent[lookback_days].close;

    let atr_contribution = atr * atr_multiplier;
    let threshold = swing_low + atr_contribution;
    let distance_from_threshold = current_price - threshold;

    // A zero or negative threshold makes the percentage meaningless; the
    // overextension verdict then defaults to false.
    let (distance_pct, is_overextended) = if threshold > 0.0 {
        (
            Some(distance_from_threshold / threshold * 100.0),
            current_price > threshold,
        )
    } else {
        (None, false)
    };

    let proximity_pct = if threshold > swing_low {
        ((current_price - swing_low) / (threshold - swing_low) * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    Overextension::Valid(OverextensionMeasure {
        swing_low,
        swing_high,
        atr,
        atr_contribution,
        threshold,
        current_price,
        distance_from_threshold,
        distance_pct,
        proximity_pct,
        price_range: swing_high - swing_low,
        is_overextended,
    })
}
