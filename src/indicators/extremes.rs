// =============================================================================
// Oscillator extreme check over a recent lookback window
// =============================================================================

/// Result of scanning the most recent oscillator samples for extremes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtremeCheck {
    pub hit_high: bool,
    pub hit_low: bool,
    pub max_value: Option<f64>,
    pub min_value: Option<f64>,
}

impl ExtremeCheck {
    fn none() -> Self {
        Self {
            hit_high: false,
            hit_low: false,
            max_value: None,
            min_value: None,
        }
    }
}

/// Inspect the last `lookback` valid samples of `values`.
///
/// `hit_high` iff the window maximum is at or above `high_threshold`;
/// `hit_low` iff the window minimum is at or below `low_threshold`.
///
/// Fewer than `lookback` valid (finite) samples yields no extreme in either
/// direction — a short window must never produce a false positive.
pub fn check_extremes(
    values: &[f64],
    lookback: usize,
    high_threshold: f64,
    low_threshold: f64,
) -> ExtremeCheck {
    if lookback == 0 {
        return ExtremeCheck::none();
    }

    let valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.len() < lookback {
        return ExtremeCheck::none();
    }

    let recent = &valid[valid.len() - lookback..];
    let max_value = recent.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_value = recent.iter().copied().fold(f64::INFINITY, f64::min);

    ExtremeCheck {
        hit_high: max_value >= high_threshold,
        hit_low: min_value <= low_threshold,
        max_value: Some(max_value),
        min_value: Some(min_value),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_window_never_flags() {
        let check = check_extremes(&[95.0, 96.0, 97.0], 7, 90.0, 10.0);
        assert!(!check.hit_high);
        assert!(!check.hit_low);
        assert!(check.max_value.is_none());
        assert!(check.min_value.is_none());
    }

    #[test]
    fn zero_lookback_never_flags() {
        let check = check_extremes(&[95.0; 10], 0, 90.0, 10.0);
        assert!(!check.hit_high && !check.hit_low);
    }

    #[test]
    fn high_extreme_at_threshold_counts() {
        let values = vec![50.0, 55.0, 60.0, 70.0, 80.0, 85.0, 90.0];
        let check = check_extremes(&values, 7, 90.0, 10.0);
        assert!(check.hit_high);
        assert!(!check.hit_low);
        assert_eq!(check.max_value, Some(90.0));
    }

    #[test]
    fn low_extreme_at_threshold_counts() {
        let values = vec![50.0, 40.0, 30.0, 20.0, 15.0, 12.0, 10.0];
        let check = check_extremes(&values, 7, 90.0, 10.0);
        assert!(check.hit_low);
        assert!(!check.hit_high);
        assert_eq!(check.min_value, Some(10.0));
    }

    #[test]
    fn only_recent_samples_are_inspected() {
        // The 95.0 falls outside the 3-sample lookback.
        let values = vec![95.0, 50.0, 51.0, 52.0];
        let check = check_extremes(&values, 3, 90.0, 10.0);
        assert!(!check.hit_high);
        assert_eq!(check.max_value, Some(52.0));
    }

    #[test]
    fn non_finite_samples_do_not_count_toward_lookback() {
        // Three finite samples plus a NaN: lookback 4 has too few valid
        // values and must not flag.
        let values = vec![95.0, f64::NAN, 96.0, 97.0];
        let check = check_extremes(&values, 4, 90.0, 10.0);
        assert!(!check.hit_high);
        assert!(check.max_value.is_none());
    }

    #[test]
    fn both_directions_can_flag_together() {
        let values = vec![95.0, 5.0, 50.0];
        let check = check_extremes(&values, 3, 90.0, 10.0);
        assert!(check.hit_high);
        assert!(check.hit_low);
    }
}
