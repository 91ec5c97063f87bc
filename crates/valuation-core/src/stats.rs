//! Small numeric helpers shared by the valuation models.
//!
//! All functions are total: empty or degenerate input yields `None` (or a
//! neutral value) instead of NaN, so callers can decide on their own fallback.

/// Compute the mean of a data slice, `None` when empty.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Compound annual growth rate between `oldest` and `latest` over `periods`
/// years, as a fraction. Requires both endpoints to be strictly positive.
pub fn cagr(latest: f64, oldest: f64, periods: usize) -> Option<f64> {
    if periods == 0
        || latest <= 0.0
        || oldest <= 0.0
        || !latest.is_finite()
        || !oldest.is_finite()
    {
        return None;
    }
    Some((latest / oldest).powf(1.0 / periods as f64) - 1.0)
}

/// Year-over-year changes for a most-recent-first series, returned
/// oldest-to-newest. Pairs with a non-positive base are skipped.
pub fn yoy_changes(series_recent_first: &[f64]) -> Vec<f64> {
    series_recent_first
        .windows(2)
        .rev()
        .filter(|w| w[1] > 0.0)
        .map(|w| (w[0] - w[1]) / w[1])
        .collect()
}

/// Sort, drop `fraction` of the observations from each end, average the rest.
/// Trimming only applies when at least `min_len_for_trim` values are present,
/// and then removes at least one value from each end.
pub fn trimmed_mean(values: &[f64], fraction: f64, min_len_for_trim: usize) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.len() >= min_len_for_trim {
        let k = ((sorted.len() as f64 * fraction).floor() as usize).max(1);
        if sorted.len() > 2 * k {
            sorted = sorted[k..sorted.len() - k].to_vec();
        }
    }
    mean(&sorted)
}

/// Linear interpolation from `from` to `to` at weight `w` in [0, 1].
pub fn lerp(from: f64, to: f64, w: f64) -> f64 {
    from + (to - from) * w
}

/// Relative distance between two values, guarded against a zero reference.
pub fn relative_change(previous: f64, current: f64) -> f64 {
    let base = previous.abs().max(f64::EPSILON);
    (current - previous).abs() / base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cagr() {
        let g = cagr(121.0, 100.0, 2).unwrap();
        assert!((g - 0.10).abs() < 1e-9);
        assert!(cagr(100.0, 0.0, 2).is_none());
        assert!(cagr(100.0, 50.0, 0).is_none());
    }

    #[test]
    fn test_yoy_changes_are_oldest_first() {
        let changes = yoy_changes(&[120.0, 100.0, 80.0]);
        assert_eq!(changes.len(), 2);
        assert!((changes[0] - 0.25).abs() < 1e-9);
        assert!((changes[1] - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_trimmed_mean_drops_extremes() {
        let values = vec![2.0, 5.0, 6.0, 7.0, 14.0];
        // 20% of 5 = 1 value trimmed from each end
        let m = trimmed_mean(&values, 0.2, 3).unwrap();
        assert!((m - 6.0).abs() < 1e-9);

        // Below the trim threshold every value counts
        let m = trimmed_mean(&[2.0, 4.0], 0.2, 3).unwrap();
        assert!((m - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_trimmed_mean_small_sets_still_trim() {
        // floor(4 × 0.2) = 0, but one value still goes from each end
        let m = trimmed_mean(&[14.0, 3.0, 6.0, 5.0], 0.2, 3).unwrap();
        assert!((m - 5.5).abs() < 1e-9);

        let m = trimmed_mean(&[3.0, 5.0, 14.0], 0.2, 3).unwrap();
        assert!((m - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_lerp_endpoints() {
        assert_eq!(lerp(18.0, 5.0, 0.0), 18.0);
        assert_eq!(lerp(18.0, 5.0, 1.0), 5.0);
    }
}
