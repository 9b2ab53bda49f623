//! Robust location and dispersion statistics.

/// Median of `values`; the mean of the two middle values for even lengths.
///
/// Reorders `values` in place. Returns None for an empty slice.
pub fn median(values: &mut [u64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable(mid);
    let upper = *upper as f64;
    if n % 2 == 1 {
        return Some(upper);
    }
    let lower = lower.iter().max().copied().map(|v| v as f64)?;
    Some((lower + upper) / 2.0)
}

/// Median absolute deviation of `values` around `center`, unscaled.
pub fn median_abs_deviation(values: &[u64], center: f64) -> Option<f64> {
    let mut deviations: Vec<f64> = values.iter().map(|&v| (v as f64 - center).abs()).collect();
    let n = deviations.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let (lower, upper, _) = deviations.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        return Some(upper);
    }
    let lower = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((lower + upper) / 2.0)
}

/// Depth bounds derived from median and MAD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBounds {
    /// Median depth, rounded half away from zero
    pub median: i64,
    /// MAD around the unrounded median, rounded half away from zero
    pub mad: i64,
    pub min: f64,
    pub max: f64,
}

impl DepthBounds {
    /// Compute `median ± multiplier·MAD`. Reorders `depths` in place.
    pub fn from_depths(depths: &mut [u64], multiplier: f64) -> Option<Self> {
        let center = median(depths)?;
        let mad = median_abs_deviation(depths, center)?;
        let median = center.round() as i64;
        let mad = mad.round() as i64;
        Some(Self {
            median,
            mad,
            min: median as f64 - mad as f64 * multiplier,
            max: median as f64 + mad as f64 * multiplier,
        })
    }

    /// Check whether `depth` falls outside the bounds.
    #[inline]
    pub fn is_outlier(&self, depth: u64) -> bool {
        let depth = depth as f64;
        depth < self.min || depth > self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&mut [5, 1, 3]), Some(3.0));
        assert_eq!(median(&mut [4, 1, 3, 2]), Some(2.5));
        assert_eq!(median(&mut [7]), Some(7.0));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn test_mad() {
        // deviations from 3: 2, 1, 0, 1, 7 -> median 1
        assert_eq!(median_abs_deviation(&[1, 2, 3, 4, 10], 3.0), Some(1.0));
        // deviations from 2.5: 1.5, 0.5, 0.5, 1.5 -> median 1.0
        assert_eq!(median_abs_deviation(&[1, 2, 3, 4], 2.5), Some(1.0));
        assert_eq!(median_abs_deviation(&[], 0.0), None);
    }

    #[test]
    fn test_bounds() {
        let mut depths = vec![10, 11, 9, 10, 12, 8, 10, 50, 0];
        let bounds = DepthBounds::from_depths(&mut depths, 3.0).unwrap();

        assert_eq!(bounds.median, 10);
        assert_eq!(bounds.mad, 1);
        assert_eq!(bounds.min, 7.0);
        assert_eq!(bounds.max, 13.0);
        assert!(bounds.is_outlier(50));
        assert!(bounds.is_outlier(0));
        assert!(!bounds.is_outlier(7));
        assert!(!bounds.is_outlier(13));
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        // median 2.5 -> 3
        let bounds = DepthBounds::from_depths(&mut [2, 3], 1.0).unwrap();
        assert_eq!(bounds.median, 3);
        // deviations 0.5, 0.5 -> MAD 0.5 -> 1
        assert_eq!(bounds.mad, 1);
    }
}
