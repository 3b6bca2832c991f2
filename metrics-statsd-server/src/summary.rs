//! Summary statistics for timers.

/// Summary of the timer observations collected over a single interval.
///
/// Along with the usual minimum, maximum, and count, the summary holds a truncated mean and a "maximum at threshold":
/// with a percentile threshold of `p`, only the smallest `round(p% * n)` observations are considered for those two
/// values, which discards outliers at the top end.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimerSummary {
    /// Mean of the observations under the threshold.
    pub mean: f64,

    /// Largest observation.
    pub upper: f64,

    /// Largest observation under the threshold.
    pub upper_threshold: f64,

    /// Smallest observation.
    pub lower: f64,

    /// Number of observations.
    pub count: usize,
}

impl TimerSummary {
    /// Summarizes the given observations, using the given percentile threshold.
    ///
    /// The observations are sorted in place. Returns `None` if there are no observations.
    ///
    /// The cut-off index is `(percent_threshold / 100) * count`, rounded half away from zero, so that a threshold of
    /// 50% over five observations keeps the three smallest. If the cut-off rounds down to zero, the mean falls back to
    /// the smallest observation and the maximum at threshold falls back to the largest one.
    pub fn from_values(values: &mut [f64], percent_threshold: f64) -> Option<TimerSummary> {
        if values.is_empty() {
            return None;
        }

        values.sort_unstable_by(f64::total_cmp);

        let count = values.len();
        let lower = values[0];
        let upper = values[count - 1];

        let mut mean = lower;
        let mut upper_threshold = upper;

        if count > 1 {
            let idx = threshold_index(percent_threshold, count);
            let truncated = &values[..idx];
            if let Some(last) = truncated.last() {
                upper_threshold = *last;
                mean = truncated.iter().sum::<f64>() / idx as f64;
            }
        }

        Some(TimerSummary { mean, upper, upper_threshold, lower, count })
    }
}

/// Number of sorted observations kept under the given percentile threshold.
fn threshold_index(percent_threshold: f64, count: usize) -> usize {
    let idx = ((percent_threshold / 100.0) * count as f64).round();
    if idx <= 0.0 {
        0
    } else {
        (idx as usize).min(count)
    }
}

#[cfg(test)]
mod tests {
    use super::{threshold_index, TimerSummary};

    #[test]
    fn empty_values() {
        assert_eq!(TimerSummary::from_values(&mut [], 90.0), None);
    }

    #[test]
    fn single_value() {
        for pct in [1.0, 50.0, 90.0, 100.0] {
            let summary = TimerSummary::from_values(&mut [42.0], pct).unwrap();
            assert_eq!(
                summary,
                TimerSummary { mean: 42.0, upper: 42.0, upper_threshold: 42.0, lower: 42.0, count: 1 }
            );
        }
    }

    #[test]
    fn ninetieth_percentile_of_ten() {
        let mut values = [100.0, 30.0, 10.0, 60.0, 20.0, 90.0, 50.0, 40.0, 80.0, 70.0];
        let summary = TimerSummary::from_values(&mut values, 90.0).unwrap();

        assert_eq!(summary.upper_threshold, 90.0);
        assert_eq!(summary.upper, 100.0);
        assert_eq!(summary.lower, 10.0);
        assert_eq!(summary.count, 10);
        assert!((summary.mean - 450.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn full_threshold_uses_every_value() {
        let mut values = [1.0, 2.0, 3.0, 4.0];
        let summary = TimerSummary::from_values(&mut values, 100.0).unwrap();

        assert_eq!(summary.upper_threshold, 4.0);
        assert_eq!(summary.mean, 2.5);
    }

    #[test]
    fn threshold_rounding_is_half_away_from_zero() {
        // 50% of 5 is exactly 2.5, which rounds up to 3.
        assert_eq!(threshold_index(50.0, 5), 3);
        // 50% of 3 is 1.5, which rounds up to 2.
        assert_eq!(threshold_index(50.0, 3), 2);
        assert_eq!(threshold_index(90.0, 10), 9);
        assert_eq!(threshold_index(100.0, 7), 7);

        let mut values = [5.0, 4.0, 3.0, 2.0, 1.0];
        let summary = TimerSummary::from_values(&mut values, 50.0).unwrap();
        assert_eq!(summary.upper_threshold, 3.0);
        assert_eq!(summary.mean, 2.0);
    }

    #[test]
    fn threshold_rounding_to_zero_keeps_defaults() {
        assert_eq!(threshold_index(10.0, 2), 0);

        let mut values = [8.0, 2.0];
        let summary = TimerSummary::from_values(&mut values, 10.0).unwrap();
        assert_eq!(
            summary,
            TimerSummary { mean: 2.0, upper: 8.0, upper_threshold: 8.0, lower: 2.0, count: 2 }
        );
    }
}
