//! Latency aggregation and rate reporting
//!
//! Accumulation itself happens in the shared region (the handler is the
//! writer, for cross-process visibility); this module only derives the
//! reported figures from a snapshot.

pub const NANOS_PER_SEC: f64 = 1e9;

/// Snapshot of the accumulators at reporting time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub samples: f64,
    pub total_latency_secs: f64,
}

impl LatencySummary {
    /// Mean per-delivery latency in seconds, `0.0` when nothing was
    /// recorded.
    pub fn mean_secs(&self) -> f64 {
        if self.samples > 0.0 {
            self.total_latency_secs / self.samples
        } else {
            0.0
        }
    }

    /// The reported metric: mean nanoseconds per delivery.
    pub fn mean_nanos(&self) -> f64 {
        self.mean_secs() * NANOS_PER_SEC
    }
}

/// Combine per-instance mean-latency figures as rates. Zero and
/// non-finite entries are skipped; an empty set combines to `0.0`.
pub fn harmonic_mean(rates: &[f64]) -> f64 {
    let mut n = 0.0;
    let mut reciprocals = 0.0;
    for &rate in rates {
        if rate.is_finite() && rate > 0.0 {
            n += 1.0;
            reciprocals += 1.0 / rate;
        }
    }
    if n > 0.0 && reciprocals > 0.0 {
        n / reciprocals
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mean_is_zero_without_samples() {
        let summary = LatencySummary {
            samples: 0.0,
            total_latency_secs: 0.0,
        };
        assert_eq!(summary.mean_secs(), 0.0);
        assert_eq!(summary.mean_nanos(), 0.0);
    }

    #[test]
    fn test_mean_nanos_scales_seconds() {
        let summary = LatencySummary {
            samples: 4.0,
            total_latency_secs: 0.002,
        };
        assert_eq!(summary.mean_secs(), 0.0005);
        assert_eq!(summary.mean_nanos(), 500_000.0);
    }

    #[test]
    fn test_harmonic_mean_empty_and_degenerate() {
        assert_eq!(harmonic_mean(&[]), 0.0);
        assert_eq!(harmonic_mean(&[0.0, 0.0]), 0.0);
        assert_eq!(harmonic_mean(&[f64::NAN, f64::INFINITY]), 0.0);
    }

    #[test]
    fn test_harmonic_mean_of_equal_rates() {
        let hm = harmonic_mean(&[250.0, 250.0, 250.0]);
        assert!((hm - 250.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_harmonic_mean_is_bounded_by_extremes(
            rates in proptest::collection::vec(1.0f64..1e6, 1..16)
        ) {
            let hm = harmonic_mean(&rates);
            let min = rates.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = rates.iter().cloned().fold(0.0f64, f64::max);
            prop_assert!(hm >= min * (1.0 - 1e-12));
            prop_assert!(hm <= max * (1.0 + 1e-12));
        }

        #[test]
        fn prop_zero_entries_do_not_drag_the_mean(
            rates in proptest::collection::vec(1.0f64..1e6, 1..8)
        ) {
            let mut padded = rates.clone();
            padded.push(0.0);
            prop_assert_eq!(harmonic_mean(&rates), harmonic_mean(&padded));
        }
    }
}
