//! Small statistics helpers for reporters: mean, sample deviation, and
//! symmetric percentile trimming.
//!
//! The measurement engine publishes raw sample sequences and never trims
//! them itself; these helpers are what the reference reporter (and external
//! ones) use to condense a sequence into a table cell.

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Sample variance (n-1 denominator); 0 with fewer than two samples.
pub fn variance(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let center = mean(samples);
    let sum_sq: f64 = samples.iter().map(|s| (s - center).powi(2)).sum();
    sum_sq / (samples.len() - 1) as f64
}

/// Sample standard deviation.
pub fn std_dev(samples: &[f64]) -> f64 {
    variance(samples).sqrt()
}

/// Drop samples outside the `[fraction, 1 - fraction]` percentile band.
///
/// Both tails are trimmed with thresholds computed from the same pooled
/// sequence, so the trim cannot skew a comparison between cases. A
/// `fraction` of zero (or anything non-positive) returns all samples.
pub fn trim_outliers(samples: &[f64], fraction: f64) -> Vec<f64> {
    if fraction <= 0.0 || samples.len() < 2 {
        return samples.to_vec();
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let low = percentile(&sorted, fraction.min(0.5));
    let high = percentile(&sorted, (1.0 - fraction).max(0.5));
    samples
        .iter()
        .copied()
        .filter(|&s| s >= low && s <= high)
        .collect()
}

/// Value at a percentile of sorted data, with linear interpolation.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let clamped = p.clamp(0.0, 1.0);
    let position = clamped * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let fraction = position - lower as f64;
        sorted[lower] + fraction * (sorted[upper] - sorted[lower])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_deviation() {
        let samples = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&samples) - 5.0).abs() < 1e-12);
        assert!((std_dev(&samples) - 2.138).abs() < 1e-3);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(variance(&[3.0]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
    }

    #[test]
    fn test_trim_drops_both_tails() {
        let mut samples: Vec<f64> = (1..=100).map(f64::from).collect();
        samples.push(10_000.0);
        samples.insert(0, -10_000.0);

        let trimmed = trim_outliers(&samples, 0.05);
        assert!(!trimmed.contains(&10_000.0));
        assert!(!trimmed.contains(&-10_000.0));
        assert!(trimmed.contains(&50.0));
    }

    #[test]
    fn test_trim_zero_fraction_keeps_everything() {
        let samples = [5.0, 1.0, 9.0];
        assert_eq!(trim_outliers(&samples, 0.0), samples.to_vec());
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&sorted, 0.0), 10.0);
        assert_eq!(percentile(&sorted, 1.0), 40.0);
        assert!((percentile(&sorted, 0.5) - 25.0).abs() < 1e-12);
    }
}
