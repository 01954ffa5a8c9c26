//! Outlier rejection and confidence intervals over latency samples.

use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Interquartile-range outlier filter (Tukey fences at 1.5 * IQR).
///
/// Keeps samples within `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]` inclusive, in their
/// input order. Inputs with fewer than four samples come back unchanged:
/// quartiles carry no information at that size.
pub fn iqr_filter(samples: &[f64]) -> Vec<f64> {
    if samples.len() < 4 {
        return samples.to_vec();
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let spread = 1.5 * (q3 - q1);
    let (lo, hi) = (q1 - spread, q3 + spread);
    samples
        .iter()
        .copied()
        .filter(|&s| s >= lo && s <= hi)
        .collect()
}

/// Linearly interpolated quantile over a sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let base = pos.floor() as usize;
    let rest = pos - base as f64;
    if base + 1 < sorted.len() {
        sorted[base] + rest * (sorted[base + 1] - sorted[base])
    } else {
        sorted[base]
    }
}

pub fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// A two-sided Student-t interval around a sample mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
    /// Samples the interval was computed over.
    pub n: usize,
}

/// Mean and Student-t interval of `samples` at `confidence` (e.g. 0.95).
///
/// A single measurement has no spread to estimate, so fewer than two
/// samples is `InsufficientSamples`; callers report that as an undefined
/// interval, never a zero-width one. Zero variance yields a zero margin.
pub fn confidence_interval(samples: &[f64], confidence: f64) -> CoreResult<ConfidenceInterval> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(CoreError::BadConfidence(confidence));
    }
    let n = samples.len();
    if n < 2 {
        return Err(CoreError::InsufficientSamples(n));
    }

    let mean = mean(samples);
    let variance =
        samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return Ok(ConfidenceInterval {
            mean,
            lower: mean,
            upper: mean,
            n,
        });
    }

    let t = StudentsT::new(0.0, 1.0, (n - 1) as f64)
        .map_err(|e| CoreError::Stats(e.to_string()))?
        .inverse_cdf((1.0 + confidence) / 2.0);
    let margin = t * std_dev / (n as f64).sqrt();
    Ok(ConfidenceInterval {
        mean,
        lower: mean - margin,
        upper: mean + margin,
        n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iqr_removes_the_spike() {
        let samples = [10.0, 11.0, 9.0, 10.0, 50.0, 10.0, 11.0];
        let kept = iqr_filter(&samples);
        assert_eq!(kept, vec![10.0, 11.0, 9.0, 10.0, 10.0, 11.0]);
    }

    #[test]
    fn iqr_is_idempotent_once_clean() {
        let kept = iqr_filter(&[10.0, 11.0, 9.0, 10.0, 50.0, 10.0, 11.0]);
        assert_eq!(iqr_filter(&kept), kept);
    }

    #[test]
    fn iqr_leaves_small_inputs_alone() {
        let samples = [100.0, 1.0, 3.0];
        assert_eq!(iqr_filter(&samples), samples.to_vec());
    }

    #[test]
    fn iqr_keeps_identical_samples() {
        let samples = [5.0; 8];
        assert_eq!(iqr_filter(&samples).len(), 8);
    }

    #[test]
    fn interval_matches_hand_computation() {
        // filtered warm samples from the spike case above
        let samples = [10.0, 11.0, 9.0, 10.0, 10.0, 11.0];
        let ci = confidence_interval(&samples, 0.95).unwrap();
        assert!((ci.mean - 61.0 / 6.0).abs() < 1e-12);
        // t(0.975, df = 5) = 2.5706, sd = 0.7528, se = 0.3073
        assert!((ci.upper - ci.mean - 0.79).abs() < 0.01);
        assert!((ci.mean - ci.lower - 0.79).abs() < 0.01);
        assert_eq!(ci.n, 6);
    }

    #[test]
    fn zero_variance_gives_zero_margin() {
        let ci = confidence_interval(&[4.0, 4.0, 4.0], 0.95).unwrap();
        assert_eq!(ci.lower, ci.mean);
        assert_eq!(ci.upper, ci.mean);
    }

    #[test]
    fn single_sample_is_insufficient_not_zero_width() {
        assert!(matches!(
            confidence_interval(&[12.0], 0.95),
            Err(CoreError::InsufficientSamples(1))
        ));
        assert!(matches!(
            confidence_interval(&[], 0.95),
            Err(CoreError::InsufficientSamples(0))
        ));
    }

    #[test]
    fn confidence_must_be_a_probability() {
        assert!(matches!(
            confidence_interval(&[1.0, 2.0], 1.0),
            Err(CoreError::BadConfidence(_))
        ));
        assert!(matches!(
            confidence_interval(&[1.0, 2.0], 0.0),
            Err(CoreError::BadConfidence(_))
        ));
    }

    #[test]
    fn wider_confidence_means_wider_interval() {
        let samples = [8.0, 9.5, 10.0, 10.5, 12.0];
        let narrow = confidence_interval(&samples, 0.90).unwrap();
        let wide = confidence_interval(&samples, 0.99).unwrap();
        assert!(wide.upper - wide.lower > narrow.upper - narrow.lower);
    }
}
