//! Regression metrics for held-out evaluation.
//!
//! Each metric is a unit struct implementing [`MetricFn`]; [`RegressionMetrics`]
//! bundles the four reported per learner and for the blended ensemble.

use std::fmt;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// A regression metric over predictions and targets.
///
/// Accumulation happens in `f64`. Returns `f64::NAN` when the metric is
/// undefined for the input (e.g. no rows).
pub trait MetricFn: Send + Sync {
    fn compute(&self, predictions: &[f64], targets: ArrayView1<'_, f32>) -> f64;

    /// Name of the metric (for logging).
    fn name(&self) -> &'static str;
}

// =============================================================================
// RMSE
// =============================================================================

/// Root Mean Squared Error: sqrt(mean((pred - label)²))
#[derive(Debug, Clone, Copy, Default)]
pub struct Rmse;

impl MetricFn for Rmse {
    fn compute(&self, predictions: &[f64], targets: ArrayView1<'_, f32>) -> f64 {
        if predictions.is_empty() {
            return f64::NAN;
        }
        let sum_sq: f64 = predictions
            .iter()
            .zip(targets.iter())
            .map(|(&p, &t)| {
                let diff = p - t as f64;
                diff * diff
            })
            .sum();
        (sum_sq / predictions.len() as f64).sqrt()
    }

    fn name(&self) -> &'static str {
        "rmse"
    }
}

// =============================================================================
// MAE
// =============================================================================

/// Mean Absolute Error: mean(|pred - label|)
#[derive(Debug, Clone, Copy, Default)]
pub struct Mae;

impl MetricFn for Mae {
    fn compute(&self, predictions: &[f64], targets: ArrayView1<'_, f32>) -> f64 {
        if predictions.is_empty() {
            return f64::NAN;
        }
        let sum_ae: f64 = predictions
            .iter()
            .zip(targets.iter())
            .map(|(&p, &t)| (p - t as f64).abs())
            .sum();
        sum_ae / predictions.len() as f64
    }

    fn name(&self) -> &'static str {
        "mae"
    }
}

// =============================================================================
// R²
// =============================================================================

/// Coefficient of determination: 1 - SS_res / SS_tot.
///
/// With zero target variance the score is 1.0 for a perfect fit and 0.0
/// otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct RSquared;

impl MetricFn for RSquared {
    fn compute(&self, predictions: &[f64], targets: ArrayView1<'_, f32>) -> f64 {
        let n = predictions.len();
        if n == 0 {
            return f64::NAN;
        }
        let mean = targets.iter().map(|&t| t as f64).sum::<f64>() / n as f64;
        let (ss_res, ss_tot) = predictions.iter().zip(targets.iter()).fold(
            (0.0f64, 0.0f64),
            |(res, tot), (&p, &t)| {
                let t = t as f64;
                (res + (t - p) * (t - p), tot + (t - mean) * (t - mean))
            },
        );
        if ss_tot == 0.0 {
            return if ss_res == 0.0 { 1.0 } else { 0.0 };
        }
        1.0 - ss_res / ss_tot
    }

    fn name(&self) -> &'static str {
        "r2"
    }
}

// =============================================================================
// MAPE
// =============================================================================

/// Treatment of zero targets in MAPE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapePolicy {
    /// Rows with a zero target are left out.
    #[default]
    SkipZeroTargets,
    /// Denominators are clamped to at least this value.
    Epsilon(f64),
}

/// Mean Absolute Percentage Error: mean(|pred - label| / |label|) * 100
#[derive(Debug, Clone, Copy, Default)]
pub struct Mape {
    pub policy: MapePolicy,
}

impl MetricFn for Mape {
    fn compute(&self, predictions: &[f64], targets: ArrayView1<'_, f32>) -> f64 {
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for (&p, &t) in predictions.iter().zip(targets.iter()) {
            let t = t as f64;
            let denom = match self.policy {
                MapePolicy::SkipZeroTargets if t == 0.0 => continue,
                MapePolicy::SkipZeroTargets => t.abs(),
                MapePolicy::Epsilon(eps) => t.abs().max(eps),
            };
            sum += (p - t).abs() / denom;
            count += 1;
        }
        if count == 0 {
            return f64::NAN;
        }
        sum / count as f64 * 100.0
    }

    fn name(&self) -> &'static str {
        "mape"
    }
}

// =============================================================================
// RegressionMetrics
// =============================================================================

/// Held-out quality of one learner or of the blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    /// `None` when no row qualifies under the MAPE policy.
    #[serde(deserialize_with = "Option::deserialize")]
    pub mape: Option<f64>,
}

impl RegressionMetrics {
    pub fn compute(predictions: &[f64], targets: ArrayView1<'_, f32>, mape: MapePolicy) -> Self {
        let mape = Mape { policy: mape }.compute(predictions, targets);
        Self {
            rmse: Rmse.compute(predictions, targets),
            mae: Mae.compute(predictions, targets),
            r2: RSquared.compute(predictions, targets),
            mape: mape.is_finite().then_some(mape),
        }
    }
}

impl fmt::Display for RegressionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={:.2} {}={:.2} {}={:.4}",
            Rmse.name(),
            self.rmse,
            Mae.name(),
            self.mae,
            RSquared.name(),
            self.r2
        )?;
        let mape = Mape::default().name();
        match self.mape {
            Some(m) => write!(f, " {mape}={m:.2}%"),
            None => write!(f, " {mape}=n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn rmse_and_mae() {
        let targets = array![1.0f32, 2.0, 3.0];
        let preds = [1.0, 3.0, 5.0];
        assert_abs_diff_eq!(Rmse.compute(&preds, targets.view()), (5.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(Mae.compute(&preds, targets.view()), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn r2_perfect_and_mean() {
        let targets = array![1.0f32, 2.0, 3.0];
        assert_abs_diff_eq!(RSquared.compute(&[1.0, 2.0, 3.0], targets.view()), 1.0);
        assert_abs_diff_eq!(RSquared.compute(&[2.0, 2.0, 2.0], targets.view()), 0.0);
    }

    #[test]
    fn r2_constant_targets() {
        let targets = array![4.0f32, 4.0];
        assert_eq!(RSquared.compute(&[4.0, 4.0], targets.view()), 1.0);
        assert_eq!(RSquared.compute(&[4.0, 5.0], targets.view()), 0.0);
    }

    #[test]
    fn mape_skips_zero_targets() {
        let targets = array![0.0f32, 100.0];
        let m = Mape::default().compute(&[5.0, 110.0], targets.view());
        assert_abs_diff_eq!(m, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn mape_epsilon_guard() {
        let targets = array![0.0f32, 100.0];
        let m = Mape { policy: MapePolicy::Epsilon(1.0) }.compute(&[0.5, 110.0], targets.view());
        // (0.5 / 1.0 + 10 / 100) / 2 * 100
        assert_abs_diff_eq!(m, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn mape_undefined_is_none() {
        let targets = array![0.0f32, 0.0];
        let metrics = RegressionMetrics::compute(&[1.0, 2.0], targets.view(), MapePolicy::default());
        assert_eq!(metrics.mape, None);
        assert!(metrics.rmse > 0.0);
    }

    #[test]
    fn display_uses_metric_names() {
        let m = RegressionMetrics { rmse: 1.5, mae: 1.0, r2: 0.875, mape: Some(12.5) };
        assert_eq!(m.to_string(), "rmse=1.50 mae=1.00 r2=0.8750 mape=12.50%");

        let m = RegressionMetrics { mape: None, ..m };
        assert_eq!(m.to_string(), "rmse=1.50 mae=1.00 r2=0.8750 mape=n/a");
    }
}
