//! Split gain, leaf weights and best-split search over histograms.

use super::binning::BinnedMatrix;
use super::histogram::FeatureHistogram;

// =============================================================================
// Gain Parameters
// =============================================================================

/// Regularization and constraints for split gain and leaf weights.
#[derive(Clone, Debug, PartialEq)]
pub struct GainParams {
    /// L2 regularization (lambda).
    pub reg_lambda: f32,
    /// L1 regularization (alpha).
    pub reg_alpha: f32,
    /// Minimum split gain (gamma).
    pub min_gain: f32,
    /// Minimum sum of hessians per child.
    pub min_child_weight: f32,
    /// Minimum samples per child.
    pub min_samples_leaf: u32,
}

impl Default for GainParams {
    fn default() -> Self {
        Self {
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            min_gain: 0.0,
            min_child_weight: 1.0,
            min_samples_leaf: 1,
        }
    }
}

impl GainParams {
    /// Split gain:
    ///
    /// ```text
    /// gain = 0.5 * [G_L²/(H_L + λ) + G_R²/(H_R + λ) - G_P²/(H_P + λ)] - γ
    /// ```
    #[inline]
    pub fn compute_gain(
        &self,
        grad_left: f64,
        hess_left: f64,
        grad_right: f64,
        hess_right: f64,
        grad_parent: f64,
        hess_parent: f64,
    ) -> f64 {
        let lambda = self.reg_lambda as f64;

        let score_left = grad_left * grad_left / (hess_left + lambda);
        let score_right = grad_right * grad_right / (hess_right + lambda);
        let score_parent = grad_parent * grad_parent / (hess_parent + lambda);

        0.5 * (score_left + score_right - score_parent) - self.min_gain as f64
    }

    /// Check if a split satisfies minimum constraints.
    #[inline]
    pub fn is_valid_split(
        &self,
        hess_left: f64,
        hess_right: f64,
        count_left: u32,
        count_right: u32,
    ) -> bool {
        let min_weight = self.min_child_weight as f64;
        let min_samples = self.min_samples_leaf.max(1);

        hess_left >= min_weight
            && hess_right >= min_weight
            && count_left >= min_samples
            && count_right >= min_samples
    }

    /// Leaf weight with L1 soft thresholding and L2 shrinkage:
    ///
    /// ```text
    /// weight = -sign(G) × max(0, |G| - α) / (H + λ)
    /// ```
    #[inline]
    pub fn compute_leaf_weight(&self, grad_sum: f64, hess_sum: f64) -> f64 {
        let lambda = self.reg_lambda as f64;
        let alpha = self.reg_alpha as f64;
        let denom = hess_sum + lambda;
        if denom <= 0.0 {
            return 0.0;
        }

        if alpha == 0.0 {
            -grad_sum / denom
        } else {
            let abs_grad = grad_sum.abs();
            if abs_grad <= alpha {
                0.0
            } else {
                -grad_sum.signum() * (abs_grad - alpha) / denom
            }
        }
    }
}

// =============================================================================
// Split search
// =============================================================================

/// Best split found for a node.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitInfo {
    pub feature: usize,
    /// Bins `0..=bin` go left.
    pub bin: u16,
    pub threshold: f32,
    pub gain: f64,
    pub grad_left: f64,
    pub hess_left: f64,
    pub count_left: u32,
    pub grad_right: f64,
    pub hess_right: f64,
    pub count_right: u32,
}

/// Scan every histogram for the split with the highest positive gain.
///
/// Ties keep the earliest feature and bin, so the result is independent of
/// how histograms were built.
pub fn find_best_split(
    histograms: &[FeatureHistogram],
    binned: &BinnedMatrix,
    grad_parent: f64,
    hess_parent: f64,
    count_parent: u32,
    params: &GainParams,
) -> Option<SplitInfo> {
    let mut best: Option<SplitInfo> = None;

    for hist in histograms {
        let n_bins = hist.n_bins();
        if n_bins < 2 {
            continue;
        }
        let mapper = binned.mapper(hist.feature);

        let (mut gl, mut hl, mut cl) = (0.0f64, 0.0f64, 0u32);
        for b in 0..n_bins - 1 {
            gl += hist.grad[b];
            hl += hist.hess[b];
            cl += hist.count[b];
            if cl == 0 {
                continue;
            }
            let cr = count_parent - cl;
            if cr == 0 {
                break;
            }
            let gr = grad_parent - gl;
            let hr = hess_parent - hl;
            if !params.is_valid_split(hl, hr, cl, cr) {
                continue;
            }

            let gain = params.compute_gain(gl, hl, gr, hr, grad_parent, hess_parent);
            let better = gain > 0.0 && best.as_ref().is_none_or(|s| gain > s.gain);
            if better {
                best = Some(SplitInfo {
                    feature: hist.feature,
                    bin: b as u16,
                    threshold: mapper.threshold(b as u16),
                    gain,
                    grad_left: gl,
                    hess_left: hl,
                    count_left: cl,
                    grad_right: gr,
                    hess_right: hr,
                    count_right: cr,
                });
            }
        }
    }

    best
}
