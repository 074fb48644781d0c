//! Gradient histograms per feature for one tree node.

use super::binning::BinnedMatrix;
use crate::utils::Parallelism;

/// Gradient, hessian and row count per bin of one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureHistogram {
    pub feature: usize,
    pub grad: Vec<f64>,
    pub hess: Vec<f64>,
    pub count: Vec<u32>,
}

impl FeatureHistogram {
    fn zeros(feature: usize, n_bins: usize) -> Self {
        Self { feature, grad: vec![0.0; n_bins], hess: vec![0.0; n_bins], count: vec![0; n_bins] }
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.grad.len()
    }
}

/// Build histograms of `rows` for each feature in `features`.
///
/// `grads` and `hess` are indexed by row. The output follows the order of
/// `features`.
pub fn build_histograms(
    binned: &BinnedMatrix,
    rows: &[u32],
    grads: &[f32],
    hess: &[f32],
    features: &[usize],
    parallelism: Parallelism,
) -> Vec<FeatureHistogram> {
    parallelism.maybe_par_map(features, |&feature| {
        let bins = binned.column(feature);
        let mut hist = FeatureHistogram::zeros(feature, binned.mapper(feature).n_bins());
        for &row in rows {
            let row = row as usize;
            let b = bins[row] as usize;
            hist.grad[b] += grads[row] as f64;
            hist.hess[b] += hess[row] as f64;
            hist.count[b] += 1;
        }
        hist
    })
}
