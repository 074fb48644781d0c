//! Nearest historical records in standardized feature space.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::utils::Parallelism;

/// Errors raised by similarity search.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimilarityError {
    #[error("reference set has no rows")]
    EmptyReference,

    #[error("expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{targets} targets for {rows} reference rows")]
    TargetLength { rows: usize, targets: usize },

    #[error("feature {feature} is not finite")]
    NonFinite { feature: usize },
}

/// Per-feature standardization: `(x - mean) / std`.
///
/// Uses the population standard deviation; constant columns get scale 1.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(features: ArrayView2<'_, f32>) -> Self {
        let (mean, scale) = features
            .axis_iter(Axis(1))
            .map(|column| {
                let n = column.len().max(1) as f64;
                let mean = column.iter().map(|&v| v as f64).sum::<f64>() / n;
                let var = column.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                (mean, if std > 0.0 { std } else { 1.0 })
            })
            .unzip();
        Self { mean, scale }
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn transform_row(&self, row: ArrayView1<'_, f32>) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&v, (m, s))| (v as f64 - m) / s)
            .collect()
    }
}

/// One comparable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarRecord {
    /// 1 = nearest.
    pub rank: usize,
    /// Row in the reference set.
    pub index: usize,
    /// Price of the reference row.
    pub target: f64,
    /// Euclidean distance in standardized space.
    pub distance: f64,
    /// `1 / (1 + distance)`, in (0, 1].
    pub similarity: f64,
    /// Raw feature values of the reference row, in schema order.
    pub features: Vec<f32>,
}

/// Ranked comparables for one query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub records: Vec<SimilarRecord>,
}

impl SimilarityResult {
    /// Prices of the comparables, nearest first.
    pub fn prices(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.target).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A reference set with a fitted scaler, reusable across queries.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    scaler: StandardScaler,
    features: Array2<f32>,
    scaled: Array2<f64>,
    targets: Array1<f32>,
    parallelism: Parallelism,
}

impl SimilarityIndex {
    /// Fit the scaler on `features` and standardize every row.
    pub fn fit(
        features: ArrayView2<'_, f32>,
        targets: ArrayView1<'_, f32>,
    ) -> Result<Self, SimilarityError> {
        let rows = features.nrows();
        if rows == 0 {
            return Err(SimilarityError::EmptyReference);
        }
        if targets.len() != rows {
            return Err(SimilarityError::TargetLength { rows, targets: targets.len() });
        }

        let scaler = StandardScaler::fit(features);
        let mut scaled = Array2::<f64>::zeros(features.dim());
        for (mut out, row) in scaled.axis_iter_mut(Axis(0)).zip(features.axis_iter(Axis(0))) {
            out.assign(&ArrayView1::from(scaler.transform_row(row).as_slice()));
        }

        Ok(Self {
            scaler,
            features: features.to_owned(),
            scaled,
            targets: targets.to_owned(),
            parallelism: Parallelism::default(),
        })
    }

    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn n_rows(&self) -> usize {
        self.scaled.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.scaled.ncols()
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// The `k` nearest reference rows to `x` (`k` is clamped to the row
    /// count). Ties keep reference order.
    pub fn query(&self, x: ArrayView1<'_, f32>, k: usize) -> Result<SimilarityResult, SimilarityError> {
        if x.len() != self.n_features() {
            return Err(SimilarityError::DimensionMismatch { expected: self.n_features(), actual: x.len() });
        }
        if let Some(feature) = x.iter().position(|v| !v.is_finite()) {
            return Err(SimilarityError::NonFinite { feature });
        }
        let q = self.scaler.transform_row(x);

        let distances: Vec<f64> = self.parallelism.maybe_par_map(0..self.n_rows(), |i| {
            self.scaled
                .row(i)
                .iter()
                .zip(&q)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt()
        });

        let mut order: Vec<usize> = (0..distances.len()).collect();
        order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));

        let records = order
            .into_iter()
            .take(k.min(self.n_rows()))
            .enumerate()
            .map(|(rank, index)| {
                let distance = distances[index];
                SimilarRecord {
                    rank: rank + 1,
                    index,
                    target: self.targets[index] as f64,
                    distance,
                    similarity: 1.0 / (1.0 + distance),
                    features: self.features.row(index).to_vec(),
                }
            })
            .collect();
        Ok(SimilarityResult { records })
    }
}

/// One-shot similarity search.
pub struct SimilarityEngine;

impl SimilarityEngine {
    /// Fit a scaler on `train_x` and return the `k` rows nearest to `x`.
    pub fn query(
        train_x: ArrayView2<'_, f32>,
        train_y: ArrayView1<'_, f32>,
        x: ArrayView1<'_, f32>,
        k: usize,
    ) -> Result<SimilarityResult, SimilarityError> {
        SimilarityIndex::fit(train_x, train_y)?.query(x, k)
    }
}
