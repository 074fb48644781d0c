//! Gradient-boosted regression trees with squared-error loss.
//!
//! Use [`GBDTTrainer::train`] to fit a [`Forest`] to a feature matrix.

use ndarray::{ArrayView1, ArrayView2};
use rand::prelude::*;

use super::binning::BinnedMatrix;
use super::grower::{GrowerParams, GrowthStrategy, TreeGrower};
use super::logger::TrainingLogger;
use super::sampling::{sample_columns, sample_rows};
use super::split::GainParams;
use crate::repr::Forest;
use crate::utils::Parallelism;

/// Errors raised while boosting a single learner.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LearnerError {
    #[error("no training rows")]
    Empty,

    #[error("{features} feature columns but {targets} targets")]
    ShapeMismatch { features: usize, targets: usize },

    #[error("non-finite target at row {0}")]
    NonFiniteTarget(usize),

    #[error("predictions diverged at round {0}")]
    Diverged(usize),
}

// =============================================================================
// GBDTParams
// =============================================================================

/// Parameters for boosting one learner.
#[derive(Clone, Debug, PartialEq)]
pub struct GBDTParams {
    /// Number of boosting rounds (trees).
    pub n_trees: u32,
    /// Shrinkage applied to every leaf.
    pub learning_rate: f32,
    pub growth_strategy: GrowthStrategy,
    pub gain: GainParams,
    /// Fraction of rows sampled per tree.
    pub subsample: f32,
    /// Fraction of features sampled per tree.
    pub colsample_bytree: f32,
    /// Maximum histogram bins per feature.
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for GBDTParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            learning_rate: 0.1,
            growth_strategy: GrowthStrategy::default(),
            gain: GainParams::default(),
            subsample: 1.0,
            colsample_bytree: 1.0,
            max_bins: 256,
            seed: 42,
        }
    }
}

impl GBDTParams {
    fn to_grower_params(&self) -> GrowerParams {
        GrowerParams {
            gain: self.gain.clone(),
            learning_rate: self.learning_rate,
            growth_strategy: self.growth_strategy,
        }
    }
}

// =============================================================================
// GBDTTrainer
// =============================================================================

/// Boosts regression trees on squared error.
///
/// Gradients are `pred - y` with unit hessians; the base score is the
/// target mean.
#[derive(Debug, Clone)]
pub struct GBDTTrainer {
    params: GBDTParams,
}

impl GBDTTrainer {
    pub fn new(params: GBDTParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &GBDTParams {
        &self.params
    }

    /// Fit a forest to `[n_samples, n_features]` features.
    pub fn train(
        &self,
        name: &str,
        features: ArrayView2<'_, f32>,
        targets: ArrayView1<'_, f32>,
        logger: &TrainingLogger,
        parallelism: Parallelism,
    ) -> Result<Forest, LearnerError> {
        let n_rows = features.nrows();
        if n_rows == 0 {
            return Err(LearnerError::Empty);
        }
        if targets.len() != n_rows {
            return Err(LearnerError::ShapeMismatch { features: n_rows, targets: targets.len() });
        }
        if let Some(row) = targets.iter().position(|t| !t.is_finite()) {
            return Err(LearnerError::NonFiniteTarget(row));
        }

        let base_score =
            (targets.iter().map(|&t| t as f64).sum::<f64>() / n_rows as f64) as f32;
        let mut forest = Forest::new(base_score);

        let binned = BinnedMatrix::build(features, self.params.max_bins, parallelism);
        let grower_params = self.params.to_grower_params();
        let grower = TreeGrower::new(&binned, &grower_params, parallelism);

        let mut predictions = vec![base_score as f64; n_rows];
        let mut grads = vec![0.0f32; n_rows];
        let hess = vec![1.0f32; n_rows];

        for round in 0..self.params.n_trees as usize {
            for ((g, &p), &t) in grads.iter_mut().zip(&predictions).zip(targets.iter()) {
                *g = (p - t as f64) as f32;
            }

            let mut rng = StdRng::seed_from_u64(self.params.seed.wrapping_add(round as u64));
            let rows = sample_rows(n_rows, self.params.subsample, &mut rng);
            let cols = sample_columns(binned.n_features(), self.params.colsample_bytree, &mut rng);

            let tree = grower.grow(rows, &cols, &grads, &hess);
            logger.log_round(name, round, tree.n_leaves());

            let deltas: Vec<f32> = parallelism.maybe_par_map(0..n_rows, |i| {
                let row = features.row(i);
                match row.as_slice() {
                    Some(slice) => tree.predict_row(slice),
                    None => tree.predict_row(&row.to_vec()),
                }
            });
            for (p, d) in predictions.iter_mut().zip(&deltas) {
                *p += *d as f64;
            }
            if predictions.iter().any(|p| !p.is_finite()) {
                return Err(LearnerError::Diverged(round));
            }

            forest.push_tree(tree);
        }

        Ok(forest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::data::{random_dense_f32, synthetic_regression_targets_linear};
    use crate::training::metrics::{MetricFn, RSquared};
    use crate::training::Verbosity;
    use ndarray::{Array1, Array2};

    fn linear_data(rows: usize, cols: usize, seed: u64) -> (Array2<f32>, Array1<f32>) {
        let x = random_dense_f32(rows, cols, seed, -1.0, 1.0);
        let (y, _, _) = synthetic_regression_targets_linear(&x, rows, cols, seed + 1, 0.05);
        (Array2::from_shape_vec((rows, cols), x).unwrap(), Array1::from(y))
    }

    #[test]
    fn fits_linear_signal() {
        let (x, y) = linear_data(400, 4, 7);
        let params = GBDTParams { n_trees: 60, learning_rate: 0.2, ..Default::default() };
        let logger = TrainingLogger::new(Verbosity::Silent);
        let forest = GBDTTrainer::new(params)
            .train("test", x.view(), y.view(), &logger, Parallelism::Sequential)
            .unwrap();

        assert_eq!(forest.n_trees(), 60);
        let preds = forest.predict(x.view(), Parallelism::Sequential);
        let r2 = RSquared.compute(&preds, y.view());
        assert!(r2 > 0.9, "r2 = {r2}");
    }

    #[test]
    fn training_is_deterministic() {
        let (x, y) = linear_data(200, 3, 11);
        let params = GBDTParams {
            n_trees: 20,
            subsample: 0.8,
            colsample_bytree: 0.67,
            growth_strategy: GrowthStrategy::LeafWise { max_leaves: 8 },
            ..Default::default()
        };
        let logger = TrainingLogger::new(Verbosity::Silent);
        let trainer = GBDTTrainer::new(params);
        let a = trainer.train("a", x.view(), y.view(), &logger, Parallelism::Parallel).unwrap();
        let b = trainer.train("b", x.view(), y.view(), &logger, Parallelism::Sequential).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn base_score_is_target_mean() {
        let x = Array2::<f32>::zeros((4, 1));
        let y = Array1::from(vec![1.0f32, 2.0, 3.0, 6.0]);
        let params = GBDTParams { n_trees: 1, ..Default::default() };
        let logger = TrainingLogger::new(Verbosity::Silent);
        let forest = GBDTTrainer::new(params)
            .train("c", x.view(), y.view(), &logger, Parallelism::Sequential)
            .unwrap();
        assert_eq!(forest.base_score(), 3.0);
    }

    #[test]
    fn rejects_bad_input() {
        let logger = TrainingLogger::new(Verbosity::Silent);
        let trainer = GBDTTrainer::new(GBDTParams::default());
        let x = Array2::<f32>::zeros((2, 1));
        let y = Array1::from(vec![1.0f32]);
        assert_eq!(
            trainer.train("d", x.view(), y.view(), &logger, Parallelism::Sequential).unwrap_err(),
            LearnerError::ShapeMismatch { features: 2, targets: 1 }
        );
        let y = Array1::from(vec![1.0f32, f32::INFINITY]);
        assert_eq!(
            trainer.train("d", x.view(), y.view(), &logger, Parallelism::Sequential).unwrap_err(),
            LearnerError::NonFiniteTarget(1)
        );
    }
}
