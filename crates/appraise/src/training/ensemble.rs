//! Ensemble training: one shared split, independent learners, R²-based
//! blend weights.

use std::collections::BTreeMap;

use chrono::Utc;

use super::gbdt::{GBDTTrainer, LearnerError};
use super::logger::TrainingLogger;
use super::metrics::RegressionMetrics;
use crate::data::{Dataset, DatasetError};
use crate::model::{ConfigError, EnsembleConfig, EnsembleMetrics, EnsembleModel, ModelError, TrainedLearner};
use crate::utils::{run_with_threads, Parallelism};

/// Errors that abort a training run. No partial model is ever returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrainingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("learner '{name}' failed: {source}")]
    LearnerFailed {
        name: String,
        #[source]
        source: LearnerError,
    },

    #[error("trained model is inconsistent: {0}")]
    Model(#[from] ModelError),
}

/// Blend weights proportional to `max(r2, floor)`.
///
/// Weights are non-negative and sum to 1 whenever `floor > 0`.
pub fn blend_weights(r2: &BTreeMap<String, f64>, floor: f64) -> BTreeMap<String, f64> {
    let clamped: BTreeMap<String, f64> = r2
        .iter()
        .map(|(name, &r)| {
            // NaN R² counts as the floor
            let r = if r.is_nan() { floor } else { r.max(floor) };
            (name.clone(), r)
        })
        .collect();
    let total: f64 = clamped.values().sum();
    clamped.into_iter().map(|(name, r)| (name, r / total)).collect()
}

/// Fits every configured learner on a common split and blends them.
///
/// # Example
///
/// ```
/// use appraise::model::{EnsembleConfig, LearnerConfig};
/// use appraise::testing::synthetic_housing;
/// use appraise::training::EnsembleTrainer;
///
/// let dataset = synthetic_housing(120, 7);
/// let config = EnsembleConfig::builder()
///     .learners(vec![
///         LearnerConfig::depth_wise().with_n_trees(20),
///         LearnerConfig::leaf_wise().with_n_trees(20),
///     ])
///     .build()
///     .unwrap();
/// let model = EnsembleTrainer::new(config).train(&dataset).unwrap();
/// let total: f64 = model.weights().values().sum();
/// assert!((total - 1.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct EnsembleTrainer {
    config: EnsembleConfig,
}

impl EnsembleTrainer {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Train and evaluate the ensemble.
    pub fn train(&self, dataset: &Dataset) -> Result<EnsembleModel, TrainingError> {
        self.config.validate()?;
        run_with_threads(self.config.n_threads, |parallelism| self.train_inner(dataset, parallelism))
    }

    fn train_inner(
        &self,
        dataset: &Dataset,
        parallelism: Parallelism,
    ) -> Result<EnsembleModel, TrainingError> {
        let config = &self.config;
        let (train, test) = dataset.train_test_split(config.test_fraction, config.split_seed)?;

        let mut logger = TrainingLogger::new(config.verbosity);
        logger.start_training(config.learners.len(), train.n_samples(), test.n_samples());

        let mut learners = Vec::with_capacity(config.learners.len());
        let mut test_predictions = BTreeMap::new();
        let mut individual = BTreeMap::new();

        for learner_config in &config.learners {
            let name = learner_config.name.clone();
            logger.start_learner(&name, learner_config.n_trees);

            let forest = GBDTTrainer::new(learner_config.to_params())
                .train(&name, train.features(), train.targets(), &logger, parallelism)
                .map_err(|source| TrainingError::LearnerFailed { name: name.clone(), source })?;

            let preds = forest.predict(test.features(), parallelism);
            let metrics = RegressionMetrics::compute(&preds, test.targets(), config.mape_policy);
            logger.log_learner_metrics(&name, &metrics);
            if metrics.r2 < 0.0 {
                logger.warn(&format!("learner '{name}' has negative held-out r2 ({:.4})", metrics.r2));
            }

            individual.insert(name.clone(), metrics);
            test_predictions.insert(name, preds);
            learners.push(TrainedLearner::new(learner_config.clone(), forest, metrics));
        }

        let r2: BTreeMap<String, f64> =
            individual.iter().map(|(name, m)| (name.clone(), m.r2)).collect();
        let weights = blend_weights(&r2, config.weight_floor);
        logger.log_weights(&weights);

        let mut blended = vec![0.0f64; test.n_samples()];
        for (name, preds) in &test_predictions {
            let w = weights[name];
            for (acc, p) in blended.iter_mut().zip(preds) {
                *acc += w * p;
            }
        }
        let ensemble = RegressionMetrics::compute(&blended, test.targets(), config.mape_policy);
        logger.finish_training(&ensemble);

        let metrics = EnsembleMetrics {
            individual,
            ensemble,
            weights: weights.clone(),
            n_learners: learners.len(),
            n_features: dataset.n_features(),
            n_samples: dataset.n_samples(),
            n_train: train.n_samples(),
            n_test: test.n_samples(),
            trained_at: Utc::now(),
        };

        Ok(EnsembleModel::from_parts(dataset.schema().clone(), learners, weights, Some(metrics))?)
    }
}
