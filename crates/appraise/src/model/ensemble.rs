//! The trained ensemble: learners, blend weights and schema.

use std::collections::BTreeMap;

use super::learner::TrainedLearner;
use super::metrics::EnsembleMetrics;
use crate::data::{FeatureMap, FeatureSchema, FeatureVector, SchemaError};
use crate::explainability::{ExplainError, FeatureImportance, ImportanceType};
use crate::inference::{EnsemblePredictor, PredictionResult};
use crate::repr::ForestValidationError;

/// Tolerance on the sum of blend weights.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Errors raised by model queries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictError {
    #[error("model is not trained")]
    Untrained,

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Explain(#[from] ExplainError),
}

/// Errors raised when assembling a model from parts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("model has no learners")]
    NoLearners,

    #[error("duplicate learner '{0}'")]
    DuplicateLearner(String),

    #[error("learner '{0}' has no weight")]
    MissingWeight(String),

    #[error("weight for unknown learner '{0}'")]
    UnknownWeight(String),

    #[error("weight for '{name}' is {weight}, must be finite and non-negative")]
    InvalidWeight { name: String, weight: f64 },

    #[error("weights sum to {0}, expected 1")]
    WeightSum(f64),

    #[error("learner '{name}': {error}")]
    InvalidForest { name: String, error: ForestValidationError },
}

/// Ensemble of boosted-tree learners blended by fixed weights.
///
/// Built empty by [`EnsembleModel::new`] (untrained) or complete by
/// [`EnsembleModel::from_parts`] (trained); there is no way to mutate a
/// trained model. Share it across threads behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnsembleModel {
    learners: BTreeMap<String, TrainedLearner>,
    weights: BTreeMap<String, f64>,
    schema: Option<FeatureSchema>,
    metrics: Option<EnsembleMetrics>,
    trained: bool,
}

impl EnsembleModel {
    /// An untrained model. Every query fails with [`PredictError::Untrained`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a trained model.
    ///
    /// Weights must cover exactly the given learners, be non-negative and
    /// sum to 1; every forest must be valid for the schema.
    pub fn from_parts(
        schema: FeatureSchema,
        learners: Vec<TrainedLearner>,
        weights: BTreeMap<String, f64>,
        metrics: Option<EnsembleMetrics>,
    ) -> Result<Self, ModelError> {
        if learners.is_empty() {
            return Err(ModelError::NoLearners);
        }

        let mut by_name = BTreeMap::new();
        for learner in learners {
            learner
                .forest()
                .validate(Some(schema.len()))
                .map_err(|error| ModelError::InvalidForest { name: learner.name().into(), error })?;
            let name = learner.name().to_string();
            if by_name.insert(name.clone(), learner).is_some() {
                return Err(ModelError::DuplicateLearner(name));
            }
        }

        for name in by_name.keys() {
            if !weights.contains_key(name) {
                return Err(ModelError::MissingWeight(name.clone()));
            }
        }
        let mut total = 0.0;
        for (name, &weight) in &weights {
            if !by_name.contains_key(name) {
                return Err(ModelError::UnknownWeight(name.clone()));
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(ModelError::InvalidWeight { name: name.clone(), weight });
            }
            total += weight;
        }
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ModelError::WeightSum(total));
        }

        Ok(Self { learners: by_name, weights, schema: Some(schema), metrics, trained: true })
    }

    #[inline]
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn schema(&self) -> Result<&FeatureSchema, PredictError> {
        match (&self.schema, self.trained) {
            (Some(schema), true) => Ok(schema),
            _ => Err(PredictError::Untrained),
        }
    }

    pub fn learners(&self) -> impl Iterator<Item = &TrainedLearner> {
        self.learners.values()
    }

    pub fn learner(&self, name: &str) -> Option<&TrainedLearner> {
        self.learners.get(name)
    }

    pub fn n_learners(&self) -> usize {
        self.learners.len()
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn metrics(&self) -> Option<&EnsembleMetrics> {
        self.metrics.as_ref()
    }

    /// Learner with the highest weight; ties go to the first name.
    pub fn primary_learner(&self) -> Option<&TrainedLearner> {
        self.weights
            .iter()
            .fold(None::<(&String, f64)>, |best, (name, &w)| match best {
                Some((_, bw)) if bw >= w => best,
                _ => Some((name, w)),
            })
            .and_then(|(name, _)| self.learners.get(name))
    }

    /// Reduce a keyed input to this model's schema (zero-fill).
    pub fn reduce(&self, input: &FeatureMap) -> Result<FeatureVector, PredictError> {
        Ok(self.schema()?.reduce(input))
    }

    /// Predict a price with uncertainty for a keyed input.
    pub fn predict(&self, input: &FeatureMap) -> Result<PredictionResult, PredictError> {
        EnsemblePredictor::new(self).predict(input)
    }

    /// Predict for a vector already in schema order.
    pub fn predict_vector(&self, input: &FeatureVector) -> Result<PredictionResult, PredictError> {
        EnsemblePredictor::new(self).predict_vector(input)
    }

    /// Importance per learner and averaged across every learner present.
    pub fn feature_importance(&self, kind: ImportanceType) -> Result<EnsembleImportance, PredictError> {
        let schema = self.schema()?;
        let mut per_learner = BTreeMap::new();
        for learner in self.learners.values() {
            let importance = learner.feature_importance(schema.names(), kind)?.normalized();
            per_learner.insert(learner.name().to_string(), importance);
        }
        let items: Vec<FeatureImportance> = per_learner.values().cloned().collect();
        let average = FeatureImportance::average(kind, &items).ok_or(PredictError::Untrained)?;
        Ok(EnsembleImportance { per_learner, average })
    }
}

/// Normalized importance of every learner and their mean.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleImportance {
    pub per_learner: BTreeMap<String, FeatureImportance>,
    pub average: FeatureImportance,
}
