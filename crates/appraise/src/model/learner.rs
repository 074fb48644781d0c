//! A fitted learner: one boosted forest plus its held-out scores.

use super::config::LearnerConfig;
use crate::explainability::{compute_forest_importance, ExplainError, FeatureImportance, ImportanceType};
use crate::repr::Forest;
use crate::training::RegressionMetrics;

/// One trained member of an ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedLearner {
    name: String,
    config: LearnerConfig,
    forest: Forest,
    metrics: RegressionMetrics,
}

impl TrainedLearner {
    pub fn new(config: LearnerConfig, forest: Forest, metrics: RegressionMetrics) -> Self {
        Self { name: config.name.clone(), config, forest, metrics }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn metrics(&self) -> &RegressionMetrics {
        &self.metrics
    }

    /// Raw prediction for one schema-ordered row.
    #[inline]
    pub fn predict_row(&self, features: &[f32]) -> f64 {
        self.forest.predict_row(features)
    }

    pub fn feature_importance(
        &self,
        names: &[String],
        kind: ImportanceType,
    ) -> Result<FeatureImportance, ExplainError> {
        compute_forest_importance(&self.forest, names, kind)
    }
}
