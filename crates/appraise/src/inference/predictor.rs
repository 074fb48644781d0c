//! Ensemble prediction with a dispersion-based uncertainty band.

use std::collections::BTreeMap;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::data::{FeatureMap, FeatureVector, SchemaError};
use crate::model::{EnsembleModel, PredictError};
use crate::utils::{mean, population_std, Parallelism};

/// z-score of a two-sided 95% band.
pub const Z_95: f64 = 1.96;

/// Confidence reported when the mean learner prediction is not positive.
pub const FALLBACK_CONFIDENCE: f64 = 0.8;

/// Price estimate with uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Weighted blend of the learners, floored at 0.
    pub predicted_price: f64,
    /// `predicted_price - 1.96 * dispersion`, floored at 0.
    pub price_lower: f64,
    /// `predicted_price + 1.96 * dispersion`.
    pub price_upper: f64,
    /// `1 - dispersion / mean`. A relative agreement score, not a probability;
    /// it can be negative when learners disagree strongly.
    pub confidence: f64,
    /// Population standard deviation of the raw learner predictions.
    pub dispersion: f64,
    pub learner_predictions: BTreeMap<String, f64>,
}

impl PredictionResult {
    /// Blend raw learner outputs with `weights`.
    ///
    /// Learners missing from `weights` contribute nothing to the point
    /// estimate but still count toward dispersion.
    pub fn from_learner_predictions(
        learner_predictions: BTreeMap<String, f64>,
        weights: &BTreeMap<String, f64>,
    ) -> Self {
        let raw: Vec<f64> = learner_predictions.values().copied().collect();
        let blended: f64 = learner_predictions
            .iter()
            .map(|(name, p)| weights.get(name).copied().unwrap_or(0.0) * p)
            .sum();

        let predicted_price = blended.max(0.0);
        let dispersion = population_std(&raw);
        let half_width = Z_95 * dispersion;

        let avg = mean(&raw);
        let confidence = if avg > 0.0 { 1.0 - dispersion / avg } else { FALLBACK_CONFIDENCE };

        Self {
            predicted_price,
            price_lower: (predicted_price - half_width).max(0.0),
            price_upper: predicted_price + half_width,
            confidence,
            dispersion,
            learner_predictions,
        }
    }
}

/// Runs every learner of an [`EnsembleModel`] and blends the outputs.
#[derive(Debug, Clone, Copy)]
pub struct EnsemblePredictor<'a> {
    model: &'a EnsembleModel,
}

impl<'a> EnsemblePredictor<'a> {
    pub fn new(model: &'a EnsembleModel) -> Self {
        Self { model }
    }

    /// Predict for keyed input. Extra keys are ignored, missing ones are 0.
    pub fn predict(&self, input: &FeatureMap) -> Result<PredictionResult, PredictError> {
        let vector = self.model.reduce(input)?;
        self.predict_slice(vector.as_slice())
    }

    /// Predict for a vector reduced against this model's schema.
    pub fn predict_vector(&self, input: &FeatureVector) -> Result<PredictionResult, PredictError> {
        self.model.schema()?.check(input)?;
        self.predict_slice(input.as_slice())
    }

    /// Predict every row of a schema-ordered matrix.
    pub fn predict_batch(
        &self,
        rows: ArrayView2<'_, f32>,
        parallelism: Parallelism,
    ) -> Result<Vec<PredictionResult>, PredictError> {
        let schema = self.model.schema()?;
        if rows.ncols() != schema.len() {
            return Err(SchemaError::LengthMismatch { expected: schema.len(), actual: rows.ncols() }.into());
        }
        parallelism
            .maybe_par_map(0..rows.nrows(), |i| {
                let row = rows.row(i);
                match row.as_slice() {
                    Some(slice) => self.predict_slice(slice),
                    None => self.predict_slice(&row.to_vec()),
                }
            })
            .into_iter()
            .collect()
    }

    fn predict_slice(&self, features: &[f32]) -> Result<PredictionResult, PredictError> {
        if !self.model.is_trained() {
            return Err(PredictError::Untrained);
        }
        let learner_predictions: BTreeMap<String, f64> = self
            .model
            .learners()
            .map(|learner| (learner.name().to_string(), learner.predict_row(features)))
            .collect();
        Ok(PredictionResult::from_learner_predictions(learner_predictions, self.model.weights()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureSchema;
    use crate::model::{LearnerConfig, TrainedLearner};
    use crate::repr::{Forest, MutableTree};
    use crate::training::RegressionMetrics;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn preds(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(n, p)| (n.to_string(), *p)).collect()
    }

    fn model() -> EnsembleModel {
        // a: 100 + (x < 1 ? -10 : 10); b: 120 + (y < 1 ? 0 : 30)
        let stump = |feature, left, right, base| {
            let mut t = MutableTree::with_root(2.0);
            let (l, r) = t.split(0, feature, 1.0, 1.0, 1.0, 1.0);
            t.set_leaf_value(l, left);
            t.set_leaf_value(r, right);
            let mut f = Forest::new(base);
            f.push_tree(t.freeze());
            f
        };
        let metrics = RegressionMetrics { rmse: 0.0, mae: 0.0, r2: 1.0, mape: None };
        let learners = vec![
            TrainedLearner::new(LearnerConfig::depth_wise().with_name("a"), stump(0, -10.0, 10.0, 100.0), metrics),
            TrainedLearner::new(LearnerConfig::depth_wise().with_name("b"), stump(1, 0.0, 30.0, 120.0), metrics),
        ];
        let weights = preds(&[("a", 0.75), ("b", 0.25)]);
        EnsembleModel::from_parts(FeatureSchema::new(["x", "y"]).unwrap(), learners, weights, None).unwrap()
    }

    #[test]
    fn two_learner_band() {
        let result = PredictionResult::from_learner_predictions(
            preds(&[("a", 5.0e6), ("b", 5.2e6)]),
            &preds(&[("a", 0.5), ("b", 0.5)]),
        );
        assert_relative_eq!(result.predicted_price, 5.1e6);
        assert_relative_eq!(result.dispersion, 1.0e5, max_relative = 1e-12);
        assert_relative_eq!(result.price_lower, 5.1e6 - 1.96e5, max_relative = 1e-12);
        assert_relative_eq!(result.price_upper, 5.1e6 + 1.96e5, max_relative = 1e-12);
        assert_relative_eq!(result.confidence, 1.0 - 1.0e5 / 5.1e6, max_relative = 1e-12);
    }

    #[test]
    fn negative_blend_is_floored() {
        let result = PredictionResult::from_learner_predictions(
            preds(&[("a", -50.0), ("b", -10.0)]),
            &preds(&[("a", 0.5), ("b", 0.5)]),
        );
        assert_eq!(result.predicted_price, 0.0);
        assert_eq!(result.price_lower, 0.0);
        assert!(result.price_upper >= result.predicted_price);
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn agreeing_learners_have_full_confidence() {
        let result = PredictionResult::from_learner_predictions(
            preds(&[("a", 300.0), ("b", 300.0)]),
            &preds(&[("a", 0.3), ("b", 0.7)]),
        );
        assert_eq!(result.dispersion, 0.0);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.price_lower, result.price_upper);
    }

    #[test]
    fn predicts_from_keyed_input() {
        let model = model();
        let input = FeatureMap::from([
            ("x".to_string(), 2.0),
            ("y".to_string(), 0.0),
            ("ignored".to_string(), 99.0),
        ]);
        let result = model.predict(&input).unwrap();
        assert_eq!(result.learner_predictions["a"], 110.0);
        assert_eq!(result.learner_predictions["b"], 120.0);
        assert_relative_eq!(result.predicted_price, 0.75 * 110.0 + 0.25 * 120.0);

        // missing keys are zero
        let empty = model.predict(&FeatureMap::new()).unwrap();
        assert_eq!(empty.learner_predictions["a"], 90.0);
    }

    #[test]
    fn vector_from_other_schema_is_rejected() {
        let model = model();
        let other = FeatureSchema::new(["y", "x"]).unwrap();
        let vector = other.vector(vec![0.0, 0.0]).unwrap();
        assert!(matches!(
            model.predict_vector(&vector),
            Err(PredictError::Schema(SchemaError::FingerprintMismatch { .. }))
        ));
    }

    #[test]
    fn batch_matches_single_rows() {
        let model = model();
        let rows = array![[0.0f32, 0.0], [2.0, 2.0], [0.5, 3.0]];
        let predictor = EnsemblePredictor::new(&model);
        let batch = predictor.predict_batch(rows.view(), Parallelism::Parallel).unwrap();
        for (i, result) in batch.iter().enumerate() {
            let vector = model.schema().unwrap().vector(rows.row(i).to_vec()).unwrap();
            assert_eq!(result, &predictor.predict_vector(&vector).unwrap());
        }

        let wrong = array![[0.0f32, 0.0, 0.0]];
        assert!(predictor.predict_batch(wrong.view(), Parallelism::Sequential).is_err());
    }

    #[test]
    fn prediction_is_deterministic() {
        let model = model();
        let input = FeatureMap::from([("x".to_string(), 0.3), ("y".to_string(), 1.7)]);
        assert_eq!(model.predict(&input).unwrap(), model.predict(&input).unwrap());
    }
}
