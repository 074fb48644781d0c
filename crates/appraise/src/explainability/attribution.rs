//! Per-prediction attribution with ranked, human-readable factors.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::shap::TreeExplainer;
use super::ExplainError;
use crate::data::{FeatureMap, FeatureVector};
use crate::model::{AttributionParams, EnsembleModel, TrainedLearner};
use crate::utils::Parallelism;

/// Sign of a contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increases,
    Decreases,
}

impl Direction {
    /// `Increases` for strictly positive contributions.
    pub fn of(contribution: f64) -> Self {
        if contribution > 0.0 { Self::Increases } else { Self::Decreases }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Increases => "increases",
            Self::Decreases => "decreases",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One feature's share of a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature: String,
    /// Input value of the feature.
    pub value: f32,
    pub contribution: f64,
}

/// A top-ranked contribution with presentation fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub feature: String,
    pub value: f32,
    pub contribution: f64,
    /// Share of the total absolute contribution, in percent.
    pub percentage: f64,
    pub direction: Direction,
    pub description: String,
}

/// Attribution of one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    /// Every feature, in schema order.
    pub contributions: Vec<Contribution>,
    /// Mean prediction of the explained learner over the background.
    pub base_value: f64,
    /// Raw prediction of the explained learner for this input.
    pub prediction: f64,
    /// Name of the explained learner.
    pub learner: String,
    /// Largest contributions by magnitude.
    pub top_factors: Vec<Factor>,
}

impl AttributionResult {
    /// `base_value + Σ contributions`, which reproduces `prediction`.
    pub fn reconstructed(&self) -> f64 {
        self.base_value + self.contributions.iter().map(|c| c.contribution).sum::<f64>()
    }
}

#[derive(Debug, Clone)]
struct Background {
    learner: String,
    rows: Array2<f32>,
    base_value: f64,
}

/// Explains ensemble predictions through one designated learner.
///
/// Attributions come from interventional TreeSHAP on a single learner (the
/// highest-weight one unless configured), so they explain that learner
/// rather than the blend. Call [`AttributionEngine::setup`] with training
/// features before explaining.
#[derive(Debug, Clone)]
pub struct AttributionEngine {
    model: Arc<EnsembleModel>,
    params: AttributionParams,
    background: Option<Background>,
}

impl AttributionEngine {
    pub fn new(model: Arc<EnsembleModel>, params: AttributionParams) -> Self {
        Self { model, params, background: None }
    }

    pub fn params(&self) -> &AttributionParams {
        &self.params
    }

    #[inline]
    pub fn is_configured(&self) -> bool {
        self.background.is_some()
    }

    /// Name of the explained learner, once set up.
    pub fn learner(&self) -> Option<&str> {
        self.background.as_ref().map(|b| b.learner.as_str())
    }

    /// Number of retained background rows, once set up.
    pub fn n_background(&self) -> Option<usize> {
        self.background.as_ref().map(|b| b.rows.nrows())
    }

    /// Sample the background from schema-ordered training features.
    ///
    /// Keeps at most `max_background` rows drawn without replacement with a
    /// fixed seed; fewer rows are all kept.
    pub fn setup(&mut self, training_features: ArrayView2<'_, f32>) -> Result<(), ExplainError> {
        if !self.model.is_trained() {
            return Err(ExplainError::Untrained);
        }
        let schema = self.model.schema().map_err(|_| ExplainError::Untrained)?;
        if training_features.ncols() != schema.len() {
            return Err(ExplainError::DimensionMismatch {
                expected: schema.len(),
                actual: training_features.ncols(),
            });
        }
        let n_rows = training_features.nrows();
        if n_rows == 0 {
            return Err(ExplainError::EmptyBackground);
        }

        let learner = self.explained_learner()?;
        let rows = if n_rows <= self.params.max_background {
            training_features.to_owned()
        } else {
            let mut rng = StdRng::seed_from_u64(self.params.seed);
            let mut picked = rand::seq::index::sample(&mut rng, n_rows, self.params.max_background).into_vec();
            picked.sort_unstable();
            training_features.select(Axis(0), &picked)
        };

        let base_value = TreeExplainer::mean_prediction(learner.forest(), rows.view(), Parallelism::Parallel)?;
        log::debug!(
            "attribution background: {} of {} rows, learner '{}', base value {:.4}",
            rows.nrows(),
            n_rows,
            learner.name(),
            base_value
        );
        self.background = Some(Background { learner: learner.name().to_string(), rows, base_value });
        Ok(())
    }

    fn explained_learner(&self) -> Result<&TrainedLearner, ExplainError> {
        match &self.params.learner {
            Some(name) => {
                self.model.learner(name).ok_or_else(|| ExplainError::UnknownLearner(name.clone()))
            }
            None => self.model.primary_learner().ok_or(ExplainError::Untrained),
        }
    }

    /// Explain keyed input. Extra keys are ignored, missing ones are 0.
    pub fn explain(&self, input: &FeatureMap) -> Result<AttributionResult, ExplainError> {
        let background = self.background.as_ref().ok_or(ExplainError::NotConfigured)?;
        let schema = self.model.schema().map_err(|_| ExplainError::Untrained)?;
        let vector = schema.reduce(input);
        self.explain_one(background, vector.as_slice())
    }

    /// Explain a vector reduced against the model's schema.
    pub fn explain_vector(&self, input: &FeatureVector) -> Result<AttributionResult, ExplainError> {
        let background = self.background.as_ref().ok_or(ExplainError::NotConfigured)?;
        self.model.schema().map_err(|_| ExplainError::Untrained)?.check(input)?;
        self.explain_one(background, input.as_slice())
    }

    /// Explain every row of a schema-ordered matrix.
    pub fn explain_batch(&self, rows: ArrayView2<'_, f32>) -> Result<Vec<AttributionResult>, ExplainError> {
        let background = self.background.as_ref().ok_or(ExplainError::NotConfigured)?;
        self.explain_rows(background, rows)
    }

    fn explain_one(&self, background: &Background, x: &[f32]) -> Result<AttributionResult, ExplainError> {
        let rows = ArrayView1::from(x).insert_axis(Axis(0));
        self.explain_rows(background, rows)?.pop().ok_or(ExplainError::EmptyBackground)
    }

    fn explain_rows(
        &self,
        background: &Background,
        rows: ArrayView2<'_, f32>,
    ) -> Result<Vec<AttributionResult>, ExplainError> {
        let schema = self.model.schema().map_err(|_| ExplainError::Untrained)?;
        let learner = self
            .model
            .learner(&background.learner)
            .ok_or_else(|| ExplainError::UnknownLearner(background.learner.clone()))?;

        let explainer =
            TreeExplainer::with_base_value(learner.forest(), background.rows.view(), background.base_value);
        let shap = explainer.shap_values(rows, Parallelism::Parallel)?;

        let results = rows
            .rows()
            .into_iter()
            .enumerate()
            .map(|(sample, row)| {
                let x = row.to_vec();
                let contributions: Vec<Contribution> = schema
                    .names()
                    .iter()
                    .zip(&x)
                    .zip(shap.feature_shap(sample))
                    .map(|((name, &value), &contribution)| Contribution {
                        feature: name.clone(),
                        value,
                        contribution,
                    })
                    .collect();
                let top_factors = rank_factors(&contributions, self.params.top_k);
                AttributionResult {
                    contributions,
                    base_value: shap.base_value(sample),
                    prediction: learner.predict_row(&x),
                    learner: background.learner.clone(),
                    top_factors,
                }
            })
            .collect();
        Ok(results)
    }
}

/// The `k` largest contributions by magnitude. Ties keep schema order.
pub(crate) fn rank_factors(contributions: &[Contribution], k: usize) -> Vec<Factor> {
    let total: f64 = contributions.iter().map(|c| c.contribution.abs()).sum();
    let mut order: Vec<usize> = (0..contributions.len()).collect();
    order.sort_by(|&a, &b| {
        contributions[b].contribution.abs().total_cmp(&contributions[a].contribution.abs())
    });

    order
        .into_iter()
        .take(k)
        .map(|i| {
            let c = &contributions[i];
            let direction = Direction::of(c.contribution);
            let percentage = if total > 0.0 { c.contribution.abs() / total * 100.0 } else { 0.0 };
            Factor {
                feature: c.feature.clone(),
                value: c.value,
                contribution: c.contribution,
                percentage,
                direction,
                description: describe(&c.feature, c.value, direction),
            }
        })
        .collect()
}

/// Whole numbers print without a fractional part.
fn display_value(value: f32) -> String {
    if value.fract() == 0.0 && value.abs() < 1e9 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn describe(feature: &str, value: f32, direction: Direction) -> String {
    let v = display_value(value);
    let flag = value != 0.0;
    match feature {
        "area" => format!("Property area of {v} sqft {direction} the price"),
        "bedrooms" => format!("Having {v} bedrooms {direction} the price"),
        "bathrooms" => format!("Having {v} bathrooms {direction} the price"),
        "stories" => format!("Being {v} stories tall {direction} the price"),
        "parking" => format!("Having {v} parking spots {direction} the price"),
        "mainroad" => {
            let lead = if flag { "Being on" } else { "Not being on" };
            format!("{lead} main road {direction} the price")
        }
        "airconditioning" => {
            let lead = if flag { "Having" } else { "Not having" };
            format!("{lead} AC {direction} the price")
        }
        "furnishing_score" => format!("Furnishing level {direction} the price"),
        "amenity_score" => format!("Total amenities count {direction} the price"),
        "crime_index" => format!("Local crime rate {direction} the price"),
        "safety_score" => format!("Area safety level {direction} the price"),
        other => format!("{other} = {v} {direction} the price"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureSchema;
    use crate::model::LearnerConfig;
    use crate::repr::{Forest, MutableTree};
    use crate::training::RegressionMetrics;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rstest::rstest;
    use std::collections::BTreeMap;

    fn model() -> Arc<EnsembleModel> {
        // area < 5000 ? 3e6 : 6e6 (plus base), and a second learner on bedrooms
        let mut t = MutableTree::with_root(2.0);
        let (l, r) = t.split(0, 0, 5000.0, 1.0, 1.0, 1.0);
        t.set_leaf_value(l, -1.5e6);
        t.set_leaf_value(r, 1.5e6);
        let mut a = Forest::new(4.5e6);
        a.push_tree(t.freeze());

        let mut s = MutableTree::with_root(2.0);
        let (l, r) = s.split(0, 1, 3.0, 1.0, 1.0, 1.0);
        s.set_leaf_value(l, -1.0e6);
        s.set_leaf_value(r, 1.0e6);
        let mut b = Forest::new(4.0e6);
        b.push_tree(s.freeze());

        let metrics = RegressionMetrics { rmse: 0.0, mae: 0.0, r2: 1.0, mape: None };
        let learners = vec![
            TrainedLearner::new(LearnerConfig::depth_wise().with_name("depthwise"), a, metrics),
            TrainedLearner::new(LearnerConfig::leaf_wise().with_name("leafwise"), b, metrics),
        ];
        let weights = BTreeMap::from([("depthwise".to_string(), 0.6), ("leafwise".to_string(), 0.4)]);
        let schema = FeatureSchema::new(["area", "bedrooms", "mainroad"]).unwrap();
        Arc::new(EnsembleModel::from_parts(schema, learners, weights, None).unwrap())
    }

    fn background() -> Array2<f32> {
        array![[3000.0f32, 2.0, 0.0], [8000.0, 4.0, 1.0]]
    }

    fn input(area: f32, bedrooms: f32) -> FeatureMap {
        FeatureMap::from([("area".to_string(), area), ("bedrooms".to_string(), bedrooms)])
    }

    #[test]
    fn explain_before_setup_fails() {
        let engine = AttributionEngine::new(model(), AttributionParams::default());
        assert!(!engine.is_configured());
        assert_eq!(engine.explain(&input(1.0, 1.0)).unwrap_err(), ExplainError::NotConfigured);
    }

    #[test]
    fn untrained_model_cannot_be_set_up() {
        let mut engine = AttributionEngine::new(Arc::new(EnsembleModel::new()), AttributionParams::default());
        assert_eq!(engine.setup(background().view()).unwrap_err(), ExplainError::Untrained);
    }

    #[test]
    fn explains_highest_weight_learner() {
        let mut engine = AttributionEngine::new(model(), AttributionParams::default());
        engine.setup(background().view()).unwrap();
        assert_eq!(engine.learner(), Some("depthwise"));

        let result = engine.explain(&input(9000.0, 2.0)).unwrap();
        assert_eq!(result.learner, "depthwise");
        assert_abs_diff_eq!(result.base_value, 4.5e6);
        assert_abs_diff_eq!(result.prediction, 6.0e6);
        assert_abs_diff_eq!(result.reconstructed(), result.prediction, epsilon = 1e-6);

        // only area matters to this learner
        assert_abs_diff_eq!(result.contributions[0].contribution, 1.5e6);
        assert_eq!(result.contributions[1].contribution, 0.0);

        let top = &result.top_factors[0];
        assert_eq!(top.feature, "area");
        assert_eq!(top.direction, Direction::Increases);
        assert_abs_diff_eq!(top.percentage, 100.0);
        assert_eq!(top.description, "Property area of 9000 sqft increases the price");
    }

    #[test]
    fn configured_learner_is_used() {
        let params = AttributionParams::builder().learner("leafwise").build().unwrap();
        let mut engine = AttributionEngine::new(model(), params);
        engine.setup(background().view()).unwrap();
        let result = engine.explain(&input(9000.0, 2.0)).unwrap();
        assert_eq!(result.learner, "leafwise");
        assert!(result.contributions[1].contribution < 0.0);
        assert_eq!(result.top_factors[0].description, "Having 2 bedrooms decreases the price");
    }

    #[test]
    fn batch_matches_single_rows() {
        let mut engine = AttributionEngine::new(model(), AttributionParams::default());
        assert_eq!(engine.explain_batch(background().view()).unwrap_err(), ExplainError::NotConfigured);
        engine.setup(background().view()).unwrap();

        let rows = array![[9000.0f32, 2.0, 0.0], [1200.0, 5.0, 1.0], [5000.0, 3.0, 0.0]];
        let batch = engine.explain_batch(rows.view()).unwrap();
        assert_eq!(batch.len(), 3);
        for (row, result) in rows.rows().into_iter().zip(&batch) {
            let map: FeatureMap =
                ["area", "bedrooms", "mainroad"].iter().map(|n| n.to_string()).zip(row.iter().copied()).collect();
            let single = engine.explain(&map).unwrap();
            assert_eq!(&single, result);
            assert_abs_diff_eq!(result.reconstructed(), result.prediction, epsilon = 1e-6);
        }
    }

    #[test]
    fn unknown_learner_is_rejected() {
        let params = AttributionParams::builder().learner("missing").build().unwrap();
        let mut engine = AttributionEngine::new(model(), params);
        assert_eq!(
            engine.setup(background().view()).unwrap_err(),
            ExplainError::UnknownLearner("missing".into())
        );
    }

    #[test]
    fn background_is_capped_and_seeded() {
        let rows: Vec<f32> = (0..300).flat_map(|i| [i as f32 * 40.0, 3.0, 1.0]).collect();
        let features = Array2::from_shape_vec((300, 3), rows).unwrap();

        let mut a = AttributionEngine::new(model(), AttributionParams::default());
        a.setup(features.view()).unwrap();
        let mut b = AttributionEngine::new(model(), AttributionParams::default());
        b.setup(features.view()).unwrap();

        assert_eq!(a.n_background(), Some(100));
        let x = input(7000.0, 5.0);
        assert_eq!(a.explain(&x).unwrap(), b.explain(&x).unwrap());
    }

    #[test]
    fn setup_checks_shape() {
        let mut engine = AttributionEngine::new(model(), AttributionParams::default());
        let narrow = array![[1.0f32, 2.0]];
        assert_eq!(
            engine.setup(narrow.view()).unwrap_err(),
            ExplainError::DimensionMismatch { expected: 3, actual: 2 }
        );
        let empty = Array2::<f32>::zeros((0, 3));
        assert_eq!(engine.setup(empty.view()).unwrap_err(), ExplainError::EmptyBackground);
    }

    #[test]
    fn ranking_and_percentages() {
        let contributions: Vec<Contribution> = [("a", 1.0), ("b", -3.0), ("c", 0.0), ("d", 1.0)]
            .into_iter()
            .map(|(f, c)| Contribution { feature: f.into(), value: 1.0, contribution: c })
            .collect();
        let factors = rank_factors(&contributions, 3);
        let names: Vec<&str> = factors.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(names, ["b", "a", "d"]);
        assert_abs_diff_eq!(factors[0].percentage, 60.0);
        assert_eq!(factors[0].direction, Direction::Decreases);

        let zeros = vec![Contribution { feature: "a".into(), value: 0.0, contribution: 0.0 }];
        let factors = rank_factors(&zeros, 5);
        assert_eq!(factors[0].percentage, 0.0);
        assert_eq!(factors[0].direction, Direction::Decreases);
    }

    #[rstest]
    #[case("mainroad", 1.0, Direction::Increases, "Being on main road increases the price")]
    #[case("mainroad", 0.0, Direction::Decreases, "Not being on main road decreases the price")]
    #[case("airconditioning", 0.0, Direction::Increases, "Not having AC increases the price")]
    #[case("stories", 2.0, Direction::Increases, "Being 2 stories tall increases the price")]
    #[case("parking", 1.0, Direction::Decreases, "Having 1 parking spots decreases the price")]
    #[case("safety_score", 6.5, Direction::Increases, "Area safety level increases the price")]
    #[case("bedroom_ratio", 0.5, Direction::Increases, "bedroom_ratio = 0.5 increases the price")]
    fn descriptions(
        #[case] feature: &str,
        #[case] value: f32,
        #[case] direction: Direction,
        #[case] expected: &str,
    ) {
        assert_eq!(describe(feature, value, direction), expected);
    }
}
