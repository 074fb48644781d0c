//! Learner and ensemble configuration with validating builders.
//!
//! # Example
//!
//! ```
//! use appraise::model::{EnsembleConfig, LearnerConfig};
//! use appraise::training::GrowthStrategy;
//!
//! let config = EnsembleConfig::builder()
//!     .learners(vec![
//!         LearnerConfig::builder()
//!             .name("shallow")
//!             .n_trees(50)
//!             .growth(GrowthStrategy::DepthWise { max_depth: 3 })
//!             .build()
//!             .unwrap(),
//!         LearnerConfig::leaf_wise(),
//!     ])
//!     .test_fraction(0.25)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.learners.len(), 2);
//! ```

use std::collections::HashSet;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::data::SchemaPolicy;

use crate::training::{
    GBDTParams, GainParams, GrowthStrategy, MapePolicy, Verbosity,
};

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("learning_rate must be positive, got {0}")]
    InvalidLearningRate(f32),

    #[error("n_trees must be at least 1")]
    InvalidNTrees,

    #[error("{field} must be in (0, 1], got {value}")]
    InvalidSamplingRatio { field: &'static str, value: f32 },

    #[error("{field} must be non-negative, got {value}")]
    InvalidRegularization { field: &'static str, value: f32 },

    #[error("tree size limit must be at least {min}, got {value}")]
    InvalidTreeLimit { min: u32, value: u32 },

    #[error("max_bins must be in [2, 65536], got {0}")]
    InvalidMaxBins(usize),

    #[error("learner name must not be empty")]
    EmptyName,

    #[error("ensemble needs at least one learner")]
    NoLearners,

    #[error("duplicate learner name '{0}'")]
    DuplicateLearner(String),

    #[error("test_fraction must be in (0, 1), got {0}")]
    InvalidTestFraction(f32),

    #[error("weight_floor must be positive and finite, got {0}")]
    InvalidWeightFloor(f64),

    #[error("{field} must be positive, got {value}")]
    InvalidServingParam { field: &'static str, value: f64 },

    #[error("invalid configuration document: {0}")]
    Parse(String),
}

// =============================================================================
// Parameter groups
// =============================================================================

/// L1/L2 regularization and split constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegularizationParams {
    /// L2 penalty on leaf weights. Default: 1.0.
    pub lambda: f32,
    /// L1 penalty on leaf weights. Default: 0.0.
    pub alpha: f32,
    /// Minimum hessian sum per child. Default: 1.0.
    pub min_child_weight: f32,
    /// Minimum gain to split. Default: 0.0.
    pub min_gain: f32,
    /// Minimum rows per child. Default: 1.
    pub min_samples_leaf: u32,
}

impl Default for RegularizationParams {
    fn default() -> Self {
        Self { lambda: 1.0, alpha: 0.0, min_child_weight: 1.0, min_gain: 0.0, min_samples_leaf: 1 }
    }
}

impl RegularizationParams {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("lambda", self.lambda),
            ("alpha", self.alpha),
            ("min_child_weight", self.min_child_weight),
            ("min_gain", self.min_gain),
        ] {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(ConfigError::InvalidRegularization { field, value });
            }
        }
        Ok(())
    }
}

/// Row and column subsampling, both per tree. Rates in (0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub subsample: f32,
    pub colsample_bytree: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self { subsample: 1.0, colsample_bytree: 1.0 }
    }
}

impl SamplingParams {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in
            [("subsample", self.subsample), ("colsample_bytree", self.colsample_bytree)]
        {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidSamplingRatio { field, value });
            }
        }
        Ok(())
    }
}

// =============================================================================
// LearnerConfig
// =============================================================================

/// Configuration of one boosted-tree learner.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct LearnerConfig {
    /// Key of the learner inside the ensemble.
    #[builder(into, default = String::from("gbdt"))]
    pub name: String,

    /// Number of boosting rounds. Default: 500.
    #[builder(default = 500)]
    pub n_trees: u32,

    /// Shrinkage. Default: 0.05.
    #[builder(default = 0.05)]
    pub learning_rate: f32,

    /// Tree growth. Default: depth-wise, depth 6.
    #[builder(default)]
    pub growth: GrowthStrategy,

    #[builder(default)]
    pub regularization: RegularizationParams,

    #[builder(default)]
    pub sampling: SamplingParams,

    /// Histogram bins per feature. Default: 256.
    #[builder(default = 256)]
    pub max_bins: usize,

    /// Seed for row and column sampling. Default: 42.
    #[builder(default = 42)]
    pub seed: u64,
}

impl<S: learner_config_builder::IsComplete> LearnerConfigBuilder<S> {
    /// Build and validate the configuration.
    pub fn build(self) -> Result<LearnerConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl LearnerConfig {
    /// Depth-wise learner: 500 trees, depth 6, rate 0.05, 80% row and
    /// column sampling.
    pub fn depth_wise() -> Self {
        Self {
            name: "depthwise".into(),
            n_trees: 500,
            learning_rate: 0.05,
            growth: GrowthStrategy::DepthWise { max_depth: 6 },
            regularization: RegularizationParams::default(),
            sampling: SamplingParams { subsample: 0.8, colsample_bytree: 0.8 },
            max_bins: 256,
            seed: 42,
        }
    }

    /// Leaf-wise learner: 500 trees, 31 leaves, rate 0.05, 80% row and
    /// column sampling, no L2 penalty, at least 20 rows per leaf.
    pub fn leaf_wise() -> Self {
        Self {
            name: "leafwise".into(),
            n_trees: 500,
            learning_rate: 0.05,
            growth: GrowthStrategy::LeafWise { max_leaves: 31 },
            regularization: RegularizationParams {
                lambda: 0.0,
                min_child_weight: 1e-3,
                min_samples_leaf: 20,
                ..Default::default()
            },
            sampling: SamplingParams { subsample: 0.8, colsample_bytree: 0.8 },
            max_bins: 255,
            seed: 42,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_n_trees(mut self, n_trees: u32) -> Self {
        self.n_trees = n_trees;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(ConfigError::InvalidLearningRate(self.learning_rate));
        }
        if self.n_trees == 0 {
            return Err(ConfigError::InvalidNTrees);
        }
        match self.growth {
            GrowthStrategy::DepthWise { max_depth } if max_depth < 1 => {
                return Err(ConfigError::InvalidTreeLimit { min: 1, value: max_depth });
            }
            GrowthStrategy::LeafWise { max_leaves } if max_leaves < 2 => {
                return Err(ConfigError::InvalidTreeLimit { min: 2, value: max_leaves });
            }
            _ => {}
        }
        if !(2..=65536).contains(&self.max_bins) {
            return Err(ConfigError::InvalidMaxBins(self.max_bins));
        }
        self.regularization.validate()?;
        self.sampling.validate()?;
        Ok(())
    }

    /// Trainer parameters for this learner.
    pub fn to_params(&self) -> GBDTParams {
        GBDTParams {
            n_trees: self.n_trees,
            learning_rate: self.learning_rate,
            growth_strategy: self.growth,
            gain: GainParams {
                reg_lambda: self.regularization.lambda,
                reg_alpha: self.regularization.alpha,
                min_gain: self.regularization.min_gain,
                min_child_weight: self.regularization.min_child_weight,
                min_samples_leaf: self.regularization.min_samples_leaf,
            },
            subsample: self.sampling.subsample,
            colsample_bytree: self.sampling.colsample_bytree,
            max_bins: self.max_bins,
            seed: self.seed,
        }
    }
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self::depth_wise()
    }
}

// =============================================================================
// EnsembleConfig
// =============================================================================

fn default_learners() -> Vec<LearnerConfig> {
    vec![LearnerConfig::depth_wise(), LearnerConfig::leaf_wise()]
}

/// Configuration of an ensemble training run.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct EnsembleConfig {
    /// Learners to fit, in order. Default: one depth-wise and one leaf-wise.
    #[builder(default = default_learners())]
    pub learners: Vec<LearnerConfig>,

    /// Held-out fraction. Default: 0.2.
    #[builder(default = 0.2)]
    pub test_fraction: f32,

    /// Seed of the train/test shuffle. Default: 42.
    #[builder(default = 42)]
    pub split_seed: u64,

    /// Lower bound applied to each learner's R² before normalizing into
    /// weights. Default: 1e-6.
    #[builder(default = 1e-6)]
    pub weight_floor: f64,

    #[builder(default)]
    pub mape_policy: MapePolicy,

    /// Threads for training. 0 = all cores.
    #[builder(default)]
    pub n_threads: usize,

    #[builder(default)]
    pub verbosity: Verbosity,
}

impl<S: ensemble_config_builder::IsComplete> EnsembleConfigBuilder<S> {
    /// Build and validate the configuration.
    pub fn build(self) -> Result<EnsembleConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl EnsembleConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.learners.is_empty() {
            return Err(ConfigError::NoLearners);
        }
        let mut seen = HashSet::new();
        for learner in &self.learners {
            learner.validate()?;
            if !seen.insert(learner.name.as_str()) {
                return Err(ConfigError::DuplicateLearner(learner.name.clone()));
            }
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ConfigError::InvalidTestFraction(self.test_fraction));
        }
        if !(self.weight_floor > 0.0) || !self.weight_floor.is_finite() {
            return Err(ConfigError::InvalidWeightFloor(self.weight_floor));
        }
        Ok(())
    }
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self::builder().build().expect("default config is valid")
    }
}

// =============================================================================
// AttributionParams
// =============================================================================

/// Settings of the attribution engine.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct AttributionParams {
    /// Learner to explain. `None` picks the highest-weight learner.
    #[builder(into)]
    pub learner: Option<String>,

    /// Background rows kept from the training matrix. Default: 100.
    #[builder(default = 100)]
    pub max_background: usize,

    /// Seed of the background sample. Default: 42.
    #[builder(default = 42)]
    pub seed: u64,

    /// Factors reported per explanation. Default: 5.
    #[builder(default = 5)]
    pub top_k: usize,
}

impl<S: attribution_params_builder::IsComplete> AttributionParamsBuilder<S> {
    pub fn build(self) -> Result<AttributionParams, ConfigError> {
        let params = self.__build_internal();
        params.validate()?;
        Ok(params)
    }
}

impl AttributionParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_background == 0 {
            return Err(ConfigError::InvalidServingParam { field: "max_background", value: 0.0 });
        }
        if self.top_k == 0 {
            return Err(ConfigError::InvalidServingParam { field: "top_k", value: 0.0 });
        }
        if matches!(&self.learner, Some(name) if name.trim().is_empty()) {
            return Err(ConfigError::EmptyName);
        }
        Ok(())
    }
}

impl Default for AttributionParams {
    fn default() -> Self {
        Self::builder().build().expect("default config is valid")
    }
}

// =============================================================================
// ServingConfig
// =============================================================================

/// Settings of a serving context.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
#[serde(default)]
pub struct ServingConfig {
    #[builder(default)]
    pub attribution: AttributionParams,

    /// Comparable properties returned per query. Default: 5.
    #[builder(default = 5)]
    pub n_similar: usize,

    /// Half-width of the fair-price band, in percent. Default: 10.
    #[builder(default = 10.0)]
    pub market_band_pct: f64,

    /// Upper bound on a live city lookup, in seconds. Default: 30.
    #[builder(default = 30.0)]
    pub lookup_timeout_secs: f64,

    /// Reduction of request features to the model schema. Default:
    /// zero-fill missing features.
    #[builder(default)]
    pub schema_policy: SchemaPolicy,
}

impl<S: serving_config_builder::IsComplete> ServingConfigBuilder<S> {
    pub fn build(self) -> Result<ServingConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl ServingConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.attribution.validate()?;
        if self.n_similar == 0 {
            return Err(ConfigError::InvalidServingParam { field: "n_similar", value: 0.0 });
        }
        for (field, value) in [
            ("market_band_pct", self.market_band_pct),
            ("lookup_timeout_secs", self.lookup_timeout_secs),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::InvalidServingParam { field, value });
            }
        }
        Ok(())
    }

    pub fn lookup_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.lookup_timeout_secs)
    }
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self::builder().build().expect("default config is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EnsembleConfig::default();
        assert_eq!(config.learners.len(), 2);
        assert_eq!(config.learners[0].name, "depthwise");
        assert_eq!(config.learners[1].name, "leafwise");
        assert_eq!(config.test_fraction, 0.2);
        assert_eq!(config.split_seed, 42);
    }

    #[test]
    fn learner_builder_validates() {
        let err = LearnerConfig::builder().learning_rate(0.0).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidLearningRate(0.0));

        let err = LearnerConfig::builder().n_trees(0).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidNTrees);

        let err = LearnerConfig::builder()
            .sampling(SamplingParams { subsample: 1.5, ..Default::default() })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSamplingRatio { field: "subsample", .. }));

        let err = LearnerConfig::builder()
            .growth(GrowthStrategy::LeafWise { max_leaves: 1 })
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidTreeLimit { min: 2, value: 1 });
    }

    #[test]
    fn ensemble_rejects_duplicates_and_empty() {
        let err = EnsembleConfig::builder().learners(vec![]).build().unwrap_err();
        assert_eq!(err, ConfigError::NoLearners);

        let err = EnsembleConfig::builder()
            .learners(vec![LearnerConfig::depth_wise(), LearnerConfig::depth_wise()])
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateLearner("depthwise".into()));

        let err = EnsembleConfig::builder().test_fraction(1.0).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidTestFraction(1.0));
    }

    #[test]
    fn from_json_fills_defaults() {
        let config = EnsembleConfig::from_json(
            r#"{"test_fraction": 0.3, "learners": [{"name": "quick", "n_trees": 10}]}"#,
        )
        .unwrap();
        assert_eq!(config.test_fraction, 0.3);
        assert_eq!(config.learners.len(), 1);
        assert_eq!(config.learners[0].name, "quick");
        assert_eq!(config.learners[0].n_trees, 10);
        assert_eq!(config.learners[0].learning_rate, 0.05);
        assert_eq!(config.split_seed, 42);
    }

    #[test]
    fn from_json_validates() {
        let err = EnsembleConfig::from_json(r#"{"learners": [{"learning_rate": -1.0}]}"#).unwrap_err();
        assert_eq!(err, ConfigError::InvalidLearningRate(-1.0));
        assert!(matches!(EnsembleConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = EnsembleConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(EnsembleConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn to_params_maps_fields() {
        let params = LearnerConfig::leaf_wise().to_params();
        assert_eq!(params.growth_strategy, GrowthStrategy::LeafWise { max_leaves: 31 });
        assert_eq!(params.gain.reg_lambda, 0.0);
        assert_eq!(params.gain.min_samples_leaf, 20);
        assert_eq!(params.subsample, 0.8);
    }

    #[test]
    fn serving_defaults_and_validation() {
        let config = ServingConfig::default();
        assert_eq!(config.n_similar, 5);
        assert_eq!(config.market_band_pct, 10.0);
        assert_eq!(config.lookup_timeout().as_secs(), 30);
        assert_eq!(config.attribution.max_background, 100);
        assert_eq!(config.attribution.top_k, 5);
        assert_eq!(config.attribution.learner, None);
        assert_eq!(config.schema_policy, SchemaPolicy::ZeroFill);

        let err = ServingConfig::builder().market_band_pct(0.0).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServingParam { field: "market_band_pct", .. }));

        let err = AttributionParams::builder().max_background(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServingParam { field: "max_background", .. }));
    }

    #[test]
    fn serving_from_json() {
        let config = ServingConfig::from_json(
            r#"{"n_similar": 3, "attribution": {"learner": "leafwise"}}"#,
        )
        .unwrap();
        assert_eq!(config.n_similar, 3);
        assert_eq!(config.attribution.learner.as_deref(), Some("leafwise"));
        assert_eq!(config.attribution.seed, 42);
        assert_eq!(config.schema_policy, SchemaPolicy::ZeroFill);
        assert!(ServingConfig::from_json(r#"{"lookup_timeout_secs": -1}"#).is_err());

        let strict = ServingConfig::from_json(r#"{"schema_policy": "strict"}"#).unwrap();
        assert_eq!(strict.schema_policy, SchemaPolicy::Strict);
    }
}
