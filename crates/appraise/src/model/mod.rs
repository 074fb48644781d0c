//! Trained models and their configuration.
//!
//! - [`LearnerConfig`] / [`EnsembleConfig`]: validated training settings.
//! - [`TrainedLearner`]: one fitted forest with held-out metrics.
//! - [`EnsembleModel`]: the weighted blend served read-only after training.

mod config;
mod ensemble;
mod learner;
mod metrics;

pub use config::{
    AttributionParams, ConfigError, EnsembleConfig, LearnerConfig, RegularizationParams,
    SamplingParams, ServingConfig,
};
pub use ensemble::{EnsembleImportance, EnsembleModel, ModelError, PredictError, WEIGHT_SUM_TOLERANCE};
pub use learner::TrainedLearner;
pub use metrics::EnsembleMetrics;
