//! Model explainability.
//!
//! - [`compute_forest_importance`], [`FeatureImportance`]: global importance
//!   from split counts, gains or covers
//! - [`TreeExplainer`], [`ShapValues`]: exact interventional TreeSHAP
//!   against a background sample
//! - [`AttributionEngine`]: per-prediction attributions with ranked,
//!   human-readable factors

mod attribution;
mod importance;
pub mod shap;

pub use attribution::{AttributionEngine, AttributionResult, Contribution, Direction, Factor};
pub use importance::{compute_forest_importance, FeatureImportance, ImportanceType};
pub use shap::{ShapValues, TreeExplainer};

use crate::data::SchemaError;

/// Errors raised by explainers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExplainError {
    #[error("attribution engine has no background data; call setup first")]
    NotConfigured,

    #[error("model is not trained")]
    Untrained,

    #[error("model has no learner named '{0}'")]
    UnknownLearner(String),

    #[error("background data has no rows")]
    EmptyBackground,

    #[error("expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("trees lack {0} statistics")]
    MissingNodeStats(&'static str),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}
