//! appraise: property price estimation with explainable tree ensembles.
//!
//! A blend of gradient-boosted tree learners predicts a price with a 95%
//! band; interventional TreeSHAP attributes it to features; nearest
//! historical listings and a fair-price band place it in its market.
//!
//! # Key Types
//!
//! - [`EnsembleTrainer`] / [`EnsembleConfig`] - fit and blend learners
//! - [`EnsembleModel`] - trained, read-only model; persisted with
//!   [`EnsembleModel::save`] / [`EnsembleModel::load`]
//! - [`AttributionEngine`] - per-feature contributions
//! - [`SimilarityIndex`] / [`MarketComparator`] - comparables and verdict
//! - [`ServingContext`] / [`ContextHandle`] - everything a serving process
//!   needs, swappable at runtime
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use appraise::model::{EnsembleConfig, LearnerConfig, ServingConfig};
//! use appraise::testing::synthetic_housing;
//! use appraise::{EnsembleTrainer, PropertyRecord, ServingContext};
//!
//! let dataset = synthetic_housing(150, 1);
//! let config = EnsembleConfig::builder()
//!     .learners(vec![
//!         LearnerConfig::depth_wise().with_n_trees(20),
//!         LearnerConfig::leaf_wise().with_n_trees(20),
//!     ])
//!     .build()
//!     .unwrap();
//! let model = Arc::new(EnsembleTrainer::new(config).train(&dataset).unwrap());
//! let context = ServingContext::new(model, &dataset, ServingConfig::default()).unwrap();
//!
//! let appraisal = context.appraise(&PropertyRecord::new(4200.0, 3, 2, 2)).unwrap();
//! assert!(appraisal.prediction.price_lower <= appraisal.prediction.predicted_price);
//! assert_eq!(appraisal.similar.len(), 5);
//! ```

// Re-export approx traits for users who want to compare predictions
pub use approx;

pub mod context;
pub mod data;
pub mod error;
pub mod explainability;
pub mod inference;
pub mod market;
pub mod model;
pub mod persist;
pub mod repr;
pub mod testing;
pub mod training;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use context::{Appraisal, ContextHandle, ModelSummary, ServingContext};
pub use error::{Error, Result};

pub use model::{EnsembleConfig, EnsembleModel, LearnerConfig, ServingConfig};
pub use training::EnsembleTrainer;
pub use inference::PredictionResult;
pub use explainability::{AttributionEngine, AttributionResult};
pub use market::{MarketComparator, MarketVerdict, SimilarityEngine, SimilarityIndex};

pub use data::{Dataset, FeatureMap, FeatureSchema, PropertyRecord};

pub use utils::{run_with_threads, Parallelism};
