//! Training report stored with a model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::training::RegressionMetrics;

/// Held-out scores and bookkeeping from one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMetrics {
    /// Per-learner held-out metrics.
    pub individual: BTreeMap<String, RegressionMetrics>,
    /// Metrics of the weighted blend on the same held-out rows.
    pub ensemble: RegressionMetrics,
    pub weights: BTreeMap<String, f64>,
    pub n_learners: usize,
    pub n_features: usize,
    /// Rows in the full dataset.
    pub n_samples: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub trained_at: DateTime<Utc>,
}
