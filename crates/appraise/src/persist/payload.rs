//! Serialized form of an [`EnsembleModel`](crate::model::EnsembleModel).
//!
//! Every field is required on load: `Option` fields must be present
//! (possibly `null` in JSON), never omitted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{EnsembleMetrics, LearnerConfig};
use crate::training::RegressionMetrics;

/// Version-tagged payload. New versions add variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    V1(PayloadV1),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadV1 {
    /// Schema in training order. Empty for an untrained model.
    pub feature_names: Vec<String>,
    pub learners: Vec<LearnerPayload>,
    pub weights: BTreeMap<String, f64>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub metrics: Option<EnsembleMetrics>,
    pub trained: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerPayload {
    pub config: LearnerConfig,
    pub metrics: RegressionMetrics,
    pub forest: ForestPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestPayload {
    pub base_score: f32,
    pub trees: Vec<TreePayload>,
}

/// One tree as parallel node arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreePayload {
    pub split_features: Vec<u32>,
    pub thresholds: Vec<f32>,
    pub left_children: Vec<u32>,
    pub right_children: Vec<u32>,
    pub default_left: Vec<bool>,
    pub is_leaf: Vec<bool>,
    pub leaf_values: Vec<f32>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub gains: Option<Vec<f32>>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub covers: Option<Vec<f32>>,
}

/// Name written to the `format` field of JSON documents.
pub const JSON_FORMAT_NAME: &str = "appraise";

/// Self-describing JSON wrapper around a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDocument {
    pub format: String,
    pub version_major: u8,
    pub version_minor: u8,
    pub model: PayloadV1,
}
