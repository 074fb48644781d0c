//! Global feature importance from tree structure.

use serde::{Deserialize, Serialize};

use super::ExplainError;
use crate::repr::{Forest, NodeId};

/// What a split contributes to a feature's importance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceType {
    /// Number of splits on the feature.
    Split,
    /// Total gain of splits on the feature.
    #[default]
    Gain,
    /// Total cover (hessian sum) of splits on the feature.
    Cover,
}

/// Per-feature importance values, indexed by feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    kind: ImportanceType,
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureImportance {
    pub fn new(kind: ImportanceType, names: Vec<String>, values: Vec<f64>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { kind, names, values }
    }

    pub fn kind(&self) -> ImportanceType {
        self.kind
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|i| self.values[i])
    }

    /// Values scaled to sum to 1. All zeros stay zeros.
    pub fn normalized(&self) -> Self {
        let total: f64 = self.values.iter().sum();
        let values = if total > 0.0 {
            self.values.iter().map(|v| v / total).collect()
        } else {
            self.values.clone()
        };
        Self { kind: self.kind, names: self.names.clone(), values }
    }

    /// The `k` most important features, descending. Ties keep feature order.
    pub fn top_k(&self, k: usize) -> Vec<(String, f64)> {
        let mut order: Vec<usize> = (0..self.values.len()).collect();
        order.sort_by(|&a, &b| self.values[b].total_cmp(&self.values[a]));
        order
            .into_iter()
            .take(k)
            .map(|i| (self.names[i].clone(), self.values[i]))
            .collect()
    }

    /// Element-wise mean of importances over the same features.
    pub fn average(kind: ImportanceType, items: &[FeatureImportance]) -> Option<Self> {
        let first = items.first()?;
        let n = first.values.len();
        let mut values = vec![0.0; n];
        for item in items {
            for (acc, v) in values.iter_mut().zip(&item.values) {
                *acc += v;
            }
        }
        for v in &mut values {
            *v /= items.len() as f64;
        }
        Some(Self { kind, names: first.names.clone(), values })
    }
}

/// Sum split counts, gains or covers per feature over every tree.
pub fn compute_forest_importance(
    forest: &Forest,
    names: &[String],
    kind: ImportanceType,
) -> Result<FeatureImportance, ExplainError> {
    let mut values = vec![0.0f64; names.len()];

    for tree in forest.trees() {
        let stats = match kind {
            ImportanceType::Split => None,
            ImportanceType::Gain => {
                Some(tree.gains().ok_or(ExplainError::MissingNodeStats("gain"))?)
            }
            ImportanceType::Cover => {
                Some(tree.covers().ok_or(ExplainError::MissingNodeStats("cover"))?)
            }
        };

        for node in 0..tree.n_nodes() as NodeId {
            if tree.is_leaf(node) {
                continue;
            }
            let feature = tree.split_index(node) as usize;
            let slot = values.get_mut(feature).ok_or(ExplainError::DimensionMismatch {
                expected: names.len(),
                actual: feature + 1,
            })?;
            *slot += match stats {
                None => 1.0,
                Some(s) => s[node as usize] as f64,
            };
        }
    }

    Ok(FeatureImportance::new(kind, names.to_vec(), values))
}
