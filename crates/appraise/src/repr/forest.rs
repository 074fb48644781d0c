//! Canonical forest representation (additive collection of trees).

use ndarray::ArrayView2;

use super::tree::{Tree, TreeValidationError};
use crate::utils::Parallelism;

/// Structural validation errors for [`Forest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForestValidationError {
    #[error("base score is not finite")]
    NonFiniteBaseScore,

    #[error("tree {tree_idx}: {error}")]
    InvalidTree { tree_idx: usize, error: TreeValidationError },
}

/// Boosted regression forest: `base_score + Σ tree(x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Forest {
    trees: Vec<Tree>,
    base_score: f32,
}

impl Forest {
    /// Empty forest with the given base score.
    pub fn new(base_score: f32) -> Self {
        Self { trees: Vec::new(), base_score }
    }

    pub fn push_tree(&mut self, tree: Tree) {
        self.trees.push(tree);
    }

    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn base_score(&self) -> f32 {
        self.base_score
    }

    #[inline]
    pub fn tree(&self, idx: usize) -> &Tree {
        &self.trees[idx]
    }

    pub fn trees(&self) -> impl Iterator<Item = &Tree> {
        self.trees.iter()
    }

    /// Predict a single row. Accumulates in `f64`.
    #[inline]
    pub fn predict_row(&self, features: &[f32]) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score as f64, |acc, tree| acc + tree.predict_row(features) as f64)
    }

    /// Predict every row of a `[n_samples, n_features]` matrix.
    pub fn predict(&self, features: ArrayView2<'_, f32>, parallelism: Parallelism) -> Vec<f64> {
        parallelism.maybe_par_map(0..features.nrows(), |i| {
            let row = features.row(i);
            match row.as_slice() {
                Some(slice) => self.predict_row(slice),
                None => self.predict_row(&row.to_vec()),
            }
        })
    }

    /// Validate every tree, optionally bounding split features.
    pub fn validate(&self, n_features: Option<usize>) -> Result<(), ForestValidationError> {
        if !self.base_score.is_finite() {
            return Err(ForestValidationError::NonFiniteBaseScore);
        }
        for (tree_idx, tree) in self.trees.iter().enumerate() {
            tree.validate(n_features)
                .map_err(|error| ForestValidationError::InvalidTree { tree_idx, error })?;
        }
        Ok(())
    }
}
