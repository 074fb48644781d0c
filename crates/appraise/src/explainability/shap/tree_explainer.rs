//! Interventional TreeSHAP.
//!
//! For a query `x` and a background row `z`, the game is
//! `v(S) = f(x_S, z_S̄)`: features in `S` take their value from `x`, the
//! rest from `z`. Its exact Shapley values are computed per tree by walking
//! every root-to-leaf path that some coalition can reach, then averaged over
//! the background. The attributions of one query sum to
//! `f(x) - mean_z f(z)`.
//!
//! A path assigns each split feature where `x` and `z` disagree to one side.
//! With `a` features taken from `x` and `b` from `z`, a leaf of value `v` is
//! reached exactly by the coalitions containing the `x` side and none of the
//! `z` side, which gives every `x`-side feature
//! `v·(a-1)!·b!/(a+b)!` and every `z`-side feature `-v·a!·(b-1)!/(a+b)!`.

use ndarray::ArrayView2;

use super::ShapValues;
use crate::explainability::ExplainError;
use crate::repr::{Forest, NodeId, Tree};
use crate::utils::Parallelism;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Free,
    Query,
    Background,
}

/// Feature assignment along the current path.
struct PathState {
    side: Vec<Side>,
    query: Vec<usize>,
    background: Vec<usize>,
}

impl PathState {
    fn new(n_features: usize) -> Self {
        Self { side: vec![Side::Free; n_features], query: Vec::new(), background: Vec::new() }
    }
}

/// `C(n, k)` in floating point.
fn binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (1..=k).fold(1.0, |acc, i| acc * (n - k + i) as f64 / i as f64)
}

/// Exact interventional SHAP for one forest against a background sample.
pub struct TreeExplainer<'a> {
    forest: &'a Forest,
    background: ArrayView2<'a, f32>,
    base_value: f64,
}

impl<'a> TreeExplainer<'a> {
    /// Create an explainer. The base value is the mean forest prediction
    /// over the background rows.
    ///
    /// # Errors
    ///
    /// `EmptyBackground` without rows; `DimensionMismatch` when a split
    /// references a column the background does not have.
    pub fn new(forest: &'a Forest, background: ArrayView2<'a, f32>) -> Result<Self, ExplainError> {
        let base_value = Self::mean_prediction(forest, background, Parallelism::Sequential)?;
        Ok(Self { forest, background, base_value })
    }

    /// Create an explainer with a precomputed base value.
    pub(crate) fn with_base_value(
        forest: &'a Forest,
        background: ArrayView2<'a, f32>,
        base_value: f64,
    ) -> Self {
        Self { forest, background, base_value }
    }

    /// Mean prediction of `forest` over the background rows.
    pub fn mean_prediction(
        forest: &Forest,
        background: ArrayView2<'_, f32>,
        parallelism: Parallelism,
    ) -> Result<f64, ExplainError> {
        if background.nrows() == 0 {
            return Err(ExplainError::EmptyBackground);
        }
        let needed = forest.trees().filter_map(Tree::max_split_feature).max();
        if let Some(max) = needed {
            if max as usize >= background.ncols() {
                return Err(ExplainError::DimensionMismatch {
                    expected: max as usize + 1,
                    actual: background.ncols(),
                });
            }
        }
        let preds = forest.predict(background, parallelism);
        Ok(preds.iter().sum::<f64>() / preds.len() as f64)
    }

    #[inline]
    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    pub fn n_background(&self) -> usize {
        self.background.nrows()
    }

    /// Contributions for one row, one per background column.
    pub fn explain_row(&self, x: &[f32], parallelism: Parallelism) -> Result<Vec<f64>, ExplainError> {
        let n_features = self.background.ncols();
        if x.len() != n_features {
            return Err(ExplainError::DimensionMismatch { expected: n_features, actual: x.len() });
        }

        let per_background: Vec<Vec<f64>> =
            parallelism.maybe_par_map(0..self.background.nrows(), |i| {
                let row = self.background.row(i);
                let z = row.to_vec();
                let mut phi = vec![0.0f64; n_features];
                let mut state = PathState::new(n_features);
                for tree in self.forest.trees() {
                    tree_shap(tree, 0, x, &z, &mut state, &mut phi);
                }
                phi
            });

        let mut phi = vec![0.0f64; n_features];
        for contribution in &per_background {
            for (acc, c) in phi.iter_mut().zip(contribution) {
                *acc += c;
            }
        }
        let n = per_background.len() as f64;
        phi.iter_mut().for_each(|v| *v /= n);
        Ok(phi)
    }

    /// SHAP values for every row of `features`.
    pub fn shap_values(
        &self,
        features: ArrayView2<'_, f32>,
        parallelism: Parallelism,
    ) -> Result<ShapValues, ExplainError> {
        let n_features = self.background.ncols();
        let mut shap = ShapValues::new(features.nrows(), n_features);
        for (sample, row) in features.rows().into_iter().enumerate() {
            let phi = self.explain_row(&row.to_vec(), parallelism)?;
            for (feature, value) in phi.into_iter().enumerate() {
                shap.set(sample, feature, value);
            }
            shap.set_base_value(sample, self.base_value);
        }
        Ok(shap)
    }
}

fn tree_shap(
    tree: &Tree,
    node: NodeId,
    x: &[f32],
    z: &[f32],
    state: &mut PathState,
    phi: &mut [f64],
) {
    if tree.is_leaf(node) {
        let (a, b) = (state.query.len(), state.background.len());
        if a + b == 0 {
            // every coalition reaches this leaf
            return;
        }
        let v = tree.leaf_value(node) as f64;
        let m = a + b;
        if a > 0 {
            let w = v / (a as f64 * binomial(m, a));
            for &f in &state.query {
                phi[f] += w;
            }
        }
        if b > 0 {
            let w = v / (b as f64 * binomial(m, b));
            for &f in &state.background {
                phi[f] -= w;
            }
        }
        return;
    }

    let f = tree.split_index(node) as usize;
    match state.side[f] {
        Side::Query => tree_shap(tree, tree.next_node(node, x[f]), x, z, state, phi),
        Side::Background => tree_shap(tree, tree.next_node(node, z[f]), x, z, state, phi),
        Side::Free => {
            let to_x = tree.next_node(node, x[f]);
            let to_z = tree.next_node(node, z[f]);
            if to_x == to_z {
                tree_shap(tree, to_x, x, z, state, phi);
                return;
            }

            state.side[f] = Side::Query;
            state.query.push(f);
            tree_shap(tree, to_x, x, z, state, phi);
            state.query.pop();

            state.side[f] = Side::Background;
            state.background.push(f);
            tree_shap(tree, to_z, x, z, state, phi);
            state.background.pop();

            state.side[f] = Side::Free;
        }
    }
}
