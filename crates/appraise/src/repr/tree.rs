//! Canonical regression tree representation (SoA).
//!
//! - [`Tree`]: immutable storage for traversal
//! - [`MutableTree`]: append-only construction during training
//! - [`TreeValidationError`]: structural validation errors

use super::NodeId;

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`Tree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeValidationError {
    #[error("tree has no nodes")]
    EmptyTree,

    #[error("node {node}: {side} child {child} out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds { node: NodeId, side: &'static str, child: NodeId, n_nodes: usize },

    #[error("node {node} references itself")]
    SelfLoop { node: NodeId },

    #[error("node {node} is reachable by more than one path")]
    DuplicateVisit { node: NodeId },

    #[error("cycle detected at node {node}")]
    CycleDetected { node: NodeId },

    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: NodeId },

    #[error("node arrays have inconsistent lengths")]
    LengthMismatch,

    #[error("node {node} splits on feature {feature}, model has {n_features}")]
    FeatureOutOfRange { node: NodeId, feature: u32, n_features: usize },

    #[error("node {node} has a non-finite value")]
    NonFinite { node: NodeId },
}

// ============================================================================
// Tree
// ============================================================================

/// Structure-of-Arrays regression tree.
///
/// Child indices are local to this tree (0 = root). A sample goes left when
/// `value < threshold`; NaN follows `default_left`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    split_indices: Box<[u32]>,
    split_thresholds: Box<[f32]>,
    left_children: Box<[u32]>,
    right_children: Box<[u32]>,
    default_left: Box<[bool]>,
    is_leaf: Box<[bool]>,
    leaf_values: Box<[f32]>,
    /// Gain at each split node (0 at leaves).
    gains: Option<Box<[f32]>>,
    /// Hessian sum of the training rows reaching each node.
    covers: Option<Box<[f32]>>,
}

impl Tree {
    /// Create a tree from parallel arrays of equal length.
    pub fn new(
        split_indices: Vec<u32>,
        split_thresholds: Vec<f32>,
        left_children: Vec<u32>,
        right_children: Vec<u32>,
        default_left: Vec<bool>,
        is_leaf: Vec<bool>,
        leaf_values: Vec<f32>,
    ) -> Self {
        Self {
            split_indices: split_indices.into_boxed_slice(),
            split_thresholds: split_thresholds.into_boxed_slice(),
            left_children: left_children.into_boxed_slice(),
            right_children: right_children.into_boxed_slice(),
            default_left: default_left.into_boxed_slice(),
            is_leaf: is_leaf.into_boxed_slice(),
            leaf_values: leaf_values.into_boxed_slice(),
            gains: None,
            covers: None,
        }
    }

    /// Single-leaf tree.
    pub fn constant(value: f32) -> Self {
        Self::new(vec![0], vec![0.0], vec![0], vec![0], vec![true], vec![true], vec![value])
    }

    pub fn with_gains(mut self, gains: Vec<f32>) -> Self {
        self.gains = Some(gains.into_boxed_slice());
        self
    }

    pub fn with_covers(mut self, covers: Vec<f32>) -> Self {
        self.covers = Some(covers.into_boxed_slice());
        self
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.split_indices.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.is_leaf.iter().filter(|&&l| l).count()
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    #[inline]
    pub fn split_index(&self, node: NodeId) -> u32 {
        self.split_indices[node as usize]
    }

    #[inline]
    pub fn split_threshold(&self, node: NodeId) -> f32 {
        self.split_thresholds[node as usize]
    }

    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    #[inline]
    pub fn default_left(&self, node: NodeId) -> bool {
        self.default_left[node as usize]
    }

    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> f32 {
        self.leaf_values[node as usize]
    }

    pub fn gains(&self) -> Option<&[f32]> {
        self.gains.as_deref()
    }

    pub fn covers(&self) -> Option<&[f32]> {
        self.covers.as_deref()
    }

    pub(crate) fn split_indices(&self) -> &[u32] {
        &self.split_indices
    }

    pub(crate) fn split_thresholds(&self) -> &[f32] {
        &self.split_thresholds
    }

    pub(crate) fn left_children(&self) -> &[u32] {
        &self.left_children
    }

    pub(crate) fn right_children(&self) -> &[u32] {
        &self.right_children
    }

    pub(crate) fn default_left_flags(&self) -> &[bool] {
        &self.default_left
    }

    pub(crate) fn leaf_flags(&self) -> &[bool] {
        &self.is_leaf
    }

    pub(crate) fn leaf_values(&self) -> &[f32] {
        &self.leaf_values
    }

    /// Child taken by `fvalue` at split node `node`.
    #[inline]
    pub fn next_node(&self, node: NodeId, fvalue: f32) -> NodeId {
        let left = if fvalue.is_nan() {
            self.default_left(node)
        } else {
            fvalue < self.split_threshold(node)
        };
        if left { self.left_child(node) } else { self.right_child(node) }
    }

    /// Traverse from the root to the leaf reached by `features`.
    #[inline]
    pub fn traverse_to_leaf(&self, features: &[f32]) -> NodeId {
        let mut node: NodeId = 0;
        while !self.is_leaf(node) {
            let fvalue = features[self.split_index(node) as usize];
            node = self.next_node(node, fvalue);
        }
        node
    }

    /// Leaf value for a single row.
    #[inline]
    pub fn predict_row(&self, features: &[f32]) -> f32 {
        self.leaf_value(self.traverse_to_leaf(features))
    }

    /// Largest feature index referenced by any split, if any.
    pub fn max_split_feature(&self) -> Option<u32> {
        self.split_indices
            .iter()
            .zip(self.is_leaf.iter())
            .filter(|(_, leaf)| !**leaf)
            .map(|(&f, _)| f)
            .max()
    }

    /// Validate structural invariants.
    ///
    /// Checks array lengths, child bounds, reachability (no cycles or
    /// shared subtrees), finite values, and feature indices when
    /// `n_features` is given.
    pub fn validate(&self, n_features: Option<usize>) -> Result<(), TreeValidationError> {
        let n_nodes = self.n_nodes();
        if n_nodes == 0 {
            return Err(TreeValidationError::EmptyTree);
        }
        let lens = [
            self.split_thresholds.len(),
            self.left_children.len(),
            self.right_children.len(),
            self.default_left.len(),
            self.is_leaf.len(),
            self.leaf_values.len(),
        ];
        if lens.iter().any(|&l| l != n_nodes)
            || self.gains.as_ref().is_some_and(|g| g.len() != n_nodes)
            || self.covers.as_ref().is_some_and(|c| c.len() != n_nodes)
        {
            return Err(TreeValidationError::LengthMismatch);
        }

        // Iterative DFS with color marking.
        // 0 = unvisited, 1 = visiting, 2 = done
        let mut color = vec![0u8; n_nodes];
        let mut stack: Vec<(NodeId, u8)> = vec![(0, 0)];

        while let Some((node, phase)) = stack.pop() {
            let idx = node as usize;
            if phase == 1 {
                color[idx] = 2;
                continue;
            }
            match color[idx] {
                0 => {}
                1 => return Err(TreeValidationError::CycleDetected { node }),
                _ => return Err(TreeValidationError::DuplicateVisit { node }),
            }
            color[idx] = 1;
            stack.push((node, 1));

            if self.is_leaf(node) {
                if !self.leaf_value(node).is_finite() {
                    return Err(TreeValidationError::NonFinite { node });
                }
                continue;
            }

            if self.split_threshold(node).is_nan() {
                return Err(TreeValidationError::NonFinite { node });
            }
            if let Some(n_features) = n_features {
                let feature = self.split_index(node);
                if feature as usize >= n_features {
                    return Err(TreeValidationError::FeatureOutOfRange { node, feature, n_features });
                }
            }

            let left = self.left_child(node);
            let right = self.right_child(node);
            if left == node || right == node {
                return Err(TreeValidationError::SelfLoop { node });
            }
            for (side, child) in [("left", left), ("right", right)] {
                if child as usize >= n_nodes {
                    return Err(TreeValidationError::ChildOutOfBounds {
                        node,
                        side,
                        child,
                        n_nodes,
                    });
                }
            }
            stack.push((right, 0));
            stack.push((left, 0));
        }

        if let Some(i) = color.iter().position(|&c| c == 0) {
            return Err(TreeValidationError::UnreachableNode { node: i as NodeId });
        }
        Ok(())
    }
}

// ============================================================================
// MutableTree
// ============================================================================

/// Append-only tree under construction.
///
/// Nodes start as leaves; [`MutableTree::split`] turns a leaf into a split
/// node with two fresh leaf children.
#[derive(Debug, Clone, Default)]
pub struct MutableTree {
    split_indices: Vec<u32>,
    split_thresholds: Vec<f32>,
    left_children: Vec<u32>,
    right_children: Vec<u32>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f32>,
    gains: Vec<f32>,
    covers: Vec<f32>,
}

impl MutableTree {
    /// Tree with a single root leaf.
    pub fn with_root(cover: f32) -> Self {
        let mut tree = Self::default();
        tree.push_leaf(cover);
        tree
    }

    fn push_leaf(&mut self, cover: f32) -> NodeId {
        let id = self.split_indices.len() as NodeId;
        self.split_indices.push(0);
        self.split_thresholds.push(0.0);
        self.left_children.push(0);
        self.right_children.push(0);
        self.is_leaf.push(true);
        self.leaf_values.push(0.0);
        self.gains.push(0.0);
        self.covers.push(cover);
        id
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.split_indices.len()
    }

    /// Split leaf `node`; returns `(left, right)`.
    pub fn split(
        &mut self,
        node: NodeId,
        feature: u32,
        threshold: f32,
        gain: f32,
        left_cover: f32,
        right_cover: f32,
    ) -> (NodeId, NodeId) {
        let left = self.push_leaf(left_cover);
        let right = self.push_leaf(right_cover);
        let idx = node as usize;
        self.split_indices[idx] = feature;
        self.split_thresholds[idx] = threshold;
        self.left_children[idx] = left;
        self.right_children[idx] = right;
        self.is_leaf[idx] = false;
        self.gains[idx] = gain;
        (left, right)
    }

    pub fn set_leaf_value(&mut self, node: NodeId, value: f32) {
        self.leaf_values[node as usize] = value;
    }

    /// Freeze into an immutable [`Tree`] with gains and covers.
    pub fn freeze(self) -> Tree {
        let n = self.split_indices.len();
        Tree::new(
            self.split_indices,
            self.split_thresholds,
            self.left_children,
            self.right_children,
            vec![true; n],
            self.is_leaf,
            self.leaf_values,
        )
        .with_gains(self.gains)
        .with_covers(self.covers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// x0 < 0.5 ? (x1 < 2.0 ? 1.0 : 2.0) : 3.0
    fn sample_tree() -> Tree {
        let mut t = MutableTree::with_root(4.0);
        let (l, r) = t.split(0, 0, 0.5, 10.0, 3.0, 1.0);
        let (ll, lr) = t.split(l, 1, 2.0, 4.0, 2.0, 1.0);
        t.set_leaf_value(ll, 1.0);
        t.set_leaf_value(lr, 2.0);
        t.set_leaf_value(r, 3.0);
        t.freeze()
    }

    #[test]
    fn traversal_follows_thresholds() {
        let tree = sample_tree();
        assert_eq!(tree.predict_row(&[0.1, 1.0]), 1.0);
        assert_eq!(tree.predict_row(&[0.1, 2.0]), 2.0);
        assert_eq!(tree.predict_row(&[0.5, 0.0]), 3.0);
        assert_eq!(tree.n_nodes(), 5);
        assert_eq!(tree.n_leaves(), 3);
    }

    #[test]
    fn nan_goes_default_left() {
        let tree = sample_tree();
        assert_eq!(tree.predict_row(&[f32::NAN, f32::NAN]), 1.0);
    }

    #[test]
    fn frozen_tree_validates() {
        let tree = sample_tree();
        assert!(tree.validate(Some(2)).is_ok());
        assert_eq!(tree.gains().unwrap()[0], 10.0);
        assert_eq!(tree.covers().unwrap()[1], 3.0);
        assert_eq!(tree.max_split_feature(), Some(1));
    }

    #[test]
    fn validate_catches_feature_out_of_range() {
        let tree = sample_tree();
        assert!(matches!(
            tree.validate(Some(1)),
            Err(TreeValidationError::FeatureOutOfRange { feature: 1, .. })
        ));
    }

    #[test]
    fn validate_catches_bad_children() {
        let tree = Tree::new(
            vec![0, 0, 0],
            vec![0.5, 0.0, 0.0],
            vec![1, 0, 0],
            vec![5, 0, 0],
            vec![true; 3],
            vec![false, true, true],
            vec![0.0; 3],
        );
        assert!(matches!(
            tree.validate(None),
            Err(TreeValidationError::ChildOutOfBounds { side: "right", .. })
        ));

        let cyclic = Tree::new(
            vec![0, 0, 0],
            vec![0.5, 0.5, 0.0],
            vec![1, 0, 0],
            vec![2, 2, 0],
            vec![true; 3],
            vec![false, false, true],
            vec![0.0; 3],
        );
        assert!(cyclic.validate(None).is_err());
    }

    #[test]
    fn constant_tree() {
        let tree = Tree::constant(7.5);
        assert!(tree.validate(Some(0)).is_ok());
        assert_eq!(tree.predict_row(&[]), 7.5);
    }
}
