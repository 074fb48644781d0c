//! Histogram-based tree growing with depth-wise or leaf-wise expansion.

use serde::{Deserialize, Serialize};

use super::binning::BinnedMatrix;
use super::histogram::build_histograms;
use super::split::{find_best_split, GainParams, SplitInfo};
use crate::repr::{MutableTree, NodeId, Tree};
use crate::utils::Parallelism;

/// Order in which leaves are expanded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStrategy {
    /// Expand every node of a level before the next, up to `max_depth`.
    DepthWise { max_depth: u32 },
    /// Always expand the leaf with the highest gain, up to `max_leaves`.
    LeafWise { max_leaves: u32 },
}

impl Default for GrowthStrategy {
    fn default() -> Self {
        Self::DepthWise { max_depth: 6 }
    }
}

/// Parameters for one tree.
#[derive(Clone, Debug, PartialEq)]
pub struct GrowerParams {
    pub gain: GainParams,
    pub learning_rate: f32,
    pub growth_strategy: GrowthStrategy,
}

/// A leaf that may still be expanded.
struct Candidate {
    node: NodeId,
    rows: Vec<u32>,
    depth: u32,
    grad: f64,
    hess: f64,
    split: Option<SplitInfo>,
}

/// Grows one regression tree from gradients.
pub struct TreeGrower<'a> {
    binned: &'a BinnedMatrix,
    params: &'a GrowerParams,
    parallelism: Parallelism,
}

impl<'a> TreeGrower<'a> {
    pub fn new(binned: &'a BinnedMatrix, params: &'a GrowerParams, parallelism: Parallelism) -> Self {
        Self { binned, params, parallelism }
    }

    /// Grow a tree over `rows`, considering only `features`.
    ///
    /// `grads` and `hess` are indexed by row of the binned matrix. Leaf
    /// values are already scaled by the learning rate.
    pub fn grow(&self, rows: Vec<u32>, features: &[usize], grads: &[f32], hess: &[f32]) -> Tree {
        let (grad, hess_sum) = sums(&rows, grads, hess);
        let mut tree = MutableTree::with_root(hess_sum as f32);
        let can_split_root = match self.params.growth_strategy {
            GrowthStrategy::DepthWise { max_depth } => max_depth > 0,
            GrowthStrategy::LeafWise { max_leaves } => max_leaves > 1,
        };
        let root = self.candidate(0, rows, 0, grad, hess_sum, can_split_root, features, grads, hess);

        match self.params.growth_strategy {
            GrowthStrategy::DepthWise { max_depth } => {
                self.grow_depth_wise(&mut tree, root, max_depth, features, grads, hess)
            }
            GrowthStrategy::LeafWise { max_leaves } => {
                self.grow_leaf_wise(&mut tree, root, max_leaves, features, grads, hess)
            }
        }
        tree.freeze()
    }

    fn grow_depth_wise(
        &self,
        tree: &mut MutableTree,
        root: Candidate,
        max_depth: u32,
        features: &[usize],
        grads: &[f32],
        hess: &[f32],
    ) {
        let mut frontier = vec![root];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for cand in frontier {
                match cand.split.clone() {
                    Some(split) => {
                        let can_split = cand.depth + 1 < max_depth;
                        let (left, right) =
                            self.apply(tree, cand, &split, can_split, features, grads, hess);
                        next.push(left);
                        next.push(right);
                    }
                    None => self.finish_leaf(tree, &cand),
                }
            }
            frontier = next;
        }
    }

    fn grow_leaf_wise(
        &self,
        tree: &mut MutableTree,
        root: Candidate,
        max_leaves: u32,
        features: &[usize],
        grads: &[f32],
        hess: &[f32],
    ) {
        let mut open = vec![root];
        let mut n_leaves = 1u32;

        while n_leaves < max_leaves {
            let best = open
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.split.as_ref().map(|s| (i, s.gain, c.node)))
                .max_by(|a, b| a.1.total_cmp(&b.1).then(b.2.cmp(&a.2)));
            let Some((idx, _, _)) = best else { break };

            let cand = open.swap_remove(idx);
            let Some(split) = cand.split.clone() else { break };
            let can_split = n_leaves + 1 < max_leaves;
            let (left, right) = self.apply(tree, cand, &split, can_split, features, grads, hess);
            open.push(left);
            open.push(right);
            n_leaves += 1;
        }

        for cand in &open {
            self.finish_leaf(tree, cand);
        }
    }

    /// Split `cand` in the tree and build its two children.
    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        tree: &mut MutableTree,
        cand: Candidate,
        split: &SplitInfo,
        children_can_split: bool,
        features: &[usize],
        grads: &[f32],
        hess: &[f32],
    ) -> (Candidate, Candidate) {
        let (left_id, right_id) = tree.split(
            cand.node,
            split.feature as u32,
            split.threshold,
            split.gain as f32,
            split.hess_left as f32,
            split.hess_right as f32,
        );

        let bins = self.binned.column(split.feature);
        let (left_rows, right_rows): (Vec<u32>, Vec<u32>) =
            cand.rows.into_iter().partition(|&r| bins[r as usize] <= split.bin);

        let depth = cand.depth + 1;
        let left = self.candidate(
            left_id,
            left_rows,
            depth,
            split.grad_left,
            split.hess_left,
            children_can_split,
            features,
            grads,
            hess,
        );
        let right = self.candidate(
            right_id,
            right_rows,
            depth,
            split.grad_right,
            split.hess_right,
            children_can_split,
            features,
            grads,
            hess,
        );
        (left, right)
    }

    #[allow(clippy::too_many_arguments)]
    fn candidate(
        &self,
        node: NodeId,
        rows: Vec<u32>,
        depth: u32,
        grad: f64,
        hess_sum: f64,
        can_split: bool,
        features: &[usize],
        grads: &[f32],
        hess: &[f32],
    ) -> Candidate {
        let split = if can_split && rows.len() >= 2 {
            let hists = build_histograms(self.binned, &rows, grads, hess, features, self.parallelism);
            find_best_split(&hists, self.binned, grad, hess_sum, rows.len() as u32, &self.params.gain)
        } else {
            None
        };
        Candidate { node, rows, depth, grad, hess: hess_sum, split }
    }

    fn finish_leaf(&self, tree: &mut MutableTree, cand: &Candidate) {
        let weight = self.params.gain.compute_leaf_weight(cand.grad, cand.hess);
        tree.set_leaf_value(cand.node, (weight * self.params.learning_rate as f64) as f32);
    }
}

fn sums(rows: &[u32], grads: &[f32], hess: &[f32]) -> (f64, f64) {
    rows.iter().fold((0.0, 0.0), |(g, h), &r| {
        (g + grads[r as usize] as f64, h + hess[r as usize] as f64)
    })
}
