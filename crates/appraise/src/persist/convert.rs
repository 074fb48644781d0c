//! Conversions between runtime models and payloads.
//!
//! Loading goes through [`EnsembleModel::from_parts`], so a payload that
//! decodes cleanly is still rejected when its contents are inconsistent.

use super::native::DeserializeError;
use super::payload::{ForestPayload, LearnerPayload, PayloadV1, TreePayload};
use crate::data::FeatureSchema;
use crate::model::{EnsembleModel, TrainedLearner};
use crate::repr::{Forest, Tree};

impl From<&Tree> for TreePayload {
    fn from(tree: &Tree) -> Self {
        Self {
            split_features: tree.split_indices().to_vec(),
            thresholds: tree.split_thresholds().to_vec(),
            left_children: tree.left_children().to_vec(),
            right_children: tree.right_children().to_vec(),
            default_left: tree.default_left_flags().to_vec(),
            is_leaf: tree.leaf_flags().to_vec(),
            leaf_values: tree.leaf_values().to_vec(),
            gains: tree.gains().map(<[f32]>::to_vec),
            covers: tree.covers().map(<[f32]>::to_vec),
        }
    }
}

/// Structural checks happen when the owning model is assembled.
impl From<TreePayload> for Tree {
    fn from(p: TreePayload) -> Self {
        let mut tree = Tree::new(
            p.split_features,
            p.thresholds,
            p.left_children,
            p.right_children,
            p.default_left,
            p.is_leaf,
            p.leaf_values,
        );
        if let Some(gains) = p.gains {
            tree = tree.with_gains(gains);
        }
        if let Some(covers) = p.covers {
            tree = tree.with_covers(covers);
        }
        tree
    }
}

impl From<&Forest> for ForestPayload {
    fn from(forest: &Forest) -> Self {
        Self { base_score: forest.base_score(), trees: forest.trees().map(TreePayload::from).collect() }
    }
}

impl From<ForestPayload> for Forest {
    fn from(p: ForestPayload) -> Self {
        let mut forest = Forest::new(p.base_score);
        for tree in p.trees {
            forest.push_tree(tree.into());
        }
        forest
    }
}

impl From<&TrainedLearner> for LearnerPayload {
    fn from(learner: &TrainedLearner) -> Self {
        Self {
            config: learner.config().clone(),
            metrics: *learner.metrics(),
            forest: learner.forest().into(),
        }
    }
}

impl From<&EnsembleModel> for PayloadV1 {
    fn from(model: &EnsembleModel) -> Self {
        Self {
            feature_names: model.schema().map(|s| s.names().to_vec()).unwrap_or_default(),
            learners: model.learners().map(LearnerPayload::from).collect(),
            weights: model.weights().clone(),
            metrics: model.metrics().cloned(),
            trained: model.is_trained(),
        }
    }
}

impl TryFrom<PayloadV1> for EnsembleModel {
    type Error = DeserializeError;

    fn try_from(p: PayloadV1) -> Result<Self, Self::Error> {
        if !p.trained {
            if !p.learners.is_empty() || !p.weights.is_empty() {
                return Err(DeserializeError::CorruptPayload(
                    "untrained model carries learners or weights".into(),
                ));
            }
            return Ok(EnsembleModel::new());
        }

        let schema = FeatureSchema::new(p.feature_names)
            .map_err(|e| DeserializeError::CorruptPayload(e.to_string()))?;
        let learners = p
            .learners
            .into_iter()
            .map(|l| TrainedLearner::new(l.config, l.forest.into(), l.metrics))
            .collect();
        Ok(EnsembleModel::from_parts(schema, learners, p.weights, p.metrics)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::MutableTree;

    #[test]
    fn tree_payload_preserves_stats() {
        let mut t = MutableTree::with_root(4.0);
        let (l, r) = t.split(0, 1, 0.25, 3.0, 2.5, 1.5);
        t.set_leaf_value(l, -0.5);
        t.set_leaf_value(r, 0.75);
        let tree = t.freeze();

        let payload = TreePayload::from(&tree);
        assert_eq!(payload.split_features[0], 1);
        assert_eq!(payload.covers.as_deref(), Some(&[4.0f32, 2.5, 1.5][..]));
        assert_eq!(Tree::from(payload), tree);
    }

    #[test]
    fn untrained_payload_must_be_empty() {
        let empty = PayloadV1::from(&EnsembleModel::new());
        assert!(!empty.trained);
        assert!(EnsembleModel::try_from(empty.clone()).is_ok_and(|m| !m.is_trained()));

        let mut bad = empty;
        bad.weights.insert("ghost".into(), 1.0);
        assert!(matches!(EnsembleModel::try_from(bad), Err(DeserializeError::CorruptPayload(_))));
    }
}
