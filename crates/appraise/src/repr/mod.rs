//! Canonical regression tree and forest representations.

/// Node identifier: an index into a tree's SoA arrays.
pub type NodeId = u32;

mod forest;
mod tree;

pub use forest::{Forest, ForestValidationError};
pub use tree::{MutableTree, Tree, TreeValidationError};
