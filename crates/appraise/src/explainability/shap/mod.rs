//! SHAP values for tree ensembles.

mod tree_explainer;
mod values;

pub use tree_explainer::TreeExplainer;
pub use values::ShapValues;
