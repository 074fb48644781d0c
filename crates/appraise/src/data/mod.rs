//! Data handling: feature schemas, property records and training datasets.
//!
//! - [`FeatureSchema`] fixes feature order and reduces keyed input into a
//!   [`FeatureVector`].
//! - [`PropertyRecord`] is a raw listing; [`PropertyRecord::engineer`] applies
//!   the feature engineering rules.
//! - [`Dataset`] is the dense training matrix.

mod dataset;
mod record;
mod schema;

pub use dataset::{
    split_indices, ColumnStats, Dataset, DatasetBuilder, DatasetError, DatasetSummary,
};
pub use record::{housing_schema, AreaCategory, Furnishing, PropertyRecord, HOUSING_FEATURES};
pub use schema::{FeatureMap, FeatureSchema, FeatureVector, SchemaError, SchemaPolicy};
