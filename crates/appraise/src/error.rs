//! Crate-level error aggregating every module error.

use crate::data::{DatasetError, SchemaError};
use crate::explainability::ExplainError;
use crate::market::SimilarityError;
use crate::model::{ConfigError, ModelError, PredictError};
use crate::persist::PersistError;
use crate::training::TrainingError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Predict(#[from] PredictError),

    #[error(transparent)]
    Explain(#[from] ExplainError),

    #[error(transparent)]
    Similarity(#[from] SimilarityError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
