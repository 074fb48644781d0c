//! Serving-time prediction.
//!
//! [`EnsemblePredictor`] turns one input into a [`PredictionResult`]: the
//! weighted blend of every learner plus a 95% band derived from how much
//! the learners disagree.

mod format;
mod predictor;

pub use format::{format_inr, CRORE, LAKH};
pub use predictor::{EnsemblePredictor, PredictionResult, FALLBACK_CONFIDENCE, Z_95};
