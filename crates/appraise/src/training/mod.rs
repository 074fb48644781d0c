//! Training infrastructure.
//!
//! ## Single learner
//!
//! - [`GBDTTrainer`]: histogram-based gradient boosting on squared error
//! - [`GrowthStrategy`]: depth-wise or leaf-wise tree growth
//! - [`GainParams`]: split gain and leaf weight regularization
//!
//! ## Ensemble
//!
//! - [`EnsembleTrainer`]: fits every configured learner on one seeded split
//!   and derives blend weights with [`blend_weights`]
//!
//! ## Shared
//!
//! - [`Rmse`], [`Mae`], [`RSquared`], [`Mape`]: held-out metrics
//! - [`TrainingLogger`], [`Verbosity`]: progress logging

mod binning;
mod ensemble;
mod gbdt;
mod grower;
mod histogram;
mod logger;
mod metrics;
mod sampling;
mod split;

pub use binning::{BinMapper, BinnedMatrix};
pub use ensemble::{blend_weights, EnsembleTrainer, TrainingError};
pub use gbdt::{GBDTParams, GBDTTrainer, LearnerError};
pub use grower::GrowthStrategy;
pub use logger::{TrainingLogger, Verbosity};
pub use metrics::{Mae, Mape, MapePolicy, MetricFn, RSquared, RegressionMetrics, Rmse};
pub use split::GainParams;
