//! Training progress logging.
//!
//! [`TrainingLogger`] gates messages on a [`Verbosity`] level and forwards
//! them to the `log` facade, so the host application picks the sink.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::metrics::RegressionMetrics;

/// How much the trainer reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Nothing.
    Silent,
    /// Only problems.
    #[default]
    Warning,
    /// Per-learner progress and final metrics.
    Info,
    /// Per-round detail.
    Debug,
}

/// Verbosity-gated logger for one training run.
#[derive(Debug)]
pub struct TrainingLogger {
    verbosity: Verbosity,
    started: Option<Instant>,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity, started: None }
    }

    #[inline]
    fn enabled(&self, level: Verbosity) -> bool {
        level != Verbosity::Silent && self.verbosity >= level
    }

    pub fn start_training(&mut self, n_learners: usize, n_train: usize, n_test: usize) {
        self.started = Some(Instant::now());
        if self.enabled(Verbosity::Info) {
            log::info!(
                "training {n_learners} learner(s) on {n_train} rows, holding out {n_test}"
            );
        }
    }

    pub fn start_learner(&self, name: &str, n_trees: u32) {
        if self.enabled(Verbosity::Info) {
            log::info!("[{name}] fitting {n_trees} trees");
        }
    }

    pub fn log_round(&self, name: &str, round: usize, n_leaves: usize) {
        if self.enabled(Verbosity::Debug) {
            log::debug!("[{name}] round {round}: {n_leaves} leaves");
        }
    }

    pub fn log_learner_metrics(&self, name: &str, metrics: &RegressionMetrics) {
        if self.enabled(Verbosity::Info) {
            log::info!("[{name}] {metrics}");
        }
    }

    pub fn log_weights(&self, weights: &BTreeMap<String, f64>) {
        if self.enabled(Verbosity::Info) {
            let parts: Vec<String> =
                weights.iter().map(|(name, w)| format!("{name}={w:.4}")).collect();
            log::info!("blend weights: {}", parts.join(", "));
        }
    }

    pub fn warn(&self, message: &str) {
        if self.enabled(Verbosity::Warning) {
            log::warn!("{message}");
        }
    }

    pub fn finish_training(&self, ensemble: &RegressionMetrics) {
        if self.enabled(Verbosity::Info) {
            let elapsed = self.started.map(|s| s.elapsed().as_secs_f64()).unwrap_or_default();
            log::info!("ensemble {ensemble} ({elapsed:.2}s)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_ordering() {
        assert!(Verbosity::Debug > Verbosity::Info);
        assert!(Verbosity::Info > Verbosity::Warning);
        assert!(Verbosity::Warning > Verbosity::Silent);
    }

    #[test]
    fn gating() {
        let logger = TrainingLogger::new(Verbosity::Info);
        assert!(logger.enabled(Verbosity::Info));
        assert!(logger.enabled(Verbosity::Warning));
        assert!(!logger.enabled(Verbosity::Debug));

        let silent = TrainingLogger::new(Verbosity::Silent);
        assert!(!silent.enabled(Verbosity::Warning));
    }
}
