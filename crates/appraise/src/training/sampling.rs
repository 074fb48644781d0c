//! Per-tree row and column subsampling.

use rand::prelude::*;
use rand::seq::index;

/// Rows used to grow one tree, sorted ascending.
///
/// Samples `ceil(n_rows * rate)` rows without replacement; a rate of 1.0
/// keeps every row.
pub fn sample_rows(n_rows: usize, rate: f32, rng: &mut StdRng) -> Vec<u32> {
    if rate >= 1.0 || n_rows == 0 {
        return (0..n_rows as u32).collect();
    }
    let amount = ((n_rows as f64 * rate as f64).ceil() as usize).clamp(1, n_rows);
    let mut rows: Vec<u32> = index::sample(rng, n_rows, amount).into_iter().map(|i| i as u32).collect();
    rows.sort_unstable();
    rows
}

/// Features available to one tree, sorted ascending.
pub fn sample_columns(n_features: usize, rate: f32, rng: &mut StdRng) -> Vec<usize> {
    if rate >= 1.0 || n_features == 0 {
        return (0..n_features).collect();
    }
    let amount = ((n_features as f64 * rate as f64).ceil() as usize).clamp(1, n_features);
    let mut cols = index::sample(rng, n_features, amount).into_vec();
    cols.sort_unstable();
    cols
}
