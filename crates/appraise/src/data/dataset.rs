//! Training dataset: a dense feature matrix with named columns and one
//! target per row.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::record::{housing_schema, PropertyRecord};
use super::schema::{FeatureSchema, SchemaError};
use crate::utils::median;

/// Errors raised while assembling a dataset.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatasetError {
    #[error("dataset has no rows")]
    Empty,

    #[error("dataset has no feature columns")]
    NoFeatures,

    #[error("feature '{name}' has {actual} rows, expected {expected}")]
    ColumnLength { name: String, expected: usize, actual: usize },

    #[error("{targets} targets for {rows} rows")]
    TargetLength { rows: usize, targets: usize },

    #[error("target at row {row} is not finite")]
    NonFiniteTarget { row: usize },

    #[error("test fraction must be in (0, 1), got {0}")]
    InvalidTestFraction(f32),

    #[error("need at least 2 rows to split, got {0}")]
    TooFewRows(usize),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Dense training data: `features[[row, feature]]` and `targets[row]`.
///
/// Invariants: at least one row and one column, row counts match, targets
/// are finite, feature names are unique.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Array2<f32>,
    targets: Array1<f32>,
    schema: FeatureSchema,
}

impl Dataset {
    /// Create from a row-major feature matrix.
    pub fn new(
        schema: FeatureSchema,
        features: Array2<f32>,
        targets: Array1<f32>,
    ) -> Result<Self, DatasetError> {
        let (rows, cols) = features.dim();
        if rows == 0 {
            return Err(DatasetError::Empty);
        }
        if cols == 0 {
            return Err(DatasetError::NoFeatures);
        }
        if cols != schema.len() {
            return Err(SchemaError::LengthMismatch { expected: schema.len(), actual: cols }.into());
        }
        if targets.len() != rows {
            return Err(DatasetError::TargetLength { rows, targets: targets.len() });
        }
        if let Some(row) = targets.iter().position(|t| !t.is_finite()) {
            return Err(DatasetError::NonFiniteTarget { row });
        }
        Ok(Self { features, targets, schema })
    }

    /// Start building from named columns.
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    /// Engineer every record with [`PropertyRecord::engineer`] and pair it
    /// with its price.
    pub fn from_records(records: &[PropertyRecord], prices: &[f32]) -> Result<Self, DatasetError> {
        if records.len() != prices.len() {
            return Err(DatasetError::TargetLength { rows: records.len(), targets: prices.len() });
        }
        let schema = housing_schema();
        let mut features = Array2::<f32>::zeros((records.len(), schema.len()));
        for (mut row, record) in features.axis_iter_mut(Axis(0)).zip(records) {
            let reduced = schema.reduce(&record.engineer());
            row.assign(&ArrayView1::from(reduced.as_slice()));
        }
        Self::new(schema, features, Array1::from(prices.to_vec()))
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    #[inline]
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    #[inline]
    pub fn features(&self) -> ArrayView2<'_, f32> {
        self.features.view()
    }

    #[inline]
    pub fn targets(&self) -> ArrayView1<'_, f32> {
        self.targets.view()
    }

    /// Copy the given rows, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
            schema: self.schema.clone(),
        }
    }

    /// Deterministic shuffled split into `(train, test)`.
    ///
    /// The test partition holds `ceil(n * test_fraction)` rows, clamped so
    /// both partitions are non-empty.
    pub fn train_test_split(
        &self,
        test_fraction: f32,
        seed: u64,
    ) -> Result<(Self, Self), DatasetError> {
        let (train_idx, test_idx) = split_indices(self.n_samples(), test_fraction, seed)?;
        Ok((self.take_rows(&train_idx), self.take_rows(&test_idx)))
    }

    /// Summary statistics of targets and features.
    pub fn summary(&self) -> DatasetSummary {
        let prices: Vec<f64> = self.targets.iter().map(|&t| t as f64).collect();
        let price = ColumnStats::of(&prices);

        let features = self
            .schema
            .names()
            .iter()
            .zip(self.features.axis_iter(Axis(1)))
            .map(|(name, column)| {
                let values: Vec<f64> = column.iter().map(|&v| v as f64).collect();
                (name.clone(), ColumnStats::of(&values))
            })
            .collect();

        DatasetSummary { n_samples: self.n_samples(), n_features: self.n_features(), price, features }
    }
}

/// Shuffled `(train, test)` row indices.
pub fn split_indices(
    rows: usize,
    test_fraction: f32,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), DatasetError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(DatasetError::InvalidTestFraction(test_fraction));
    }
    if rows < 2 {
        return Err(DatasetError::TooFewRows(rows));
    }

    let mut idx: Vec<usize> = (0..rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    idx.shuffle(&mut rng);

    let test_len = ((rows as f64) * test_fraction as f64).ceil() as usize;
    let test_len = test_len.clamp(1, rows - 1);
    let (test, train) = idx.split_at(test_len);
    Ok((train.to_vec(), test.to_vec()))
}

/// Builder over named feature columns.
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    columns: Vec<(String, Vec<f32>)>,
    targets: Option<Vec<f32>>,
}

impl DatasetBuilder {
    pub fn add_feature(mut self, name: impl Into<String>, values: Vec<f32>) -> Self {
        self.columns.push((name.into(), values));
        self
    }

    pub fn targets(mut self, targets: Vec<f32>) -> Self {
        self.targets = Some(targets);
        self
    }

    pub fn build(self) -> Result<Dataset, DatasetError> {
        if self.columns.is_empty() {
            return Err(DatasetError::NoFeatures);
        }
        let rows = self.columns[0].1.len();
        for (name, values) in &self.columns {
            if values.len() != rows {
                return Err(DatasetError::ColumnLength {
                    name: name.clone(),
                    expected: rows,
                    actual: values.len(),
                });
            }
        }
        let targets = self.targets.ok_or(DatasetError::TargetLength { rows, targets: 0 })?;

        let schema = FeatureSchema::new(self.columns.iter().map(|(n, _)| n.clone()))?;
        let cols = self.columns.len();
        let mut features = Array2::<f32>::zeros((rows, cols));
        for (j, (_, values)) in self.columns.iter().enumerate() {
            features.column_mut(j).assign(&ArrayView1::from(values.as_slice()));
        }
        Dataset::new(schema, features, Array1::from(targets))
    }
}

/// Min / max / mean / median of a column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl ColumnStats {
    fn of(values: &[f64]) -> Self {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self { min, max, mean: crate::utils::mean(values), median: median(values) }
    }
}

/// Dataset overview for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub n_samples: usize,
    pub n_features: usize,
    pub price: ColumnStats,
    pub features: BTreeMap<String, ColumnStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small() -> Dataset {
        Dataset::builder()
            .add_feature("area", vec![1000.0, 2000.0, 3000.0, 4000.0, 5000.0])
            .add_feature("bedrooms", vec![1.0, 2.0, 3.0, 3.0, 4.0])
            .targets(vec![1.0e6, 2.0e6, 3.0e6, 3.5e6, 4.5e6])
            .build()
            .unwrap()
    }

    #[test]
    fn builder_assembles_columns() {
        let ds = small();
        assert_eq!(ds.n_samples(), 5);
        assert_eq!(ds.n_features(), 2);
        assert_eq!(ds.features()[[2, 0]], 3000.0);
        assert_eq!(ds.features()[[4, 1]], 4.0);
        assert_eq!(ds.schema().names(), &["area".to_string(), "bedrooms".to_string()]);
    }

    #[test]
    fn builder_rejects_ragged_columns() {
        let err = Dataset::builder()
            .add_feature("a", vec![1.0, 2.0])
            .add_feature("b", vec![1.0])
            .targets(vec![1.0, 2.0])
            .build()
            .unwrap_err();
        assert!(matches!(err, DatasetError::ColumnLength { .. }));
    }

    #[test]
    fn new_rejects_mismatched_targets() {
        let schema = FeatureSchema::new(["a"]).unwrap();
        let err = Dataset::new(schema, array![[1.0], [2.0]], array![1.0]).unwrap_err();
        assert_eq!(err, DatasetError::TargetLength { rows: 2, targets: 1 });
    }

    #[test]
    fn new_rejects_non_finite_target() {
        let schema = FeatureSchema::new(["a"]).unwrap();
        let err = Dataset::new(schema, array![[1.0], [2.0]], array![1.0, f32::NAN]).unwrap_err();
        assert_eq!(err, DatasetError::NonFiniteTarget { row: 1 });
    }

    #[test]
    fn split_is_deterministic_and_disjoint() {
        let (train_a, test_a) = split_indices(100, 0.2, 42).unwrap();
        let (train_b, test_b) = split_indices(100, 0.2, 42).unwrap();
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(test_a.len(), 20);
        assert_eq!(train_a.len(), 80);

        let mut all: Vec<usize> = train_a.iter().chain(&test_a).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn split_keeps_both_sides_non_empty() {
        let (train, test) = split_indices(2, 0.9, 1).unwrap();
        assert_eq!((train.len(), test.len()), (1, 1));
        assert_eq!(split_indices(1, 0.2, 1).unwrap_err(), DatasetError::TooFewRows(1));
        assert_eq!(split_indices(10, 0.0, 1).unwrap_err(), DatasetError::InvalidTestFraction(0.0));
    }

    #[test]
    fn summary_reports_price_stats() {
        let summary = small().summary();
        assert_eq!(summary.n_samples, 5);
        assert_eq!(summary.price.min, 1.0e6);
        assert_eq!(summary.price.max, 4.5e6);
        assert_eq!(summary.price.median, 3.0e6);
        assert_eq!(summary.features["bedrooms"].max, 4.0);
    }

    #[test]
    fn from_records_uses_housing_schema() {
        let records = vec![
            PropertyRecord::new(7420.0, 4, 2, 3),
            PropertyRecord::new(8960.0, 4, 4, 4),
        ];
        let ds = Dataset::from_records(&records, &[13_300_000.0, 12_250_000.0]).unwrap();
        assert_eq!(ds.n_features(), crate::data::HOUSING_FEATURES.len());
        let area = ds.schema().position("area").unwrap();
        assert_eq!(ds.features()[[1, area]], 8960.0);
    }
}
