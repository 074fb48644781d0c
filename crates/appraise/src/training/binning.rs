//! Quantile binning of raw features for histogram-based split finding.
//!
//! A [`BinMapper`] holds ascending cut points. A value's bin is the number
//! of cuts `<= value`, so "bin <= b" is exactly "value < cuts[b]": splits
//! found on bins are applied to raw values unchanged.

use ndarray::{ArrayView1, ArrayView2, Axis};

use crate::utils::Parallelism;

/// Cut points for one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct BinMapper {
    cuts: Vec<f32>,
}

impl BinMapper {
    /// Fit cut points to a column, using at most `max_bins` bins.
    ///
    /// With few distinct values every distinct value above the minimum is a
    /// cut. Otherwise cuts sit at evenly spaced quantiles. Non-finite values
    /// are ignored.
    pub fn fit(column: ArrayView1<'_, f32>, max_bins: usize) -> Self {
        let mut sorted: Vec<f32> = column.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() || max_bins < 2 {
            return Self { cuts: Vec::new() };
        }
        sorted.sort_by(f32::total_cmp);

        let mut distinct = sorted.clone();
        distinct.dedup();

        let cuts = if distinct.len() <= max_bins {
            distinct[1..].to_vec()
        } else {
            let n = sorted.len();
            let mut cuts: Vec<f32> = Vec::with_capacity(max_bins - 1);
            for q in 1..max_bins {
                let cut = sorted[q * n / max_bins];
                let above_min = cut > sorted[0];
                let increasing = cuts.last().is_none_or(|&last| cut > last);
                if above_min && increasing {
                    cuts.push(cut);
                }
            }
            cuts
        };
        Self { cuts }
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.cuts.len() + 1
    }

    #[inline]
    pub fn bin(&self, value: f32) -> u16 {
        self.cuts.partition_point(|&c| c <= value) as u16
    }

    /// Raw threshold for a split that sends bins `0..=bin` left.
    #[inline]
    pub fn threshold(&self, bin: u16) -> f32 {
        self.cuts[bin as usize]
    }

    pub fn cuts(&self) -> &[f32] {
        &self.cuts
    }
}

/// Column-major bin indices for a feature matrix.
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    bins: Vec<u16>,
    mappers: Vec<BinMapper>,
    n_rows: usize,
}

impl BinnedMatrix {
    /// Bin a `[n_rows, n_features]` matrix.
    pub fn build(features: ArrayView2<'_, f32>, max_bins: usize, parallelism: Parallelism) -> Self {
        let n_rows = features.nrows();
        let columns: Vec<(BinMapper, Vec<u16>)> =
            parallelism.maybe_par_map(0..features.ncols(), |j| {
                let column = features.index_axis(Axis(1), j);
                let mapper = BinMapper::fit(column, max_bins);
                let bins = column.iter().map(|&v| mapper.bin(v)).collect();
                (mapper, bins)
            });

        let mut bins = Vec::with_capacity(n_rows * columns.len());
        let mut mappers = Vec::with_capacity(columns.len());
        for (mapper, column_bins) in columns {
            bins.extend(column_bins);
            mappers.push(mapper);
        }
        Self { bins, mappers, n_rows }
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.mappers.len()
    }

    #[inline]
    pub fn mapper(&self, feature: usize) -> &BinMapper {
        &self.mappers[feature]
    }

    /// Bins of one feature, indexed by row.
    #[inline]
    pub fn column(&self, feature: usize) -> &[u16] {
        let start = feature * self.n_rows;
        &self.bins[start..start + self.n_rows]
    }
}
