use rand::prelude::*;

use crate::data::{Dataset, Furnishing, PropertyRecord};

/// Generate random dense features in row-major order.
///
/// Values are uniform in `[min, max]`.
pub fn random_dense_f32(rows: usize, cols: usize, seed: u64, min: f32, max: f32) -> Vec<f32> {
    assert!(max >= min);
    let mut rng = StdRng::seed_from_u64(seed);
    let width = max - min;
    (0..rows * cols).map(|_| min + rng.r#gen::<f32>() * width).collect()
}

/// Generate regression targets as a linear model of features plus uniform noise.
///
/// Returns `(targets, weights, bias)`.
pub fn synthetic_regression_targets_linear(
    features_row_major: &[f32],
    rows: usize,
    cols: usize,
    seed: u64,
    noise_amplitude: f32,
) -> (Vec<f32>, Vec<f32>, f32) {
    assert_eq!(features_row_major.len(), rows * cols);
    let mut rng = StdRng::seed_from_u64(seed);

    let weights: Vec<f32> = (0..cols).map(|_| rng.r#gen::<f32>() * 2.0 - 1.0).collect();
    let bias: f32 = rng.r#gen::<f32>() * 0.5 - 0.25;

    let targets = features_row_major
        .chunks_exact(cols.max(1))
        .take(rows)
        .map(|row| {
            let mut y = bias + row.iter().zip(&weights).map(|(x, w)| x * w).sum::<f32>();
            if noise_amplitude > 0.0 {
                y += (rng.r#gen::<f32>() * 2.0 - 1.0) * noise_amplitude;
            }
            y
        })
        .collect();

    (targets, weights, bias)
}

/// Price of a listing under a fixed additive rule, before noise.
fn rule_price(r: &PropertyRecord) -> f32 {
    let flag = |b: bool, amount: f32| if b { amount } else { 0.0 };
    1_500.0 * r.area
        + 400_000.0 * r.bedrooms as f32
        + 600_000.0 * r.bathrooms as f32
        + 300_000.0 * r.stories as f32
        + 250_000.0 * r.parking as f32
        + flag(r.mainroad, 500_000.0)
        + flag(r.guestroom, 300_000.0)
        + flag(r.basement, 350_000.0)
        + flag(r.hotwaterheating, 200_000.0)
        + flag(r.airconditioning, 700_000.0)
        + flag(r.prefarea, 800_000.0)
        + 400_000.0 * r.furnishing.score()
}

/// Random listings with prices from an additive rule plus up to 5% noise.
pub fn synthetic_records(n: usize, seed: u64) -> (Vec<PropertyRecord>, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let furnishing = [Furnishing::Unfurnished, Furnishing::SemiFurnished, Furnishing::Furnished];

    let records: Vec<PropertyRecord> = (0..n)
        .map(|_| {
            let bedrooms = rng.gen_range(1..=6);
            let mut r = PropertyRecord::new(
                rng.gen_range(1_650.0..16_200.0f32).round(),
                bedrooms,
                rng.gen_range(1..=bedrooms.min(4)),
                rng.gen_range(1..=4),
            );
            r.parking = rng.gen_range(0..=3);
            r.mainroad = rng.gen_bool(0.85);
            r.guestroom = rng.gen_bool(0.2);
            r.basement = rng.gen_bool(0.35);
            r.hotwaterheating = rng.gen_bool(0.05);
            r.airconditioning = rng.gen_bool(0.3);
            r.prefarea = rng.gen_bool(0.25);
            r.furnishing = furnishing[rng.gen_range(0..furnishing.len())];
            r
        })
        .collect();

    let prices = records
        .iter()
        .map(|r| rule_price(r) * (1.0 + rng.gen_range(-0.05..0.05f32)))
        .collect();
    (records, prices)
}

/// [`synthetic_records`] engineered into a [`Dataset`]. `n` must be at
/// least 1.
pub fn synthetic_housing(n: usize, seed: u64) -> Dataset {
    let (records, prices) = synthetic_records(n, seed);
    Dataset::from_records(&records, &prices).expect("synthetic records form a valid dataset")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::HOUSING_FEATURES;

    #[test]
    fn synthetic_housing_is_seeded() {
        let a = synthetic_housing(50, 9);
        let b = synthetic_housing(50, 9);
        assert_eq!(a.features(), b.features());
        assert_eq!(a.targets(), b.targets());
        assert_eq!(a.n_features(), HOUSING_FEATURES.len());
        assert!(a.targets().iter().all(|&p| p > 0.0));
        assert_ne!(a.targets(), synthetic_housing(50, 10).targets());
    }

    #[test]
    fn single_row() {
        assert_eq!(synthetic_housing(1, 0).n_samples(), 1);
    }

    #[test]
    fn linear_targets_follow_weights() {
        let x = random_dense_f32(10, 3, 1, -1.0, 1.0);
        assert!(x.iter().all(|v| (-1.0..=1.0).contains(v)));
        let (y, w, b) = synthetic_regression_targets_linear(&x, 10, 3, 2, 0.0);
        let expected = b + x[0] * w[0] + x[1] * w[1] + x[2] * w[2];
        assert!((y[0] - expected).abs() < 1e-6);
    }
}
