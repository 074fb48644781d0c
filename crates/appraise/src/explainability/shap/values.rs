//! SHAP values container.

/// Per-sample, per-feature SHAP contributions of a single-output model.
///
/// Layout is `[samples × (features + 1)]`; the last slot of each sample is
/// the base value.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapValues {
    values: Vec<f64>,
    n_samples: usize,
    n_features: usize,
}

impl ShapValues {
    /// Zero-initialized container.
    pub fn new(n_samples: usize, n_features: usize) -> Self {
        Self { values: vec![0.0; n_samples * (n_features + 1)], n_samples, n_features }
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Number of features, not counting the base value.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[inline]
    fn index(&self, sample: usize, feature: usize) -> usize {
        sample * (self.n_features + 1) + feature
    }

    #[inline]
    pub fn get(&self, sample: usize, feature: usize) -> f64 {
        self.values[self.index(sample, feature)]
    }

    #[inline]
    pub fn set(&mut self, sample: usize, feature: usize, value: f64) {
        let idx = self.index(sample, feature);
        self.values[idx] = value;
    }

    #[inline]
    pub fn add(&mut self, sample: usize, feature: usize, delta: f64) {
        let idx = self.index(sample, feature);
        self.values[idx] += delta;
    }

    #[inline]
    pub fn base_value(&self, sample: usize) -> f64 {
        self.get(sample, self.n_features)
    }

    #[inline]
    pub fn set_base_value(&mut self, sample: usize, value: f64) {
        self.set(sample, self.n_features, value);
    }

    /// Feature contributions of one sample, base value excluded.
    pub fn feature_shap(&self, sample: usize) -> &[f64] {
        let start = self.index(sample, 0);
        &self.values[start..start + self.n_features]
    }

    /// Check `base + Σ shap ≈ prediction` for every sample.
    pub fn verify(&self, predictions: &[f64], tolerance: f64) -> bool {
        if predictions.len() != self.n_samples {
            return false;
        }
        predictions.iter().enumerate().all(|(sample, &pred)| {
            let sum = self.base_value(sample) + self.feature_shap(sample).iter().sum::<f64>();
            (sum - pred).abs() <= tolerance
        })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let mut shap = ShapValues::new(2, 3);
        assert_eq!(shap.values().len(), 8);
        shap.set(0, 1, 2.0);
        shap.add(0, 1, 0.5);
        shap.set_base_value(1, 7.0);
        assert_eq!(shap.get(0, 1), 2.5);
        assert_eq!(shap.base_value(1), 7.0);
        assert_eq!(shap.feature_shap(0), &[0.0, 2.5, 0.0]);
        assert_eq!(shap.feature_shap(1), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn verify_sum_property() {
        let mut shap = ShapValues::new(2, 2);
        shap.set(0, 0, 1.0);
        shap.set(0, 1, 2.0);
        shap.set_base_value(0, 0.5);
        shap.set(1, 0, 0.5);
        shap.set(1, 1, 0.5);
        shap.set_base_value(1, 1.0);

        assert!(shap.verify(&[3.5, 2.0], 1e-10));
        assert!(!shap.verify(&[3.5, 2.5], 1e-10));
        assert!(!shap.verify(&[3.5], 1e-10));
    }
}
