//! Feature schema: the fixed, ordered list of feature names a model was
//! trained on, and the reduction of keyed inputs into schema order.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Keyed feature input, e.g. the output of record engineering.
pub type FeatureMap = BTreeMap<String, f32>;

/// Errors raised when an input does not fit a schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema must contain at least one feature")]
    Empty,

    #[error("duplicate feature name '{0}'")]
    DuplicateFeature(String),

    #[error("missing features: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),

    #[error("feature '{name}' has non-finite value {value}")]
    NonFinite { name: String, value: f32 },

    #[error("expected {expected} features, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("feature vector was built for schema {actual:08x}, model expects {expected:08x}")]
    FingerprintMismatch { expected: u32, actual: u32 },
}

/// How to treat inputs that do not carry every schema feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
    /// Missing features are set to zero; extras are ignored.
    #[default]
    ZeroFill,
    /// Missing or non-finite features are an error; extras are ignored.
    Strict,
}

/// Ordered, unique feature names.
///
/// Fixed once a model is trained. The fingerprint is a CRC32 over the names
/// and their order, so vectors reduced against one schema cannot be fed to a
/// model trained on another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    names: Vec<String>,
    index: HashMap<String, usize>,
    fingerprint: u32,
}

impl FeatureSchema {
    /// Build a schema from ordered names.
    pub fn new<I, S>(names: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateFeature(name.clone()));
            }
        }

        let fingerprint = fingerprint_of(&names);
        Ok(Self { names, index, fingerprint })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[inline]
    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    #[inline]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[inline]
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }

    /// Reduce a keyed input to schema order with [`SchemaPolicy::ZeroFill`].
    pub fn reduce(&self, input: &FeatureMap) -> FeatureVector {
        let values = self
            .names
            .iter()
            .map(|name| input.get(name).copied().unwrap_or(0.0))
            .collect();
        FeatureVector { values, fingerprint: self.fingerprint }
    }

    /// Reduce a keyed input to schema order under the given policy.
    pub fn reduce_with(
        &self,
        input: &FeatureMap,
        policy: SchemaPolicy,
    ) -> Result<FeatureVector, SchemaError> {
        match policy {
            SchemaPolicy::ZeroFill => Ok(self.reduce(input)),
            SchemaPolicy::Strict => {
                let missing: Vec<String> = self
                    .names
                    .iter()
                    .filter(|name| !input.contains_key(*name))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(SchemaError::MissingFeatures(missing));
                }
                for name in &self.names {
                    let value = input[name];
                    if !value.is_finite() {
                        return Err(SchemaError::NonFinite { name: name.clone(), value });
                    }
                }
                Ok(self.reduce(input))
            }
        }
    }

    /// Wrap values that are already in schema order.
    pub fn vector(&self, values: Vec<f32>) -> Result<FeatureVector, SchemaError> {
        if values.len() != self.len() {
            return Err(SchemaError::LengthMismatch { expected: self.len(), actual: values.len() });
        }
        Ok(FeatureVector { values, fingerprint: self.fingerprint })
    }

    /// Check that a vector was reduced against this schema.
    pub fn check(&self, vector: &FeatureVector) -> Result<(), SchemaError> {
        if vector.fingerprint != self.fingerprint {
            return Err(SchemaError::FingerprintMismatch {
                expected: self.fingerprint,
                actual: vector.fingerprint,
            });
        }
        if vector.values.len() != self.len() {
            return Err(SchemaError::LengthMismatch {
                expected: self.len(),
                actual: vector.values.len(),
            });
        }
        Ok(())
    }

    /// Key a schema-ordered slice back into a map.
    pub fn to_map(&self, values: &[f32]) -> FeatureMap {
        self.names.iter().cloned().zip(values.iter().copied()).collect()
    }
}

fn fingerprint_of(names: &[String]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize()
}

/// Feature values in schema order, tagged with the schema fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
    fingerprint: u32,
}

impl FeatureVector {
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }
}
