//! Serving state: a trained model with everything needed to answer
//! appraisal requests, and a handle for swapping it atomically.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use ndarray::ArrayView1;
use serde::Serialize;

use crate::data::{Dataset, FeatureMap, FeatureVector, PropertyRecord, SchemaError};
use crate::error::Result;
use crate::explainability::{AttributionEngine, AttributionResult};
use crate::inference::{format_inr, PredictionResult};
use crate::market::{
    known_cities, normalize_city, CityDataSource, CityResolver, CrimeIndex, Lookup, MarketComparator,
    MarketSnapshot, MarketVerdict, SimilarityIndex, SimilarityResult,
};
use crate::model::{EnsembleMetrics, EnsembleModel, ServingConfig};

/// Feature names filled from the crime lookup when the model uses them.
pub const CRIME_INDEX_FEATURE: &str = "crime_index";
pub const SAFETY_SCORE_FEATURE: &str = "safety_score";

/// City-level context of an appraisal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationInsight {
    pub city: String,
    pub crime: Lookup<CrimeIndex>,
    pub market: Lookup<MarketSnapshot>,
}

/// Everything known about one property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Appraisal {
    pub prediction: PredictionResult,
    /// Price range in lakhs/crores, e.g. `₹45.50 L - ₹52.10 L`.
    pub price_display: String,
    pub attribution: AttributionResult,
    pub similar: SimilarityResult,
    pub market: MarketVerdict,
    pub location: Option<LocationInsight>,
}

/// Description of the loaded model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub trained: bool,
    pub n_learners: usize,
    pub feature_names: Vec<String>,
    pub weights: BTreeMap<String, f64>,
    pub explained_learner: Option<String>,
    pub metrics: Option<EnsembleMetrics>,
}

/// Immutable bundle of serving state. Every call takes `&self`.
#[derive(Debug)]
pub struct ServingContext {
    model: Arc<EnsembleModel>,
    attribution: AttributionEngine,
    similarity: SimilarityIndex,
    comparator: MarketComparator,
    crime: CityResolver<CrimeIndex>,
    market: CityResolver<MarketSnapshot>,
    config: ServingConfig,
}

impl ServingContext {
    /// Prepare serving state for `model` over its reference (training) data.
    ///
    /// The reference dataset must share the model's schema; it provides the
    /// attribution background and the comparable properties.
    pub fn new(model: Arc<EnsembleModel>, reference: &Dataset, config: ServingConfig) -> Result<Self> {
        config.validate()?;
        let schema = model.schema()?;
        if schema.fingerprint() != reference.schema().fingerprint() {
            return Err(SchemaError::FingerprintMismatch {
                expected: schema.fingerprint(),
                actual: reference.schema().fingerprint(),
            }
            .into());
        }

        let mut attribution = AttributionEngine::new(Arc::clone(&model), config.attribution.clone());
        attribution.setup(reference.features())?;
        let similarity = SimilarityIndex::fit(reference.features(), reference.targets())?;

        log::info!(
            "serving context ready: {} learners, {} reference rows",
            model.n_learners(),
            reference.n_samples()
        );

        Ok(Self {
            comparator: MarketComparator::new(config.market_band_pct),
            crime: CityResolver::crime().with_timeout(config.lookup_timeout()),
            market: CityResolver::market().with_timeout(config.lookup_timeout()),
            model,
            attribution,
            similarity,
            config,
        })
    }

    /// Use a live crime-index source, bounded by the configured timeout.
    pub fn with_crime_source(mut self, source: Arc<dyn CityDataSource<CrimeIndex>>) -> Self {
        self.crime = self.crime.with_source(source);
        self
    }

    /// Use a live market-snapshot source, bounded by the configured timeout.
    pub fn with_market_source(mut self, source: Arc<dyn CityDataSource<MarketSnapshot>>) -> Self {
        self.market = self.market.with_source(source);
        self
    }

    pub fn model(&self) -> &Arc<EnsembleModel> {
        &self.model
    }

    pub fn config(&self) -> &ServingConfig {
        &self.config
    }

    /// Reduce `input` to the model schema under the configured policy.
    pub fn reduce(&self, input: &FeatureMap) -> Result<FeatureVector> {
        Ok(self.model.schema()?.reduce_with(input, self.config.schema_policy)?)
    }

    pub fn predict(&self, input: &FeatureMap) -> Result<PredictionResult> {
        Ok(self.model.predict_vector(&self.reduce(input)?)?)
    }

    pub fn explain(&self, input: &FeatureMap) -> Result<AttributionResult> {
        Ok(self.attribution.explain_vector(&self.reduce(input)?)?)
    }

    /// The `k` reference properties nearest to `input` (default
    /// `n_similar`).
    pub fn similar(&self, input: &FeatureMap, k: Option<usize>) -> Result<SimilarityResult> {
        let vector = self.reduce(input)?;
        let k = k.unwrap_or(self.config.n_similar);
        Ok(self.similarity.query(ArrayView1::from(vector.as_slice()), k)?)
    }

    pub fn compare(&self, predicted: f64, similar: &SimilarityResult) -> MarketVerdict {
        self.comparator.compare(predicted, &similar.prices())
    }

    pub fn crime_index(&self, city: &str) -> Lookup<CrimeIndex> {
        self.crime.resolve(city)
    }

    pub fn market_snapshot(&self, city: &str) -> Lookup<MarketSnapshot> {
        self.market.resolve(city)
    }

    /// Engineered features of `record`, with location features when it
    /// names a city.
    pub fn features(&self, record: &PropertyRecord) -> (FeatureMap, Option<Lookup<CrimeIndex>>) {
        let mut features = record.engineer();
        let crime = record.city.as_deref().map(|city| self.crime.resolve(city));
        if let Some(lookup) = &crime {
            features.insert(CRIME_INDEX_FEATURE.into(), lookup.value().crime_index as f32);
            features.insert(SAFETY_SCORE_FEATURE.into(), lookup.value().safety_score as f32);
        }
        (features, crime)
    }

    /// Full appraisal of a raw record: price band, attribution, comparables,
    /// market verdict and city context.
    pub fn appraise(&self, record: &PropertyRecord) -> Result<Appraisal> {
        let (features, crime) = self.features(record);

        let prediction = self.predict(&features)?;
        let attribution = self.explain(&features)?;
        let similar = self.similar(&features, None)?;
        let market = self.compare(prediction.predicted_price, &similar);

        let location = match (record.city.as_deref(), crime) {
            (Some(city), Some(crime)) => Some(LocationInsight {
                city: normalize_city(city),
                crime,
                market: self.market.resolve(city),
            }),
            _ => None,
        };

        Ok(Appraisal {
            price_display: format!(
                "{} - {}",
                format_inr(prediction.price_lower),
                format_inr(prediction.price_upper)
            ),
            prediction,
            attribution,
            similar,
            market,
            location,
        })
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            trained: self.model.is_trained(),
            n_learners: self.model.n_learners(),
            feature_names: self.model.schema().map(|s| s.names().to_vec()).unwrap_or_default(),
            weights: self.model.weights().clone(),
            explained_learner: self.attribution.learner().map(str::to_string),
            metrics: self.model.metrics().cloned(),
        }
    }

    /// Cities with a reference crime index.
    pub fn cities(&self) -> Vec<(&'static str, CrimeIndex)> {
        known_cities()
    }
}

/// Shared, swappable [`ServingContext`].
///
/// Readers take an `Arc` snapshot; [`ContextHandle::replace`] installs a new
/// context without disturbing requests already holding the old one.
#[derive(Debug)]
pub struct ContextHandle {
    inner: RwLock<Arc<ServingContext>>,
}

impl ContextHandle {
    pub fn new(context: ServingContext) -> Self {
        Self { inner: RwLock::new(Arc::new(context)) }
    }

    pub fn current(&self) -> Arc<ServingContext> {
        Arc::clone(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Install `context`, returning the previous one.
    pub fn replace(&self, context: ServingContext) -> Arc<ServingContext> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(context))
    }
}
