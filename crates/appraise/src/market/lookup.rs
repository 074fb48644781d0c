//! City-level data: crime index and market snapshots.
//!
//! Values come from a static reference table, a cached live source, or a
//! static fallback. A live fetch is bounded by a timeout; any failure is
//! logged and replaced by the fallback, so resolution never fails.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Crime index assumed for cities missing from the table.
pub const DEFAULT_CRIME_INDEX: f64 = 5.0;

/// Default bound on one live fetch.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of live values kept per resolver.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Default number of concurrent live fetches per resolver.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Crime index (1 = safest, 10 = least safe) of major Indian cities.
static CITY_CRIME_INDEX: &[(&str, f64)] = &[
    ("Delhi", 7.8),
    ("Mumbai", 6.5),
    ("Bangalore", 4.2),
    ("Chennai", 4.5),
    ("Kolkata", 5.8),
    ("Hyderabad", 4.0),
    ("Pune", 3.5),
    ("Ahmedabad", 5.2),
    ("Jaipur", 5.5),
    ("Lucknow", 6.0),
    ("Surat", 3.8),
    ("Kanpur", 6.5),
    ("Nagpur", 4.8),
    ("Indore", 4.0),
    ("Thane", 5.0),
    ("Bhopal", 5.5),
    ("Visakhapatnam", 3.5),
    ("Patna", 6.8),
    ("Vadodara", 4.0),
    ("Ghaziabad", 6.2),
    ("Ludhiana", 5.0),
    ("Agra", 5.8),
    ("Nashik", 4.2),
    ("Faridabad", 6.5),
    ("Meerut", 6.0),
    ("Rajkot", 3.5),
    ("Varanasi", 5.5),
    ("Srinagar", 7.0),
    ("Coimbatore", 3.2),
    ("Chandigarh", 3.8),
    ("Noida", 5.5),
    ("Gurgaon", 5.8),
    ("Kochi", 3.0),
    ("Mangalore", 2.8),
    ("Mysore", 3.5),
    ("Trivandrum", 3.2),
    ("Madurai", 4.0),
    ("Jodhpur", 4.5),
    ("Udaipur", 3.5),
    ("Dehradun", 4.2),
    ("Amritsar", 5.0),
    ("Ranchi", 5.5),
    ("Bhubaneswar", 4.0),
    ("Guwahati", 4.8),
    ("Raipur", 4.5),
    ("Vijayawada", 4.2),
    ("Tiruchirappalli", 3.8),
    ("Salem", 4.0),
    ("Guntur", 4.5),
    ("Nellore", 4.0),
    ("Tirupati", 3.2),
    ("Shimla", 2.5),
    ("Pondicherry", 3.0),
    ("Goa", 3.5),
    ("Jammu", 5.5),
    ("Jalandhar", 4.8),
    ("Belgaum", 4.0),
    ("Hubli", 4.2),
    ("Vellore", 3.5),
    ("Aurangabad", 4.8),
    ("Solapur", 4.5),
    ("Aligarh", 5.5),
    ("Bareilly", 5.2),
    ("Moradabad", 5.8),
    ("Gorakhpur", 5.5),
    ("Allahabad", 5.5),
    ("Jabalpur", 5.0),
    ("Gwalior", 5.2),
    ("Dhanbad", 5.8),
    ("Jamshedpur", 4.5),
    ("Bokaro", 5.0),
    ("Asansol", 5.5),
    ("Durgapur", 4.8),
    ("Siliguri", 5.0),
    ("Cuttack", 4.5),
];

// =============================================================================
// Errors and sources
// =============================================================================

/// Failure of an external city-data collaborator.
///
/// Never escapes [`CityResolver::resolve`]; it is logged and replaced by the
/// fallback value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{0} lookups already in flight")]
    Saturated(usize),
}

/// An external source of per-city data.
pub trait CityDataSource<T>: Send + Sync {
    fn fetch(&self, city: &str) -> Result<T, CollaboratorError>;
}

impl<T, F> CityDataSource<T> for F
where
    F: Fn(&str) -> Result<T, CollaboratorError> + Send + Sync,
{
    fn fetch(&self, city: &str) -> Result<T, CollaboratorError> {
        self(city)
    }
}

/// Extract the JSON object embedded in free text.
///
/// Takes everything from the first `{` to the last `}`.
pub fn parse_json_object(text: &str) -> Result<Map<String, Value>, CollaboratorError> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(CollaboratorError::Malformed("no JSON object found".into()));
    };
    if end < start {
        return Err(CollaboratorError::Malformed("no JSON object found".into()));
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CollaboratorError::Malformed("not a JSON object".into())),
        Err(e) => Err(CollaboratorError::Malformed(e.to_string())),
    }
}

/// [`parse_json_object`] followed by typed deserialization.
pub fn parse_embedded<T: DeserializeOwned>(text: &str) -> Result<T, CollaboratorError> {
    let map = parse_json_object(text)?;
    serde_json::from_value(Value::Object(map)).map_err(|e| CollaboratorError::Malformed(e.to_string()))
}

// =============================================================================
// Lookup
// =============================================================================

/// A resolved value tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum Lookup<T> {
    /// Static reference table.
    Reference(T),
    /// External source (possibly cached).
    Live(T),
    /// Static fallback after a failed or missing source.
    Fallback(T),
}

impl<T> Lookup<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Reference(v) | Self::Live(v) | Self::Fallback(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Reference(v) | Self::Live(v) | Self::Fallback(v) => v,
        }
    }

    pub fn fallback_used(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    pub fn source(&self) -> &'static str {
        match self {
            Self::Reference(_) => "reference",
            Self::Live(_) => "live",
            Self::Fallback(_) => "fallback",
        }
    }
}

// =============================================================================
// Crime index
// =============================================================================

/// Crime index with its derived safety score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrimeIndex {
    pub crime_index: f64,
    /// `10 - crime_index`.
    pub safety_score: f64,
}

impl CrimeIndex {
    pub fn new(crime_index: f64) -> Self {
        Self { crime_index, safety_score: 10.0 - crime_index }
    }

    /// Table entry for `city` (exact, title-cased name).
    pub fn reference(city: &str) -> Option<Self> {
        CITY_CRIME_INDEX.iter().find(|(name, _)| *name == city).map(|&(_, index)| Self::new(index))
    }

    pub fn fallback(_city: &str) -> Self {
        Self::new(DEFAULT_CRIME_INDEX)
    }

    /// Parse a `{"crime_index": .., "safety_score": ..}` object from free
    /// text. A missing safety score is derived; the index must lie in
    /// `[0, 10]`.
    pub fn parse(text: &str) -> Result<Self, CollaboratorError> {
        #[derive(Deserialize)]
        struct Raw {
            crime_index: f64,
            safety_score: Option<f64>,
        }

        let raw: Raw = parse_embedded(text)?;
        if !(0.0..=10.0).contains(&raw.crime_index) {
            return Err(CollaboratorError::Malformed(format!(
                "crime_index {} outside [0, 10]",
                raw.crime_index
            )));
        }
        let safety_score = raw.safety_score.filter(|s| s.is_finite()).unwrap_or(10.0 - raw.crime_index);
        Ok(Self { crime_index: raw.crime_index, safety_score })
    }
}

/// Cities with a reference crime index, sorted by name.
pub fn known_cities() -> Vec<(&'static str, CrimeIndex)> {
    let mut cities: Vec<_> =
        CITY_CRIME_INDEX.iter().map(|&(name, index)| (name, CrimeIndex::new(index))).collect();
    cities.sort_unstable_by_key(|&(name, _)| name);
    cities
}

// =============================================================================
// Market snapshot
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketTrend {
    Rising,
    Stable,
    Declining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandLevel {
    High,
    Medium,
    Low,
}

/// Headline market figures for a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub avg_price_per_sqft: f64,
    pub market_trend: MarketTrend,
    pub yoy_change_pct: f64,
    pub demand_level: DemandLevel,
    pub rental_yield_pct: f64,
}

impl MarketSnapshot {
    /// Static estimate for `city`.
    pub fn fallback(city: &str) -> Self {
        let (avg_price_per_sqft, market_trend, yoy_change_pct) = match city {
            "Mumbai" => (15000.0, MarketTrend::Rising, 8.5),
            "Delhi" => (12000.0, MarketTrend::Rising, 7.2),
            "Bangalore" => (9500.0, MarketTrend::Rising, 9.0),
            "Hyderabad" => (7500.0, MarketTrend::Rising, 10.5),
            "Pune" => (8000.0, MarketTrend::Stable, 5.5),
            "Chennai" => (7000.0, MarketTrend::Stable, 4.8),
            _ => (6000.0, MarketTrend::Stable, 5.0),
        };
        let demand_level = if yoy_change_pct > 7.0 { DemandLevel::High } else { DemandLevel::Medium };
        Self { avg_price_per_sqft, market_trend, yoy_change_pct, demand_level, rental_yield_pct: 3.5 }
    }

    /// Parse a snapshot object from free text. Prices must be positive.
    pub fn parse(text: &str) -> Result<Self, CollaboratorError> {
        let snapshot: Self = parse_embedded(text)?;
        if !(snapshot.avg_price_per_sqft > 0.0) || !snapshot.avg_price_per_sqft.is_finite() {
            return Err(CollaboratorError::Malformed(format!(
                "avg_price_per_sqft {} is not positive",
                snapshot.avg_price_per_sqft
            )));
        }
        Ok(snapshot)
    }
}

// =============================================================================
// CityResolver
// =============================================================================

/// Title-case each alphabetic run: `"new delhi"` -> `"New Delhi"`.
pub fn normalize_city(city: &str) -> String {
    let mut out = String::with_capacity(city.len());
    let mut at_word_start = true;
    for c in city.trim().chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Releases an in-flight slot when the worker finishes, even late.
struct InFlightSlot(Arc<AtomicUsize>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Resolves per-city values: reference table, then cache, then the live
/// source under a timeout, then the fallback.
///
/// Only successful live values are cached, up to a fixed capacity; once full,
/// new cities are fetched every time. A worker that outlives its timeout
/// keeps its in-flight slot until the source returns, and no new fetch
/// starts while every slot is taken.
pub struct CityResolver<T> {
    reference: fn(&str) -> Option<T>,
    fallback: fn(&str) -> T,
    source: Option<Arc<dyn CityDataSource<T>>>,
    timeout: Duration,
    cache: RwLock<HashMap<String, T>>,
    cache_capacity: usize,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: usize,
}

impl<T> fmt::Debug for CityResolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CityResolver")
            .field("has_source", &self.source.is_some())
            .field("timeout", &self.timeout)
            .field("cache_capacity", &self.cache_capacity)
            .field("max_in_flight", &self.max_in_flight)
            .finish_non_exhaustive()
    }
}

impl CityResolver<CrimeIndex> {
    /// Crime index resolver backed by the built-in table.
    pub fn crime() -> Self {
        Self::new(CrimeIndex::reference, CrimeIndex::fallback)
    }
}

impl CityResolver<MarketSnapshot> {
    /// Market snapshot resolver. Without a source every city falls back.
    pub fn market() -> Self {
        Self::new(|_| None, MarketSnapshot::fallback)
    }
}

impl<T: Clone + Send + 'static> CityResolver<T> {
    pub fn new(reference: fn(&str) -> Option<T>, fallback: fn(&str) -> T) -> Self {
        Self {
            reference,
            fallback,
            source: None,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
            cache: RwLock::new(HashMap::new()),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn CityDataSource<T>>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// At least one fetch is always allowed.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Live fetches currently running, including timed-out ones.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of cached live values.
    pub fn cached(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Resolve `city`. Never fails and blocks at most for the timeout.
    pub fn resolve(&self, city: &str) -> Lookup<T> {
        let city = normalize_city(city);

        if let Some(value) = (self.reference)(&city) {
            return Lookup::Reference(value);
        }
        if let Some(value) = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(&city) {
            return Lookup::Live(value.clone());
        }
        let Some(source) = &self.source else {
            return Lookup::Fallback((self.fallback)(&city));
        };

        match self.fetch(Arc::clone(source), &city) {
            Ok(value) => {
                let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
                if cache.len() < self.cache_capacity {
                    cache.insert(city, value.clone());
                }
                Lookup::Live(value)
            }
            Err(e) => {
                log::warn!("lookup for '{city}' failed ({e}); using fallback");
                Lookup::Fallback((self.fallback)(&city))
            }
        }
    }

    fn fetch(&self, source: Arc<dyn CityDataSource<T>>, city: &str) -> Result<T, CollaboratorError> {
        let reserved = self.in_flight.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (n < self.max_in_flight).then_some(n + 1)
        });
        if let Err(n) = reserved {
            return Err(CollaboratorError::Saturated(n));
        }
        let slot = InFlightSlot(Arc::clone(&self.in_flight));

        let (tx, rx) = mpsc::channel();
        let owned = city.to_string();
        // A late worker's send fails silently once the receiver is gone.
        thread::Builder::new()
            .name("city-lookup".into())
            .spawn(move || {
                let _slot = slot;
                let _ = tx.send(source.fetch(&owned));
            })
            .map_err(|e| CollaboratorError::Unreachable(e.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(CollaboratorError::Timeout(self.timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(CollaboratorError::Unreachable("lookup worker exited".into()))
            }
        }
    }
}
