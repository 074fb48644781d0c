//! Market context: comparable properties, price comparison and city data.

mod comparator;
mod lookup;
mod similarity;

pub use comparator::{MarketComparator, MarketStatus, MarketVerdict, DEFAULT_BAND_PCT};
pub use lookup::{
    known_cities, normalize_city, parse_embedded, parse_json_object, CityDataSource, CityResolver,
    CollaboratorError, CrimeIndex, DemandLevel, Lookup, MarketSnapshot, MarketTrend,
    DEFAULT_CACHE_CAPACITY, DEFAULT_CRIME_INDEX, DEFAULT_LOOKUP_TIMEOUT, DEFAULT_MAX_IN_FLIGHT,
};
pub use similarity::{
    SimilarRecord, SimilarityEngine, SimilarityError, SimilarityIndex, SimilarityResult, StandardScaler,
};
