//! Predicted price against comparable sales.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::mean;

/// Default half-width of the "fair" band, in percent.
pub const DEFAULT_BAND_PCT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Overpriced,
    Underpriced,
    Fair,
    /// No usable comparables.
    Unknown,
}

impl MarketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overpriced => "overpriced",
            Self::Underpriced => "underpriced",
            Self::Fair => "fair",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketVerdict {
    pub status: MarketStatus,
    /// `(predicted - mean) / mean * 100`; 0 when unknown.
    pub difference_pct: f64,
    pub avg_similar_price: Option<f64>,
    pub suggestion: String,
}

/// Classifies a price relative to the mean of comparable prices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketComparator {
    band_pct: f64,
}

impl Default for MarketComparator {
    fn default() -> Self {
        Self { band_pct: DEFAULT_BAND_PCT }
    }
}

impl MarketComparator {
    pub fn new(band_pct: f64) -> Self {
        Self { band_pct }
    }

    pub fn band_pct(&self) -> f64 {
        self.band_pct
    }

    pub fn compare(&self, predicted: f64, similar_prices: &[f64]) -> MarketVerdict {
        let avg = mean(similar_prices);
        if similar_prices.is_empty() || !(avg > 0.0) {
            return MarketVerdict {
                status: MarketStatus::Unknown,
                difference_pct: 0.0,
                avg_similar_price: None,
                suggestion: "Not enough comparable properties to assess market value.".into(),
            };
        }

        let pct = (predicted - avg) / avg * 100.0;
        let (status, suggestion) = if pct > self.band_pct {
            (
                MarketStatus::Overpriced,
                format!("This property is {:.1}% above market average. Consider negotiating.", pct.abs()),
            )
        } else if pct < -self.band_pct {
            (
                MarketStatus::Underpriced,
                format!("This property is {:.1}% below market average. Good value!", pct.abs()),
            )
        } else {
            (MarketStatus::Fair, "This property is priced fairly compared to similar properties.".into())
        };

        MarketVerdict { status, difference_pct: pct, avg_similar_price: Some(avg), suggestion }
    }
}
