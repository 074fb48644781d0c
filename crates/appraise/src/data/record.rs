//! Raw property records and the feature engineering rules that turn them
//! into keyed feature maps.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use super::schema::{FeatureMap, FeatureSchema, SchemaError};

/// Engineered housing features, in training order.
pub const HOUSING_FEATURES: &[&str] = &[
    "area",
    "bedrooms",
    "bathrooms",
    "stories",
    "mainroad",
    "guestroom",
    "basement",
    "hotwaterheating",
    "airconditioning",
    "parking",
    "prefarea",
    "bedroom_ratio",
    "bathroom_ratio",
    "total_rooms",
    "furnishing_score",
    "amenity_score",
    "area_cat_small",
    "area_cat_medium",
    "area_cat_large",
    "area_cat_very_large",
    "area_cat_luxury",
];

/// Schema over [`HOUSING_FEATURES`].
pub fn housing_schema() -> FeatureSchema {
    // Names are static and unique.
    FeatureSchema::new(HOUSING_FEATURES.iter().copied())
        .unwrap_or_else(|e: SchemaError| unreachable!("housing schema is invalid: {e}"))
}

/// Furnishing level of a property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Furnishing {
    Unfurnished,
    #[default]
    SemiFurnished,
    Furnished,
}

impl Furnishing {
    /// Ordinal score: unfurnished 0, semi-furnished 1, furnished 2.
    pub fn score(self) -> f32 {
        match self {
            Self::Unfurnished => 0.0,
            Self::SemiFurnished => 1.0,
            Self::Furnished => 2.0,
        }
    }
}

impl FromStr for Furnishing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unfurnished" => Ok(Self::Unfurnished),
            "semi-furnished" | "semi_furnished" | "semifurnished" => Ok(Self::SemiFurnished),
            "furnished" => Ok(Self::Furnished),
            other => Err(format!("unknown furnishing status '{other}'")),
        }
    }
}

/// Area bands used for the one-hot area category.
///
/// Upper bounds are inclusive: `(0, 3000]`, `(3000, 5000]`, `(5000, 7000]`,
/// `(7000, 10000]`, `(10000, ∞)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaCategory {
    Small,
    Medium,
    Large,
    VeryLarge,
    Luxury,
}

impl AreaCategory {
    pub const ALL: [AreaCategory; 5] =
        [Self::Small, Self::Medium, Self::Large, Self::VeryLarge, Self::Luxury];

    /// Category of an area in square feet; `None` for non-positive areas.
    pub fn of(area: f32) -> Option<Self> {
        if !(area > 0.0) {
            return None;
        }
        Some(match area {
            a if a <= 3000.0 => Self::Small,
            a if a <= 5000.0 => Self::Medium,
            a if a <= 7000.0 => Self::Large,
            a if a <= 10000.0 => Self::VeryLarge,
            _ => Self::Luxury,
        })
    }

    pub fn feature_name(self) -> &'static str {
        match self {
            Self::Small => "area_cat_small",
            Self::Medium => "area_cat_medium",
            Self::Large => "area_cat_large",
            Self::VeryLarge => "area_cat_very_large",
            Self::Luxury => "area_cat_luxury",
        }
    }
}

/// A raw property listing.
///
/// Amenity flags accept `true`/`false`, `"yes"`/`"no"` and `1`/`0` when
/// deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Built-up area in square feet.
    pub area: f32,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub stories: u32,
    #[serde(default)]
    pub parking: u32,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub mainroad: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub guestroom: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub basement: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub hotwaterheating: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub airconditioning: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub prefarea: bool,
    #[serde(default, rename = "furnishingstatus")]
    pub furnishing: Furnishing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl PropertyRecord {
    /// Minimal record with every optional amenity off.
    pub fn new(area: f32, bedrooms: u32, bathrooms: u32, stories: u32) -> Self {
        Self {
            area,
            bedrooms,
            bathrooms,
            stories,
            parking: 0,
            mainroad: false,
            guestroom: false,
            basement: false,
            hotwaterheating: false,
            airconditioning: false,
            prefarea: false,
            furnishing: Furnishing::default(),
            city: None,
        }
    }

    fn amenity_flags(&self) -> [(&'static str, bool); 6] {
        [
            ("mainroad", self.mainroad),
            ("guestroom", self.guestroom),
            ("basement", self.basement),
            ("hotwaterheating", self.hotwaterheating),
            ("airconditioning", self.airconditioning),
            ("prefarea", self.prefarea),
        ]
    }

    /// Apply the engineering rules.
    ///
    /// Produces every name in [`HOUSING_FEATURES`]. Location features (crime
    /// index, safety score) are added separately by the serving layer.
    pub fn engineer(&self) -> FeatureMap {
        let mut out = FeatureMap::new();
        let bedrooms = self.bedrooms as f32;
        let bathrooms = self.bathrooms as f32;

        out.insert("area".into(), self.area);
        out.insert("bedrooms".into(), bedrooms);
        out.insert("bathrooms".into(), bathrooms);
        out.insert("stories".into(), self.stories as f32);
        out.insert("parking".into(), self.parking as f32);

        let mut amenity_score = 0.0;
        for (name, flag) in self.amenity_flags() {
            let v = if flag { 1.0 } else { 0.0 };
            amenity_score += v;
            out.insert(name.into(), v);
        }

        let bedroom_ratio = if self.area > 0.0 { bedrooms / self.area * 1000.0 } else { 0.0 };
        out.insert("bedroom_ratio".into(), bedroom_ratio);
        out.insert("bathroom_ratio".into(), bathrooms / bedrooms.max(1.0));
        out.insert("total_rooms".into(), bedrooms + bathrooms);
        out.insert("furnishing_score".into(), self.furnishing.score());
        out.insert("amenity_score".into(), amenity_score);

        let category = AreaCategory::of(self.area);
        for cat in AreaCategory::ALL {
            let v = if category == Some(cat) { 1.0 } else { 0.0 };
            out.insert(cat.feature_name().into(), v);
        }

        out
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlagVisitor;

    impl Visitor<'_> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a boolean, \"yes\"/\"no\", or 0/1")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
            }
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
            match v.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" | "true" | "1" => Ok(true),
                "no" | "n" | "false" | "0" | "" => Ok(false),
                _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
            }
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[test]
    fn engineer_covers_schema() {
        let record = PropertyRecord::new(7420.0, 4, 2, 3);
        let features = record.engineer();
        let schema = housing_schema();
        for name in schema.names() {
            assert!(features.contains_key(name), "missing {name}");
        }
        assert_eq!(features.len(), HOUSING_FEATURES.len());
    }

    #[test]
    fn engineer_derived_values() {
        let mut record = PropertyRecord::new(8000.0, 4, 2, 2);
        record.mainroad = true;
        record.airconditioning = true;
        record.prefarea = true;
        record.furnishing = Furnishing::Furnished;

        let f = record.engineer();
        assert_abs_diff_eq!(f["bedroom_ratio"], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(f["bathroom_ratio"], 0.5, epsilon = 1e-6);
        assert_eq!(f["total_rooms"], 6.0);
        assert_eq!(f["amenity_score"], 3.0);
        assert_eq!(f["furnishing_score"], 2.0);
        assert_eq!(f["area_cat_very_large"], 1.0);
        assert_eq!(f["area_cat_large"], 0.0);
    }

    #[test]
    fn zero_bedrooms_uses_one_for_bathroom_ratio() {
        let record = PropertyRecord::new(1000.0, 0, 2, 1);
        assert_eq!(record.engineer()["bathroom_ratio"], 2.0);
    }

    #[rstest]
    #[case(0.0, None)]
    #[case(1650.0, Some(AreaCategory::Small))]
    #[case(3000.0, Some(AreaCategory::Small))]
    #[case(3000.5, Some(AreaCategory::Medium))]
    #[case(7000.0, Some(AreaCategory::Large))]
    #[case(9960.0, Some(AreaCategory::VeryLarge))]
    #[case(16200.0, Some(AreaCategory::Luxury))]
    fn area_category_bins(#[case] area: f32, #[case] expected: Option<AreaCategory>) {
        assert_eq!(AreaCategory::of(area), expected);
    }

    #[test]
    fn deserialize_yes_no_flags() {
        let json = r#"{
            "area": 7420, "bedrooms": 4, "bathrooms": 2, "stories": 3, "parking": 2,
            "mainroad": "yes", "guestroom": "no", "basement": 0, "hotwaterheating": false,
            "airconditioning": "Yes", "prefarea": 1, "furnishingstatus": "semi-furnished",
            "city": "Pune"
        }"#;
        let record: PropertyRecord = serde_json::from_str(json).unwrap();
        assert!(record.mainroad);
        assert!(!record.guestroom);
        assert!(record.airconditioning);
        assert!(record.prefarea);
        assert_eq!(record.furnishing, Furnishing::SemiFurnished);
        assert_eq!(record.city.as_deref(), Some("Pune"));
    }

    #[test]
    fn deserialize_rejects_bad_flag() {
        let json = r#"{"area": 1, "bedrooms": 1, "bathrooms": 1, "stories": 1, "mainroad": "maybe"}"#;
        assert!(serde_json::from_str::<PropertyRecord>(json).is_err());
    }

    #[test]
    fn furnishing_from_str() {
        assert_eq!("Furnished".parse::<Furnishing>().unwrap(), Furnishing::Furnished);
        assert_eq!("semi-furnished".parse::<Furnishing>().unwrap(), Furnishing::SemiFurnished);
        assert!("palatial".parse::<Furnishing>().is_err());
    }
}
