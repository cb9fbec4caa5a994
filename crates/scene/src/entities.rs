use foundation::{CountryCode, LngLat};
use serde::{Deserialize, Serialize};

/// Heritage site category as published by the site registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SiteCategory {
    #[default]
    Cultural,
    Natural,
    Mixed,
    /// Unrecognized label, kept verbatim so it can be shown and colored with
    /// the fallback color.
    Other(String),
}

impl SiteCategory {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "cultural" => SiteCategory::Cultural,
            "natural" => SiteCategory::Natural,
            "mixed" => SiteCategory::Mixed,
            _ => SiteCategory::Other(label.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SiteCategory::Cultural => "cultural",
            SiteCategory::Natural => "natural",
            SiteCategory::Mixed => "mixed",
            SiteCategory::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for SiteCategory {
    fn from(value: String) -> Self {
        SiteCategory::parse(&value)
    }
}

impl From<SiteCategory> for String {
    fn from(value: SiteCategory) -> Self {
        value.as_str().to_string()
    }
}

impl Serialize for SiteCategory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SiteCategory {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(SiteCategory::parse(&s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub code: CountryCode,
    pub name: String,
    pub coordinates: LngLat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subdivision {
    pub code: String,
    pub name: String,
    pub country: CountryCode,
    #[serde(default)]
    pub coordinates: Option<LngLat>,
    /// e.g. "prefecture", "state".
    #[serde(default)]
    pub division_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeritageSite {
    pub id: String,
    pub name: String,
    /// Registry rows without a position are kept but never drawn.
    #[serde(default)]
    pub coordinates: Option<LngLat>,
    #[serde(default)]
    pub category: SiteCategory,
    #[serde(default)]
    pub country: Option<CountryCode>,
}

/// Read-only entity supplied by the data layer.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoEntity {
    Country(Country),
    Subdivision(Subdivision),
    HeritageSite(HeritageSite),
}

impl GeoEntity {
    pub fn id(&self) -> &str {
        match self {
            GeoEntity::Country(c) => c.code.as_str(),
            GeoEntity::Subdivision(s) => &s.code,
            GeoEntity::HeritageSite(h) => &h.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            GeoEntity::Country(c) => &c.name,
            GeoEntity::Subdivision(s) => &s.name,
            GeoEntity::HeritageSite(h) => &h.name,
        }
    }

    pub fn coordinates(&self) -> Option<LngLat> {
        match self {
            GeoEntity::Country(c) => Some(c.coordinates),
            GeoEntity::Subdivision(s) => s.coordinates,
            GeoEntity::HeritageSite(h) => h.coordinates,
        }
    }

    pub fn category(&self) -> Option<&SiteCategory> {
        match self {
            GeoEntity::HeritageSite(h) => Some(&h.category),
            _ => None,
        }
    }
}

impl From<Country> for GeoEntity {
    fn from(value: Country) -> Self {
        GeoEntity::Country(value)
    }
}

impl From<Subdivision> for GeoEntity {
    fn from(value: Subdivision) -> Self {
        GeoEntity::Subdivision(value)
    }
}

impl From<HeritageSite> for GeoEntity {
    fn from(value: HeritageSite) -> Self {
        GeoEntity::HeritageSite(value)
    }
}
