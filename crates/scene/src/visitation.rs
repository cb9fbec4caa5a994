use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entities::GeoEntity;

/// Snapshot of what the user has marked visited.
///
/// Owned by the persistence layer; the map core only reads it to derive
/// filters. Ordered sets keep every derived filter deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitationState {
    /// Country display names, matched against the base geometry's `name`.
    #[serde(default)]
    pub countries: BTreeSet<String>,
    #[serde(default)]
    pub subdivisions: BTreeSet<String>,
    #[serde(default)]
    pub heritage_sites: BTreeSet<String>,
}

impl VisitationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_countries<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.countries = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_subdivisions<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subdivisions = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_heritage_sites<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.heritage_sites = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_country_visited(&self, name: &str) -> bool {
        self.countries.contains(name)
    }

    pub fn is_subdivision_visited(&self, code: &str) -> bool {
        self.subdivisions.contains(code)
    }

    pub fn is_site_visited(&self, id: &str) -> bool {
        self.heritage_sites.contains(id)
    }

    /// Countries match by name, subdivisions by code, sites by id.
    pub fn is_visited(&self, entity: &GeoEntity) -> bool {
        match entity {
            GeoEntity::Country(c) => self.is_country_visited(&c.name),
            GeoEntity::Subdivision(s) => self.is_subdivision_visited(&s.code),
            GeoEntity::HeritageSite(h) => self.is_site_visited(&h.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::VisitationState;
    use crate::entities::{Country, GeoEntity, Subdivision};
    use foundation::{CountryCode, LngLat};

    #[test]
    fn entity_kinds_match_on_their_own_keys() {
        let state = VisitationState::new()
            .with_countries(["Japan"])
            .with_subdivisions(["JP-13"]);

        let japan = GeoEntity::from(Country {
            code: CountryCode::new("JP"),
            name: "Japan".to_string(),
            coordinates: LngLat::new(138.0, 36.0),
        });
        let tokyo = GeoEntity::from(Subdivision {
            code: "JP-13".to_string(),
            name: "Tokyo".to_string(),
            country: CountryCode::new("JP"),
            coordinates: None,
            division_type: Some("prefecture".to_string()),
        });

        assert!(state.is_visited(&japan));
        assert!(state.is_visited(&tokyo));
        assert!(!state.is_country_visited("JP"));
    }
}
