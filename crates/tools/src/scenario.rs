use std::path::Path;

use formats::FeatureCollection;
use scene::{Country, HeritageSite, VisitationState};
use serde::Deserialize;
use view::{ViewConfig, ViewInputs};

/// Everything needed to mount a map offline.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: Option<ViewConfig>,
    #[serde(default)]
    pub visitation: VisitationState,
    #[serde(default)]
    pub heritage_sites: Vec<HeritageSite>,
    #[serde(default)]
    pub focused: Option<Country>,
    #[serde(default)]
    pub show_only_visited_sites: bool,
    /// Base country polygons (GeoJSON), served for the countries URL.
    #[serde(default)]
    pub countries: Option<serde_json::Value>,
    /// Directory laid out as `geojson/{country}/{type}/...`.
    #[serde(default)]
    pub geojson_dir: Option<String>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let payload = std::fs::read_to_string(path)
            .map_err(|e| format!("read {}: {e}", path.display()))?;
        Ok(serde_json::from_str(&payload)?)
    }

    pub fn view_config(&self) -> ViewConfig {
        self.config
            .clone()
            .unwrap_or_else(ViewConfig::from_env)
    }

    pub fn countries(&self) -> Result<FeatureCollection, formats::GeoJsonError> {
        match &self.countries {
            Some(value) => FeatureCollection::from_geojson_value(value.clone()),
            None => Ok(FeatureCollection::default()),
        }
    }

    pub fn inputs(&self) -> ViewInputs {
        ViewInputs {
            visitation: self.visitation.clone(),
            heritage_sites: self.heritage_sites.clone(),
            focused: self.focused.clone(),
            show_only_visited_sites: self.show_only_visited_sites,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Scenario;

    #[test]
    fn minimal_scenario_parses() {
        let s: Scenario = serde_json::from_str(
            r#"{
                "visitation": { "countries": ["Japan"] },
                "heritage_sites": [
                    { "id": "1", "name": "A", "coordinates": { "lng": 20.0, "lat": 10.0 }, "category": "cultural" }
                ],
                "focused": { "code": "jp", "name": "Japan", "coordinates": { "lng": 138.0, "lat": 36.0 } }
            }"#,
        )
        .expect("scenario");
        assert!(s.visitation.is_country_visited("Japan"));
        assert_eq!(s.heritage_sites.len(), 1);
        assert_eq!(s.focused.as_ref().map(|c| c.code.as_str().to_string()).as_deref(), Some("JP"));
        assert!(s.countries().expect("countries").is_empty());
    }
}
