use std::env;

use foundation::{Camera, LngLat};
use layers::Theme;
use serde::{Deserialize, Serialize};
use streaming::{DEFAULT_SUBDIVISION_TYPES, ProberConfig};

#[derive(Debug)]
pub enum ConfigError {
    Read { path: String, message: String },
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, message } => write!(f, "read {path}: {message}"),
            ConfigError::Parse(msg) => write!(f, "invalid view config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub container: String,
    pub light_style_url: String,
    pub dark_style_url: String,
    /// Base country polygons; features carry a `name` property.
    pub countries_url: String,
    /// Root under which `geojson/{country}/{type}/...` is served.
    pub geojson_base_url: String,
    pub center: LngLat,
    pub zoom: f64,
    /// Zoom used when flying to a focused country.
    pub focus_zoom: f64,
    pub dark: bool,
    pub subdivision_types: Vec<String>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            container: "map".to_string(),
            light_style_url: "https://basemaps.cartocdn.com/gl/positron-gl-style/style.json"
                .to_string(),
            dark_style_url: "https://basemaps.cartocdn.com/gl/dark-matter-gl-style/style.json"
                .to_string(),
            countries_url: "/geojson/countries.geojson".to_string(),
            geojson_base_url: "http://localhost:4200".to_string(),
            center: Camera::default().center,
            zoom: Camera::default().zoom,
            focus_zoom: 4.0,
            dark: false,
            subdivision_types: DEFAULT_SUBDIVISION_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ViewConfig {
    pub fn from_json_str(payload: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(payload).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json_file(path: &str) -> Result<Self, ConfigError> {
        let payload = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&payload)
    }

    /// Defaults overlaid with `TRAVEL_MAP_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        self.container = env_var_string("TRAVEL_MAP_CONTAINER", self.container);
        self.light_style_url = env_var_string("TRAVEL_MAP_LIGHT_STYLE", self.light_style_url);
        self.dark_style_url = env_var_string("TRAVEL_MAP_DARK_STYLE", self.dark_style_url);
        self.countries_url = env_var_string("TRAVEL_MAP_COUNTRIES_URL", self.countries_url);
        self.geojson_base_url = env_var_string("TRAVEL_MAP_GEOJSON_BASE", self.geojson_base_url);
        self.center = LngLat::new(
            env_var_f64("TRAVEL_MAP_CENTER_LNG", self.center.lng),
            env_var_f64("TRAVEL_MAP_CENTER_LAT", self.center.lat),
        );
        self.zoom = env_var_f64("TRAVEL_MAP_ZOOM", self.zoom);
        self.focus_zoom = env_var_f64("TRAVEL_MAP_FOCUS_ZOOM", self.focus_zoom);
        self.dark = env_var_bool("TRAVEL_MAP_DARK", self.dark);
        if let Ok(types) = env::var("TRAVEL_MAP_SUBDIVISION_TYPES") {
            let types = split_list(&types);
            if !types.is_empty() {
                self.subdivision_types = types;
            }
        }
        self
    }

    pub fn theme(&self) -> Theme {
        Theme::from_dark(self.dark)
    }

    pub fn style_url(&self, theme: Theme) -> &str {
        match theme {
            Theme::Light => &self.light_style_url,
            Theme::Dark => &self.dark_style_url,
        }
    }

    pub fn initial_camera(&self) -> Camera {
        Camera::new(self.center, self.zoom)
    }

    pub fn prober_config(&self) -> ProberConfig {
        if self.subdivision_types.is_empty() {
            return ProberConfig::default();
        }
        ProberConfig {
            candidates: self.subdivision_types.clone(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_var_string(key: &str, default: String) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn env_var_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v: &f64| v.is_finite())
        .unwrap_or(default)
}

fn env_var_bool(key: &str, default: bool) -> bool {
    match env::var(key).map(|v| v.trim().to_ascii_lowercase()) {
        Ok(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Ok(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}
