//! Opportunistic discovery of per-country subdivision geometry.
//!
//! Candidates are tried strictly in order; within a candidate every listed
//! region is fetched concurrently. Nothing here is fatal: failed manifests
//! move on to the next candidate, failed regions are dropped, and an
//! exhausted candidate list yields [`RegionalDataset::Unavailable`].

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use formats::{FeatureCollection, RegionManifest};
use foundation::CountryCode;
use futures_util::FutureExt;
use futures_util::future::{LocalBoxFuture, Shared, join_all};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, RegionalCache, SlotState};
use crate::source::{GeoJsonSource, manifest_path, region_path};

/// Subdivision type labels tried in order when none is configured.
pub const DEFAULT_SUBDIVISION_TYPES: &[&str] = &[
    "states",
    "provinces",
    "regions",
    "prefectures",
    "departments",
    "counties",
    "districts",
    "municipalities",
];

/// Feature property carrying the subdivision code used by visited filters.
pub const CODE_PROPERTY: &str = "code";
pub const NAME_PROPERTY: &str = "name";
pub const REGION_TYPE_PROPERTY: &str = "region_type";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProberConfig {
    pub candidates: Vec<String>,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_SUBDIVISION_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSkip {
    pub region: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionalCollection {
    pub country: CountryCode,
    pub subdivision_type: String,
    /// Regions whose geometry loaded, in manifest order.
    pub regions: Vec<String>,
    pub skipped: Vec<RegionSkip>,
    pub features: Arc<FeatureCollection>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionalDataset {
    Resolved(Arc<RegionalCollection>),
    /// No candidate produced usable geometry. Distinct from a transient
    /// error: it is cached like any other result.
    Unavailable,
}

impl RegionalDataset {
    pub fn is_resolved(&self) -> bool {
        matches!(self, RegionalDataset::Resolved(_))
    }

    pub fn collection(&self) -> Option<&RegionalCollection> {
        match self {
            RegionalDataset::Resolved(c) => Some(c),
            RegionalDataset::Unavailable => None,
        }
    }
}

pub type ProbeFuture = Shared<LocalBoxFuture<'static, RegionalDataset>>;

pub struct RegionalDataProber {
    source: Rc<dyn GeoJsonSource>,
    config: Rc<ProberConfig>,
    cache: Rc<RefCell<RegionalCache>>,
}

impl RegionalDataProber {
    pub fn new(source: Rc<dyn GeoJsonSource>, config: ProberConfig) -> Self {
        Self {
            source,
            config: Rc::new(config),
            cache: Rc::new(RefCell::new(RegionalCache::new())),
        }
    }

    pub fn config(&self) -> &ProberConfig {
        &self.config
    }

    /// Resident result for `code`, if a probe already completed.
    pub fn cached(&self, code: &CountryCode) -> Option<RegionalDataset> {
        self.cache.borrow().resident(code).cloned()
    }

    pub fn cache_state(&self, code: &CountryCode) -> Option<SlotState> {
        self.cache.borrow().state(code)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.borrow().stats()
    }

    /// Probes `code`, sharing any in-flight probe and reusing resident results.
    pub fn probe(&self, code: &CountryCode) -> ProbeFuture {
        if let Some(fut) = self.cache.borrow_mut().lookup(code) {
            debug!(country = %code, "regional probe served from cache");
            return fut;
        }

        let source = Rc::clone(&self.source);
        let config = Rc::clone(&self.config);
        let cache: Weak<RefCell<RegionalCache>> = Rc::downgrade(&self.cache);
        let country = code.clone();

        let fut = async move {
            let dataset = discover(&*source, &config, &country).await;
            if let Some(cache) = cache.upgrade() {
                cache
                    .borrow_mut()
                    .mark_resident(country.clone(), dataset.clone());
            }
            dataset
        }
        .boxed_local()
        .shared();

        self.cache
            .borrow_mut()
            .insert_in_flight(code.clone(), fut.clone());
        fut
    }
}

impl std::fmt::Debug for RegionalDataProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionalDataProber")
            .field("config", &self.config)
            .field("cache", &self.cache.borrow())
            .finish()
    }
}

async fn discover(
    source: &dyn GeoJsonSource,
    config: &ProberConfig,
    country: &CountryCode,
) -> RegionalDataset {
    for candidate in &config.candidates {
        let Some(manifest) = fetch_manifest(source, country, candidate).await else {
            continue;
        };

        let fetches = manifest.regions.iter().map(|region| {
            let path = region_path(country, candidate, region);
            async move { (region.as_str(), source.fetch(&path).await) }
        });
        let results = join_all(fetches).await;

        let mut features = FeatureCollection::default();
        let mut regions: Vec<String> = Vec::new();
        let mut skipped: Vec<RegionSkip> = Vec::new();

        for (region, result) in results {
            let parsed = match result {
                Ok(Some(bytes)) => FeatureCollection::from_geojson_slice(&bytes)
                    .map_err(|e| e.to_string())
                    .and_then(|fc| {
                        if fc.is_empty() {
                            Err("geometry file has no features".to_string())
                        } else {
                            Ok(fc)
                        }
                    }),
                Ok(None) => Err("geometry file not found".to_string()),
                Err(e) => Err(e.to_string()),
            };

            match parsed {
                Ok(mut fc) => {
                    for feature in &mut fc.features {
                        normalize_region_properties(&mut feature.properties, region, candidate);
                    }
                    features.extend(fc);
                    regions.push(region.to_string());
                }
                Err(reason) => {
                    warn!(
                        country = %country,
                        subdivision_type = %candidate,
                        region = %region,
                        %reason,
                        "skipping region geometry"
                    );
                    skipped.push(RegionSkip {
                        region: region.to_string(),
                        reason,
                    });
                }
            }
        }

        if regions.is_empty() {
            warn!(
                country = %country,
                subdivision_type = %candidate,
                "no region geometry loaded; trying next subdivision type"
            );
            continue;
        }

        info!(
            country = %country,
            subdivision_type = %candidate,
            regions = regions.len(),
            skipped = skipped.len(),
            "regional geometry resolved"
        );
        return RegionalDataset::Resolved(Arc::new(RegionalCollection {
            country: country.clone(),
            subdivision_type: candidate.clone(),
            regions,
            skipped,
            features: Arc::new(features),
        }));
    }

    info!(country = %country, "no regional geometry available");
    RegionalDataset::Unavailable
}

async fn fetch_manifest(
    source: &dyn GeoJsonSource,
    country: &CountryCode,
    candidate: &str,
) -> Option<RegionManifest> {
    let path = manifest_path(country, candidate);
    let bytes = match source.fetch(&path).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!(country = %country, subdivision_type = %candidate, "no manifest");
            return None;
        }
        Err(e) => {
            warn!(country = %country, subdivision_type = %candidate, error = %e, "manifest request failed");
            return None;
        }
    };

    match RegionManifest::from_json_slice(&bytes) {
        Ok(m) if m.is_empty() => {
            debug!(country = %country, subdivision_type = %candidate, "empty manifest");
            None
        }
        Ok(m) => Some(m),
        Err(e) => {
            warn!(country = %country, subdivision_type = %candidate, error = %e, "unreadable manifest");
            None
        }
    }
}

fn normalize_region_properties(
    props: &mut serde_json::Map<String, Value>,
    region: &str,
    subdivision_type: &str,
) {
    if !props.get(CODE_PROPERTY).is_some_and(Value::is_string) {
        props.insert(CODE_PROPERTY.to_string(), Value::String(region.to_string()));
    }
    if !props.get(NAME_PROPERTY).is_some_and(Value::is_string) {
        props.insert(NAME_PROPERTY.to_string(), Value::String(region.to_string()));
    }
    props.insert(
        REGION_TYPE_PROPERTY.to_string(),
        Value::String(subdivision_type.to_string()),
    );
}

#[cfg(test)]
mod tests {
    use super::{ProberConfig, RegionalDataProber, RegionalDataset};
    use crate::cache::SlotState;
    use crate::source::{StaticGeoJsonSource, manifest_path, region_path};
    use foundation::CountryCode;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    type Fields = BTreeMap<String, String>;

    /// Keeps the fields of every WARN event.
    #[derive(Clone, Default)]
    struct Warnings(Arc<Mutex<Vec<Fields>>>);

    impl Warnings {
        fn mentioning(&self, field: &str, value: &str) -> usize {
            let events = self.0.lock().expect("warnings");
            events
                .iter()
                .filter(|f| f.get(field).map(String::as_str) == Some(value))
                .count()
        }
    }

    struct FieldVisitor<'a>(&'a mut Fields);

    impl Visit for FieldVisitor<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{value:?}"));
        }

        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }
    }

    impl<S: Subscriber> Layer<S> for Warnings {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() != Level::WARN {
                return;
            }
            let mut fields = Fields::new();
            event.record(&mut FieldVisitor(&mut fields));
            self.0.lock().expect("warnings").push(fields);
        }
    }

    fn region(code: &str, x: f64) -> serde_json::Value {
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "name": format!("Region {code}") },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[x, 0.0], [x + 1.0, 0.0], [x + 1.0, 1.0], [x, 1.0], [x, 0.0]]]
                }
            }]
        })
    }

    fn abc_source(country: &CountryCode, ty: &str) -> StaticGeoJsonSource {
        let mut src = StaticGeoJsonSource::new();
        src.insert_json(manifest_path(country, ty), &json!(["A", "B", "C"]))
            .insert_json(region_path(country, ty, "A"), &region("A", 0.0))
            .fail(region_path(country, ty, "B"))
            .insert_json(region_path(country, ty, "C"), &region("C", 2.0));
        src
    }

    #[tokio::test]
    async fn failed_region_is_dropped_not_the_candidate() {
        let jp = CountryCode::new("JP");
        let src = Rc::new(abc_source(&jp, "prefectures"));
        let prober = RegionalDataProber::new(src.clone(), ProberConfig::default());
        let warnings = Warnings::default();
        let _log = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(warnings.clone()),
        );

        let ds = prober.probe(&jp).await;
        let collection = ds.collection().expect("resolved");
        assert_eq!(warnings.mentioning("region", "B"), 1);
        assert_eq!(warnings.mentioning("region", "A"), 0);
        assert_eq!(warnings.mentioning("region", "C"), 0);
        assert_eq!(collection.subdivision_type, "prefectures");
        assert_eq!(collection.regions, vec!["A".to_string(), "C".to_string()]);
        assert_eq!(collection.skipped.len(), 1);
        assert_eq!(collection.skipped[0].region, "B");

        let codes: Vec<&str> = collection
            .features
            .features
            .iter()
            .filter_map(|f| f.property_str("code"))
            .collect();
        assert_eq!(codes, vec!["A", "C"]);
        assert_eq!(
            collection.features.features[0].property_str("region_type"),
            Some("prefectures")
        );
    }

    #[tokio::test]
    async fn candidates_are_tried_in_order() {
        let jp = CountryCode::new("JP");
        let src = Rc::new(abc_source(&jp, "prefectures"));
        let prober = RegionalDataProber::new(src.clone(), ProberConfig::default());
        prober.probe(&jp).await;

        let manifests: Vec<String> = src
            .requests()
            .into_iter()
            .filter(|p| p.ends_with("manifest.json"))
            .collect();
        assert_eq!(
            manifests,
            vec![
                "geojson/JP/states/manifest.json".to_string(),
                "geojson/JP/provinces/manifest.json".to_string(),
                "geojson/JP/regions/manifest.json".to_string(),
                "geojson/JP/prefectures/manifest.json".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn candidate_without_loadable_regions_falls_through() {
        let de = CountryCode::new("DE");
        let mut src = StaticGeoJsonSource::new();
        src.insert_json(manifest_path(&de, "states"), &json!(["X"]))
            .fail(region_path(&de, "states", "X"))
            .fail(manifest_path(&de, "provinces"))
            .insert_json(manifest_path(&de, "regions"), &json!({ "regions": ["BY"] }))
            .insert_json(region_path(&de, "regions", "BY"), &region("BY", 11.0));

        let prober = RegionalDataProber::new(Rc::new(src), ProberConfig::default());
        let ds = prober.probe(&de).await;
        assert_eq!(ds.collection().expect("resolved").subdivision_type, "regions");
    }

    #[tokio::test]
    async fn exhausted_candidates_resolve_to_unavailable() {
        let xx = CountryCode::new("XX");
        let mut src = StaticGeoJsonSource::new();
        src.insert(manifest_path(&xx, "states"), "[]")
            .insert(manifest_path(&xx, "provinces"), "not json")
            .fail(manifest_path(&xx, "regions"));

        let prober = RegionalDataProber::new(Rc::new(src), ProberConfig::default());
        assert_eq!(prober.probe(&xx).await, RegionalDataset::Unavailable);
        assert_eq!(prober.cached(&xx), Some(RegionalDataset::Unavailable));
    }

    #[tokio::test]
    async fn concurrent_probes_share_one_network_pass() {
        let jp = CountryCode::new("JP");
        let src = Rc::new(abc_source(&jp, "prefectures"));
        let prober = RegionalDataProber::new(src.clone(), ProberConfig::default());

        let first = prober.probe(&jp);
        let second = prober.probe(&jp);
        assert_eq!(prober.cache_state(&jp), Some(SlotState::InFlight));

        let (a, b) = futures_util::future::join(first, second).await;
        assert_eq!(a, b);
        assert_eq!(src.request_count(&manifest_path(&jp, "prefectures")), 1);
        assert_eq!(prober.cache_state(&jp), Some(SlotState::Resident));

        let again = prober.probe(&jp).await;
        assert_eq!(again, a);
        assert_eq!(src.request_count(&region_path(&jp, "prefectures", "A")), 1);

        let stats = prober.cache_stats();
        assert_eq!((stats.misses, stats.joins, stats.hits), (1, 1, 1));
    }
}
