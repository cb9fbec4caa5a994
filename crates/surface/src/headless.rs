//! In-memory [`MapEngine`] used by tests and the CLI.
//!
//! It keeps the same bookkeeping a real engine does (style lifecycle,
//! sources, ordered layers) and answers rendered-feature queries by
//! projecting features through the current camera. Style loads either
//! complete immediately or wait for [`HeadlessEngine::complete_style_loads`].

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

use formats::{FeatureCollection, Geometry};
use foundation::math::{project, unproject};
use foundation::{Camera, ScreenPoint, Viewport};
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use layers::{Expr, LayerSpec, Paint, SourceData, SourceSpec};
use tokio::sync::oneshot;
use tracing::debug;

use crate::controller::{EngineLibrary, EngineLoader, SurfaceOptions};
use crate::engine::{Cursor, EngineError, MapEngine, RenderedFeature, StyleLoad};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum StyleLoadMode {
    #[default]
    Immediate,
    /// Loads stay pending until `complete_style_loads` is called.
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    SetStyle(String),
    AddSource(String),
    SetSourceData(String),
    RemoveSource(String),
    AddLayer { id: String, before: Option<String> },
    RemoveLayer(String),
    SetFilter(String),
    SetPaint(String),
    JumpTo(Camera),
    FlyTo(Camera),
    SetCursor(Cursor),
    Remove,
}

type PendingLoad = (String, oneshot::Sender<Result<(), EngineError>>);

#[derive(Default)]
struct HeadlessState {
    mode: StyleLoadMode,
    container: Option<String>,
    viewport: Viewport,
    camera: Camera,
    cursor: Cursor,
    style_url: Option<String>,
    style_loaded: bool,
    pending: Vec<PendingLoad>,
    failing_styles: BTreeSet<String>,
    rejected_layers: BTreeSet<String>,
    url_data: BTreeMap<String, Arc<FeatureCollection>>,
    sources: BTreeMap<String, Arc<FeatureCollection>>,
    layers: Vec<LayerSpec>,
    ops: Vec<EngineOp>,
    removals: usize,
}

impl HeadlessState {
    fn require_style(&self) -> Result<(), EngineError> {
        if self.removals > 0 {
            return Err(EngineError::Destroyed);
        }
        if !self.style_loaded {
            return Err(EngineError::StyleNotReady);
        }
        Ok(())
    }

    fn layer_index(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    fn resolve(&self, data: &SourceData) -> Arc<FeatureCollection> {
        match data {
            SourceData::Features(fc) => Arc::clone(fc),
            SourceData::Url(url) => match self.url_data.get(url) {
                Some(fc) => Arc::clone(fc),
                None => {
                    debug!(%url, "no data registered for url; source is empty");
                    Arc::new(FeatureCollection::default())
                }
            },
        }
    }
}

/// Cheaply cloneable handle; clones share one engine.
#[derive(Clone, Default)]
pub struct HeadlessEngine {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessEngine {
    pub fn new(mode: StyleLoadMode) -> Self {
        let engine = Self::default();
        engine.set_mode(mode);
        engine
    }

    pub fn set_mode(&self, mode: StyleLoadMode) {
        self.state.borrow_mut().mode = mode;
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.state.borrow_mut().viewport = viewport;
    }

    pub fn container(&self) -> Option<String> {
        self.state.borrow().container.clone()
    }

    /// Data served for `SourceData::Url(url)` sources.
    pub fn register_url(&self, url: impl Into<String>, data: FeatureCollection) {
        self.state
            .borrow_mut()
            .url_data
            .insert(url.into(), Arc::new(data));
    }

    pub fn fail_style(&self, url: impl Into<String>) {
        self.state.borrow_mut().failing_styles.insert(url.into());
    }

    /// `add_layer` for this id fails with [`EngineError::Rejected`].
    pub fn reject_layer(&self, id: impl Into<String>) {
        self.state.borrow_mut().rejected_layers.insert(id.into());
    }

    /// Resolves every pending style load; returns how many were pending.
    pub fn complete_style_loads(&self) -> usize {
        let pending = {
            let mut state = self.state.borrow_mut();
            let pending = std::mem::take(&mut state.pending);
            if !pending.is_empty() {
                state.style_loaded = true;
            }
            pending
        };
        let count = pending.len();
        for (_, tx) in pending {
            let _ = tx.send(Ok(()));
        }
        count
    }

    pub fn pending_style_loads(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn ops(&self) -> Vec<EngineOp> {
        self.state.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    pub fn cursor(&self) -> Cursor {
        self.state.borrow().cursor
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.state.borrow().sources.keys().cloned().collect()
    }

    pub fn source_data(&self, id: &str) -> Option<Arc<FeatureCollection>> {
        self.state.borrow().sources.get(id).cloned()
    }

    pub fn layer(&self, id: &str) -> Option<LayerSpec> {
        let state = self.state.borrow();
        state.layer_index(id).map(|i| state.layers[i].clone())
    }

    pub fn is_removed(&self) -> bool {
        self.state.borrow().removals > 0
    }

    pub fn remove_count(&self) -> usize {
        self.state.borrow().removals
    }
}

impl std::fmt::Debug for HeadlessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("HeadlessEngine")
            .field("style_url", &state.style_url)
            .field("style_loaded", &state.style_loaded)
            .field("sources", &state.sources.keys().collect::<Vec<_>>())
            .field("layers", &state.layers.iter().map(LayerSpec::id).collect::<Vec<_>>())
            .finish()
    }
}

fn hits_geometry(
    geometry: &Geometry,
    paint: &Paint,
    point: ScreenPoint,
    camera: &Camera,
    viewport: Viewport,
) -> bool {
    match paint {
        Paint::Fill { .. } => geometry.contains(unproject(point, camera, viewport)),
        Paint::Circle {
            radius,
            stroke_width,
            ..
        } => {
            let reach = f64::from(*radius + *stroke_width);
            geometry
                .points()
                .into_iter()
                .any(|p| project(p, camera, viewport).distance(point) <= reach)
        }
        Paint::Line { .. } => false,
    }
}

impl MapEngine for HeadlessEngine {
    fn set_style(&mut self, url: &str) -> StyleLoad {
        let mut state = self.state.borrow_mut();
        if state.removals > 0 {
            return futures_util::future::ready(Err(EngineError::Destroyed)).boxed_local();
        }
        state.ops.push(EngineOp::SetStyle(url.to_string()));
        state.sources.clear();
        state.layers.clear();
        state.style_url = Some(url.to_string());
        state.style_loaded = false;

        for (old, tx) in std::mem::take(&mut state.pending) {
            let _ = tx.send(Err(EngineError::StyleSuperseded { url: old }));
        }

        if state.failing_styles.contains(url) {
            return futures_util::future::ready(Err(EngineError::StyleLoad {
                url: url.to_string(),
                message: "style request failed".to_string(),
            }))
            .boxed_local();
        }

        match state.mode {
            StyleLoadMode::Immediate => {
                state.style_loaded = true;
                futures_util::future::ready(Ok(())).boxed_local()
            }
            StyleLoadMode::Manual => {
                let (tx, rx) = oneshot::channel();
                state.pending.push((url.to_string(), tx));
                async move { rx.await.unwrap_or(Err(EngineError::Destroyed)) }.boxed_local()
            }
        }
    }

    fn style_url(&self) -> Option<String> {
        self.state.borrow().style_url.clone()
    }

    fn is_style_loaded(&self) -> bool {
        let state = self.state.borrow();
        state.style_loaded && state.removals == 0
    }

    fn add_source(&mut self, spec: &SourceSpec) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.require_style()?;
        let id = spec.id();
        if state.sources.contains_key(&id) {
            return Err(EngineError::DuplicateSource(id));
        }
        let data = state.resolve(&spec.data);
        state.sources.insert(id.clone(), data);
        state.ops.push(EngineOp::AddSource(id));
        Ok(())
    }

    fn set_source_data(&mut self, id: &str, data: &SourceData) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.require_style()?;
        if !state.sources.contains_key(id) {
            return Err(EngineError::UnknownSource(id.to_string()));
        }
        let data = state.resolve(data);
        state.sources.insert(id.to_string(), data);
        state.ops.push(EngineOp::SetSourceData(id.to_string()));
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.require_style()?;
        if let Some(layer) = state.layers.iter().find(|l| l.source().id() == id) {
            return Err(EngineError::SourceInUse {
                source: id.to_string(),
                layer: layer.id(),
            });
        }
        if state.sources.remove(id).is_none() {
            return Err(EngineError::UnknownSource(id.to_string()));
        }
        state.ops.push(EngineOp::RemoveSource(id.to_string()));
        Ok(())
    }

    fn has_source(&self, id: &str) -> bool {
        self.state.borrow().sources.contains_key(id)
    }

    fn add_layer(&mut self, spec: &LayerSpec, before: Option<&str>) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.require_style()?;
        let id = spec.id();
        if state.rejected_layers.contains(&id) {
            return Err(EngineError::Rejected {
                id,
                message: "layer rejected by engine".to_string(),
            });
        }
        if state.layer_index(&id).is_some() {
            return Err(EngineError::DuplicateLayer(id));
        }
        let source = spec.source().id();
        if !state.sources.contains_key(&source) {
            return Err(EngineError::UnknownSource(source));
        }
        let at = match before {
            Some(b) => state
                .layer_index(b)
                .ok_or_else(|| EngineError::UnknownLayer(b.to_string()))?,
            None => state.layers.len(),
        };
        state.layers.insert(at, spec.clone());
        state.ops.push(EngineOp::AddLayer {
            id,
            before: before.map(str::to_string),
        });
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.require_style()?;
        let i = state
            .layer_index(id)
            .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))?;
        state.layers.remove(i);
        state.ops.push(EngineOp::RemoveLayer(id.to_string()));
        Ok(())
    }

    fn set_filter(&mut self, id: &str, filter: Option<&Expr>) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.require_style()?;
        let i = state
            .layer_index(id)
            .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))?;
        state.layers[i].filter = filter.cloned();
        state.ops.push(EngineOp::SetFilter(id.to_string()));
        Ok(())
    }

    fn set_paint(&mut self, id: &str, paint: &Paint) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.require_style()?;
        let i = state
            .layer_index(id)
            .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))?;
        if state.layers[i].paint.layer_type() != paint.layer_type() {
            return Err(EngineError::Rejected {
                id: id.to_string(),
                message: format!(
                    "cannot change {} layer to {}",
                    state.layers[i].paint.layer_type(),
                    paint.layer_type()
                ),
            });
        }
        state.layers[i].paint = paint.clone();
        state.ops.push(EngineOp::SetPaint(id.to_string()));
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.state.borrow().layer_index(id).is_some()
    }

    fn layer_ids(&self) -> Vec<String> {
        self.state.borrow().layers.iter().map(LayerSpec::id).collect()
    }

    fn query_rendered_features(
        &self,
        point: ScreenPoint,
        layer_ids: &[String],
    ) -> Result<Vec<RenderedFeature>, EngineError> {
        let state = self.state.borrow();
        state.require_style()?;

        let mut out = Vec::new();
        for layer in state.layers.iter().rev() {
            let id = layer.id();
            if !layer_ids.contains(&id) {
                continue;
            }
            let Some(features) = state.sources.get(&layer.source().id()) else {
                continue;
            };
            // Later features draw on top of earlier ones.
            for feature in features.features.iter().rev() {
                let Some(geometry) = &feature.geometry else {
                    continue;
                };
                if layer
                    .filter
                    .as_ref()
                    .is_some_and(|f| !f.evaluate(&feature.properties))
                {
                    continue;
                }
                if hits_geometry(geometry, &layer.paint, point, &state.camera, state.viewport) {
                    out.push(RenderedFeature {
                        layer_id: id.clone(),
                        id: feature.id.clone(),
                        properties: feature.properties.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    fn camera(&self) -> Camera {
        self.state.borrow().camera
    }

    fn jump_to(&mut self, camera: Camera) {
        let mut state = self.state.borrow_mut();
        state.camera = camera;
        state.ops.push(EngineOp::JumpTo(camera));
    }

    fn fly_to(&mut self, camera: Camera) {
        // No animation: the flight lands immediately.
        let mut state = self.state.borrow_mut();
        state.camera = camera;
        state.ops.push(EngineOp::FlyTo(camera));
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        let mut state = self.state.borrow_mut();
        if state.cursor != cursor {
            state.cursor = cursor;
            state.ops.push(EngineOp::SetCursor(cursor));
        }
    }

    fn remove(&mut self) {
        let pending = {
            let mut state = self.state.borrow_mut();
            state.removals += 1;
            if state.removals > 1 {
                return;
            }
            state.sources.clear();
            state.layers.clear();
            state.style_loaded = false;
            state.ops.push(EngineOp::Remove);
            std::mem::take(&mut state.pending)
        };
        for (_, tx) in pending {
            let _ = tx.send(Err(EngineError::Destroyed));
        }
    }
}

/// Library that hands out clones of one shared [`HeadlessEngine`].
#[derive(Debug, Clone)]
pub struct HeadlessLibrary {
    engine: HeadlessEngine,
}

impl EngineLibrary for HeadlessLibrary {
    fn create(&self, options: &SurfaceOptions) -> Result<Box<dyn MapEngine>, EngineError> {
        let mut engine = self.engine.clone();
        {
            let mut state = engine.state.borrow_mut();
            if state.removals > 0 {
                return Err(EngineError::Init("engine already removed".to_string()));
            }
            state.container = Some(options.container.clone());
            state.viewport = options.viewport;
        }
        engine.jump_to(options.camera());
        Ok(Box::new(engine))
    }
}

pub struct HeadlessLoader {
    engine: Option<HeadlessEngine>,
    failure: Option<String>,
    loads: Rc<Cell<usize>>,
}

impl HeadlessLoader {
    pub fn new(engine: HeadlessEngine) -> Self {
        Self {
            engine: Some(engine),
            failure: None,
            loads: Rc::new(Cell::new(0)),
        }
    }

    /// A loader whose library never becomes available.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            engine: None,
            failure: Some(message.into()),
            loads: Rc::new(Cell::new(0)),
        }
    }

    /// Shared counter of `load` invocations.
    pub fn load_count(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.loads)
    }
}

impl EngineLoader for HeadlessLoader {
    fn load(&self) -> LocalBoxFuture<'_, Result<Rc<dyn EngineLibrary>, EngineError>> {
        self.loads.set(self.loads.get() + 1);
        let result: Result<Rc<dyn EngineLibrary>, EngineError> = match (&self.engine, &self.failure) {
            (Some(engine), None) => Ok(Rc::new(HeadlessLibrary {
                engine: engine.clone(),
            })),
            (_, failure) => Err(EngineError::Init(
                failure.clone().unwrap_or_else(|| "no engine".to_string()),
            )),
        };
        futures_util::future::ready(result).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineOp, HeadlessEngine, StyleLoadMode};
    use crate::engine::{EngineError, MapEngine};
    use formats::{Feature, FeatureCollection, Geometry};
    use foundation::math::project;
    use foundation::{Camera, CountryCode, LngLat, Viewport};
    use layers::{
        Color, ColorRule, Expr, LayerKey, LayerKind, LayerSpec, Paint, SourceData, SourceKey,
        SourceKind, SourceSpec,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{Map, json};
    use std::sync::Arc;

    fn square(name: &str, x: f64, y: f64, size: f64) -> Feature {
        let mut props = Map::new();
        props.insert("name".to_string(), json!(name));
        Feature {
            id: None,
            properties: props,
            geometry: Some(Geometry::Polygon(vec![vec![
                LngLat::new(x, y),
                LngLat::new(x + size, y),
                LngLat::new(x + size, y + size),
                LngLat::new(x, y + size),
                LngLat::new(x, y),
            ]])),
        }
    }

    fn fill(kind: LayerKind, filter: Option<Expr>) -> LayerSpec {
        LayerSpec {
            key: LayerKey::global(kind),
            filter,
            paint: Paint::Fill {
                color: ColorRule::Fixed(Color::rgb(1, 2, 3)),
                opacity: 1.0,
            },
        }
    }

    fn countries() -> SourceSpec {
        SourceSpec {
            key: SourceKey::global(SourceKind::Countries),
            data: SourceData::Features(Arc::new(FeatureCollection::new(vec![
                square("Left", -20.0, -10.0, 10.0),
                square("Right", 10.0, -10.0, 10.0),
            ]))),
        }
    }

    #[tokio::test]
    async fn style_swap_discards_custom_layers() {
        let mut engine = HeadlessEngine::new(StyleLoadMode::Immediate);
        engine.set_style("a.json").await.expect("style");
        engine.add_source(&countries()).expect("source");
        engine.add_layer(&fill(LayerKind::CountryFill, None), None).expect("layer");

        let load = engine.set_style("b.json");
        assert!(engine.layer_ids().is_empty());
        assert!(!engine.has_source("countries"));
        load.await.expect("style");
        assert!(engine.is_style_loaded());
    }

    #[tokio::test]
    async fn mutations_before_style_load_fail() {
        let mut engine = HeadlessEngine::new(StyleLoadMode::Manual);
        let _load = engine.set_style("a.json");
        assert_eq!(engine.add_source(&countries()), Err(EngineError::StyleNotReady));
        assert_eq!(engine.pending_style_loads(), 1);
    }

    #[tokio::test]
    async fn layers_insert_before_and_sources_stay_while_used() {
        let mut engine = HeadlessEngine::new(StyleLoadMode::Immediate);
        engine.set_style("a.json").await.expect("style");
        engine.add_source(&countries()).expect("source");
        engine.add_layer(&fill(LayerKind::CountryFill, None), None).expect("fill");
        engine.add_layer(&fill(LayerKind::FocusedCountry, None), None).expect("focused");
        engine
            .add_layer(&fill(LayerKind::VisitedCountries, None), Some("countries-focused"))
            .expect("visited");

        assert_eq!(
            engine.layer_ids(),
            vec!["countries-fill", "countries-visited", "countries-focused"]
        );
        assert!(matches!(
            engine.remove_source("countries"),
            Err(EngineError::SourceInUse { .. })
        ));
        assert_eq!(
            engine.set_filter("nope", None),
            Err(EngineError::UnknownLayer("nope".to_string()))
        );
        let ops = engine.ops();
        assert_eq!(
            ops.last(),
            Some(&EngineOp::AddLayer {
                id: "countries-visited".to_string(),
                before: Some("countries-focused".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn queries_respect_filters_and_draw_order() {
        let mut engine = HeadlessEngine::new(StyleLoadMode::Immediate);
        engine.set_viewport(Viewport::new(800.0, 600.0));
        engine.jump_to(Camera::new(LngLat::new(0.0, 0.0), 2.0));
        engine.set_style("a.json").await.expect("style");
        engine.add_source(&countries()).expect("source");
        engine.add_layer(&fill(LayerKind::CountryFill, None), None).expect("fill");
        engine
            .add_layer(
                &fill(LayerKind::VisitedCountries, Some(Expr::is_in("name", ["Right"]))),
                None,
            )
            .expect("visited");

        let camera = engine.camera();
        let viewport = Viewport::new(800.0, 600.0);
        let ids = vec!["countries-fill".to_string(), "countries-visited".to_string()];

        let right = project(LngLat::new(15.0, -5.0), &camera, viewport);
        let hits = engine.query_rendered_features(right, &ids).expect("query");
        let layers: Vec<&str> = hits.iter().map(|h| h.layer_id.as_str()).collect();
        assert_eq!(layers, vec!["countries-visited", "countries-fill"]);

        let left = project(LngLat::new(-15.0, -5.0), &camera, viewport);
        let hits = engine.query_rendered_features(left, &ids).expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].property_str("name"), Some("Left"));

        let ocean = project(LngLat::new(0.0, 40.0), &camera, viewport);
        assert!(engine.query_rendered_features(ocean, &ids).expect("query").is_empty());
    }

    #[tokio::test]
    async fn circles_hit_within_radius() {
        let mut engine = HeadlessEngine::new(StyleLoadMode::Immediate);
        engine.set_style("a.json").await.expect("style");
        let site = Feature::point(LngLat::new(20.0, 10.0), Map::new());
        engine
            .add_source(&SourceSpec {
                key: SourceKey::global(SourceKind::HeritageSites),
                data: SourceData::Features(Arc::new(FeatureCollection::new(vec![site]))),
            })
            .expect("source");
        engine
            .add_layer(
                &LayerSpec {
                    key: LayerKey::global(LayerKind::HeritageVisited),
                    filter: None,
                    paint: Paint::Circle {
                        color: ColorRule::Fixed(Color::rgb(0, 0, 0)),
                        radius: 5.0,
                        stroke_color: Color::rgb(0, 0, 0),
                        stroke_width: 1.0,
                        opacity: 1.0,
                    },
                },
                None,
            )
            .expect("layer");

        let centre = project(LngLat::new(20.0, 10.0), &engine.camera(), Viewport::default());
        let ids = vec!["heritage-visited".to_string()];
        let near = foundation::ScreenPoint::new(centre.x + 4.0, centre.y);
        let far = foundation::ScreenPoint::new(centre.x + 12.0, centre.y);
        assert_eq!(engine.query_rendered_features(near, &ids).map(|h| h.len()), Ok(1));
        assert_eq!(engine.query_rendered_features(far, &ids).map(|h| h.len()), Ok(0));
    }

    #[test]
    fn url_sources_serve_registered_data() {
        let engine = HeadlessEngine::new(StyleLoadMode::Immediate);
        engine.register_url("countries.geojson", FeatureCollection::new(vec![square("A", 0.0, 0.0, 1.0)]));
        let mut e = engine.clone();
        futures_util::FutureExt::now_or_never(e.set_style("a.json"))
            .expect("immediate")
            .expect("style");
        e.add_source(&SourceSpec {
            key: SourceKey::for_country(SourceKind::Subdivisions, CountryCode::new("JP")),
            data: SourceData::Url("countries.geojson".to_string()),
        })
        .expect("source");
        assert_eq!(engine.source_data("subdivisions:JP").map(|fc| fc.len()), Some(1));
    }
}
