//! Capability interface of the vector rendering engine.
//!
//! Everything the map core does to the engine goes through [`MapEngine`]:
//! style loading, source/layer mutation, rendered-feature queries and camera
//! moves. Ids are the strings produced by `layers::LayerKey::id`.

use foundation::{Camera, ScreenPoint};
use futures_util::future::LocalBoxFuture;
use layers::{Expr, LayerSpec, Paint, SourceData, SourceSpec};
use serde_json::{Map, Value};

/// Completes when the engine reports the requested style fully loaded.
pub type StyleLoad = LocalBoxFuture<'static, Result<(), EngineError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    Init(String),
    StyleLoad { url: String, message: String },
    /// A newer `set_style` replaced this load before it finished.
    StyleSuperseded { url: String },
    StyleNotReady,
    DuplicateSource(String),
    DuplicateLayer(String),
    UnknownSource(String),
    UnknownLayer(String),
    SourceInUse { source: String, layer: String },
    Rejected { id: String, message: String },
    Destroyed,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Init(msg) => write!(f, "engine init failed: {msg}"),
            EngineError::StyleLoad { url, message } => {
                write!(f, "style {url} failed to load: {message}")
            }
            EngineError::StyleSuperseded { url } => write!(f, "style {url} superseded"),
            EngineError::StyleNotReady => write!(f, "style not loaded"),
            EngineError::DuplicateSource(id) => write!(f, "source {id} already exists"),
            EngineError::DuplicateLayer(id) => write!(f, "layer {id} already exists"),
            EngineError::UnknownSource(id) => write!(f, "source {id} does not exist"),
            EngineError::UnknownLayer(id) => write!(f, "layer {id} does not exist"),
            EngineError::SourceInUse { source, layer } => {
                write!(f, "source {source} is still used by layer {layer}")
            }
            EngineError::Rejected { id, message } => write!(f, "{id} rejected: {message}"),
            EngineError::Destroyed => write!(f, "engine destroyed"),
        }
    }
}

impl std::error::Error for EngineError {}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Cursor {
    #[default]
    Default,
    Pointer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFeature {
    pub layer_id: String,
    pub id: Option<String>,
    pub properties: Map<String, Value>,
}

impl RenderedFeature {
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

pub trait MapEngine {
    /// Replaces the base style. Custom sources and layers are discarded
    /// immediately; the returned future completes once the new style loaded.
    fn set_style(&mut self, url: &str) -> StyleLoad;
    fn style_url(&self) -> Option<String>;
    fn is_style_loaded(&self) -> bool;

    fn add_source(&mut self, spec: &SourceSpec) -> Result<(), EngineError>;
    fn set_source_data(&mut self, id: &str, data: &SourceData) -> Result<(), EngineError>;
    fn remove_source(&mut self, id: &str) -> Result<(), EngineError>;
    fn has_source(&self, id: &str) -> bool;

    /// Inserts below `before` when given, otherwise on top.
    fn add_layer(&mut self, spec: &LayerSpec, before: Option<&str>) -> Result<(), EngineError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError>;
    fn set_filter(&mut self, id: &str, filter: Option<&Expr>) -> Result<(), EngineError>;
    fn set_paint(&mut self, id: &str, paint: &Paint) -> Result<(), EngineError>;
    fn has_layer(&self, id: &str) -> bool;
    /// Custom layers, bottom first.
    fn layer_ids(&self) -> Vec<String>;

    /// Features under `point` in the given layers, topmost first.
    fn query_rendered_features(
        &self,
        point: ScreenPoint,
        layer_ids: &[String],
    ) -> Result<Vec<RenderedFeature>, EngineError>;

    fn camera(&self) -> Camera;
    fn jump_to(&mut self, camera: Camera);
    fn fly_to(&mut self, camera: Camera);
    fn set_cursor(&mut self, cursor: Cursor);

    /// Releases every engine resource. Further calls are no-ops.
    fn remove(&mut self);
}
