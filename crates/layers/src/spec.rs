use std::sync::Arc;

use formats::FeatureCollection;
use serde_json::{Value, json};

use crate::expr::Expr;
use crate::keys::{LayerKey, SourceKey};
use crate::symbology::Paint;

#[derive(Debug, Clone, PartialEq)]
pub enum SourceData {
    /// Static file the engine fetches itself.
    Url(String),
    Features(Arc<FeatureCollection>),
}

impl SourceData {
    pub fn to_json(&self) -> Value {
        match self {
            SourceData::Url(url) => json!({ "type": "geojson", "data": url }),
            SourceData::Features(fc) => json!({ "type": "geojson", "data": fc.to_geojson_value() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub key: SourceKey,
    pub data: SourceData,
}

impl SourceSpec {
    pub fn id(&self) -> String {
        self.key.id()
    }
}

/// One styled layer; its z-order is its position in the owning graph.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub key: LayerKey,
    pub filter: Option<Expr>,
    pub paint: Paint,
}

impl LayerSpec {
    pub fn id(&self) -> String {
        self.key.id()
    }

    pub fn source(&self) -> SourceKey {
        self.key.source()
    }

    pub fn to_json(&self) -> Value {
        let mut out = json!({
            "id": self.id(),
            "type": self.paint.layer_type(),
            "source": self.source().id(),
            "paint": self.paint.to_json(),
        });
        if let (Some(filter), Some(obj)) = (&self.filter, out.as_object_mut()) {
            obj.insert("filter".to_string(), filter.to_json());
        }
        out
    }
}
