use foundation::ScreenPoint;
use layers::{
    CATEGORY_PROPERTY, Color, ColorRule, HitCategory, LayerGraph, LayerKind, NAME_PROPERTY,
    SITE_ID_PROPERTY, VISITED_PROPERTY,
};
use scene::VisitationState;
use serde_json::Value;
use streaming::CODE_PROPERTY;
use surface::{Cursor, MapEngine, RenderedFeature};
use tracing::debug;

/// Query order within each category: visited on top.
const HERITAGE_LAYERS: &[LayerKind] = &[LayerKind::HeritageVisited, LayerKind::HeritageUnvisited];
const SUBDIVISION_LAYERS: &[LayerKind] = &[LayerKind::VisitedSubdivisions, LayerKind::SubdivisionFill];
const COUNTRY_LAYERS: &[LayerKind] = &[
    LayerKind::FocusedCountry,
    LayerKind::VisitedCountries,
    LayerKind::CountryFill,
];

#[derive(Debug, Clone, PartialEq)]
struct HitGroup {
    category: HitCategory,
    layer_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tooltip {
    pub category: HitCategory,
    /// Site id, subdivision code or country name.
    pub id: Option<String>,
    pub name: String,
    pub visited: bool,
    /// Category color; heritage sites only.
    pub swatch: Option<Color>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoiToggled {
    pub site_id: String,
}

/// Resolves pointer positions against the live layers with the fixed
/// precedence heritage site > subdivision > country.
#[derive(Debug, Default)]
pub struct HitTestRouter {
    groups: Vec<HitGroup>,
    visitation: VisitationState,
    tooltip: Option<Tooltip>,
}

impl HitTestRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-derives the query groups from the live graph. Groups without any
    /// live layer are left out.
    pub fn bind(&mut self, graph: &LayerGraph, visitation: &VisitationState) {
        let mut groups = Vec::new();
        for (category, kinds) in [
            (HitCategory::Heritage, HERITAGE_LAYERS),
            (HitCategory::Subdivision, SUBDIVISION_LAYERS),
            (HitCategory::Country, COUNTRY_LAYERS),
        ] {
            let layer_ids: Vec<String> = kinds
                .iter()
                .filter_map(|k| graph.layer_by_kind(*k).map(|l| l.id()))
                .collect();
            if !layer_ids.is_empty() {
                groups.push(HitGroup {
                    category,
                    layer_ids,
                });
            }
        }
        self.groups = groups;
        self.visitation = visitation.clone();
    }

    /// Forgets all groups, e.g. while a style swap has the layers torn down.
    pub fn unbind(&mut self) {
        self.groups.clear();
        self.tooltip = None;
    }

    pub fn tooltip(&self) -> Option<&Tooltip> {
        self.tooltip.as_ref()
    }

    pub fn on_pointer_move(
        &mut self,
        engine: &mut dyn MapEngine,
        point: ScreenPoint,
    ) -> Option<&Tooltip> {
        let hit = self.groups.iter().find_map(|group| {
            query(&*engine, point, &group.layer_ids)
                .into_iter()
                .next()
                .map(|f| (group.category, f))
        });

        self.tooltip = hit.map(|(category, feature)| self.describe(category, &feature));
        engine.set_cursor(if self.tooltip.is_some() {
            Cursor::Pointer
        } else {
            Cursor::Default
        });
        self.tooltip.as_ref()
    }

    /// Only heritage sites react to clicks; the topmost one wins.
    pub fn on_click(&self, engine: &dyn MapEngine, point: ScreenPoint) -> Option<PoiToggled> {
        let group = self
            .groups
            .iter()
            .find(|g| g.category == HitCategory::Heritage)?;
        query(engine, point, &group.layer_ids)
            .into_iter()
            .find_map(|f| site_id(&f))
            .map(|site_id| PoiToggled { site_id })
    }

    fn describe(&self, category: HitCategory, feature: &RenderedFeature) -> Tooltip {
        let name = feature.property_str(NAME_PROPERTY).unwrap_or_default().to_string();
        match category {
            HitCategory::Heritage => Tooltip {
                category,
                id: site_id(feature),
                visited: feature.properties.get(VISITED_PROPERTY) == Some(&Value::Bool(true)),
                swatch: Some(ColorRule::site_categories(CATEGORY_PROPERTY).resolve(&feature.properties)),
                name,
            },
            HitCategory::Subdivision => {
                let code = feature.property_str(CODE_PROPERTY).map(str::to_string);
                Tooltip {
                    category,
                    visited: code
                        .as_deref()
                        .is_some_and(|c| self.visitation.is_subdivision_visited(c)),
                    id: code,
                    swatch: None,
                    name,
                }
            }
            HitCategory::Country => Tooltip {
                category,
                id: Some(name.clone()),
                visited: self.visitation.is_country_visited(&name),
                swatch: None,
                name,
            },
        }
    }
}

fn query(engine: &dyn MapEngine, point: ScreenPoint, layer_ids: &[String]) -> Vec<RenderedFeature> {
    match engine.query_rendered_features(point, layer_ids) {
        Ok(features) => features,
        Err(e) => {
            debug!(error = %e, "feature query failed; treating as miss");
            Vec::new()
        }
    }
}

fn site_id(feature: &RenderedFeature) -> Option<String> {
    feature
        .id
        .clone()
        .or_else(|| feature.property_str(SITE_ID_PROPERTY).map(str::to_string))
}
