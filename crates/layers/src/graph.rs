//! The desired layer graph as a pure function of the map inputs.
//!
//! Building never touches an engine; the view's reconciler diffs two graphs
//! and applies the difference. Layer order in [`LayerGraph::layers`] is draw
//! order, which also fixes hit-test precedence for overlapping geometry.

use std::sync::Arc;

use formats::{Feature, FeatureCollection};
use scene::{Country, HeritageSite, VisitationState};
use serde_json::{Map, Value};
use streaming::{CODE_PROPERTY, RegionalDataset};

use crate::expr::Expr;
use crate::keys::{LayerKey, LayerKind, SourceKey, SourceKind};
use crate::spec::{LayerSpec, SourceData, SourceSpec};
use crate::symbology::{ColorRule, Paint, Theme, VISITED_COLOR, palette_for};

pub const NAME_PROPERTY: &str = "name";
pub const SITE_ID_PROPERTY: &str = "id";
pub const CATEGORY_PROPERTY: &str = "category";
pub const VISITED_PROPERTY: &str = "visited";

#[derive(Debug, Clone, Copy)]
pub struct GraphInputs<'a> {
    pub visitation: &'a VisitationState,
    pub heritage_sites: &'a [HeritageSite],
    pub focused: Option<&'a Country>,
    /// Regional geometry for the focused country, if it has been probed.
    pub regional: Option<&'a RegionalDataset>,
    pub show_only_visited_sites: bool,
    pub theme: Theme,
    /// Base country geometry, loaded by the engine from a static file.
    pub countries_url: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerGraph {
    pub sources: Vec<SourceSpec>,
    pub layers: Vec<LayerSpec>,
}

impl LayerGraph {
    pub fn build(inputs: &GraphInputs<'_>) -> Self {
        let palette = palette_for(inputs.theme);
        let visited = inputs.visitation;
        let mut graph = LayerGraph::default();

        graph.sources.push(SourceSpec {
            key: SourceKey::global(SourceKind::Countries),
            data: SourceData::Url(inputs.countries_url.to_string()),
        });
        graph.layers.push(LayerSpec {
            key: LayerKey::global(LayerKind::CountryFill),
            filter: None,
            paint: Paint::Fill {
                color: ColorRule::Fixed(palette.country_fill),
                opacity: palette.country_fill_opacity,
            },
        });
        graph.layers.push(LayerSpec {
            key: LayerKey::global(LayerKind::VisitedCountries),
            filter: Some(Expr::is_in(NAME_PROPERTY, visited.countries.iter().cloned())),
            paint: Paint::Fill {
                color: ColorRule::Fixed(palette.visited_fill),
                opacity: palette.visited_opacity,
            },
        });
        if let Some(focused) = inputs.focused.filter(|c| !visited.is_country_visited(&c.name)) {
            graph.layers.push(LayerSpec {
                key: LayerKey::global(LayerKind::FocusedCountry),
                filter: Some(Expr::equals(NAME_PROPERTY, focused.name.clone())),
                paint: Paint::Fill {
                    color: ColorRule::Fixed(palette.focused_fill),
                    opacity: palette.visited_opacity,
                },
            });
        }
        graph.layers.push(LayerSpec {
            key: LayerKey::global(LayerKind::CountryBorder),
            filter: None,
            paint: Paint::Line {
                color: palette.country_border,
                width: 0.8,
                opacity: 1.0,
            },
        });

        if let Some(collection) = inputs.regional.and_then(RegionalDataset::collection) {
            let cc = collection.country.clone();
            graph.sources.push(SourceSpec {
                key: SourceKey::for_country(SourceKind::Subdivisions, cc.clone()),
                data: SourceData::Features(Arc::clone(&collection.features)),
            });
            graph.layers.push(LayerSpec {
                key: LayerKey::for_country(LayerKind::SubdivisionFill, cc.clone()),
                filter: None,
                paint: Paint::Fill {
                    color: ColorRule::Fixed(palette.subdivision_fill),
                    opacity: palette.country_fill_opacity,
                },
            });
            // An empty visited set drops the overlay entirely; the source stays.
            if !visited.subdivisions.is_empty() {
                graph.layers.push(LayerSpec {
                    key: LayerKey::for_country(LayerKind::VisitedSubdivisions, cc.clone()),
                    filter: Some(Expr::is_in(CODE_PROPERTY, visited.subdivisions.iter().cloned())),
                    paint: Paint::Fill {
                        color: ColorRule::Fixed(palette.visited_fill),
                        opacity: palette.visited_opacity,
                    },
                });
            }
            graph.layers.push(LayerSpec {
                key: LayerKey::for_country(LayerKind::SubdivisionBorder, cc),
                filter: None,
                paint: Paint::Line {
                    color: palette.subdivision_border,
                    width: 0.5,
                    opacity: 0.8,
                },
            });
        }

        graph.sources.push(SourceSpec {
            key: SourceKey::global(SourceKind::HeritageSites),
            data: SourceData::Features(Arc::new(heritage_features(inputs))),
        });
        if !inputs.show_only_visited_sites {
            graph.layers.push(LayerSpec {
                key: LayerKey::global(LayerKind::HeritageUnvisited),
                filter: Some(Expr::negate(Expr::truthy(VISITED_PROPERTY))),
                paint: Paint::Circle {
                    color: ColorRule::site_categories(CATEGORY_PROPERTY),
                    radius: 4.0,
                    stroke_color: palette.site_stroke,
                    stroke_width: 1.0,
                    opacity: 0.8,
                },
            });
        }
        graph.layers.push(LayerSpec {
            key: LayerKey::global(LayerKind::HeritageVisited),
            filter: Some(Expr::truthy(VISITED_PROPERTY)),
            paint: Paint::Circle {
                color: ColorRule::site_categories(CATEGORY_PROPERTY),
                radius: 6.0,
                stroke_color: VISITED_COLOR,
                stroke_width: 2.0,
                opacity: 1.0,
            },
        });

        graph
    }

    pub fn layer(&self, key: &LayerKey) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| &l.key == key)
    }

    pub fn layer_by_kind(&self, kind: LayerKind) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.key.kind == kind)
    }

    pub fn source(&self, key: &SourceKey) -> Option<&SourceSpec> {
        self.sources.iter().find(|s| &s.key == key)
    }

    pub fn has_layer(&self, key: &LayerKey) -> bool {
        self.layer(key).is_some()
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.layers.iter().map(LayerSpec::id).collect()
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(SourceSpec::id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty() && self.sources.is_empty()
    }
}

fn heritage_features(inputs: &GraphInputs<'_>) -> FeatureCollection {
    let features = inputs
        .heritage_sites
        .iter()
        .filter_map(|site| {
            let position = site.coordinates.filter(|p| p.is_finite())?;
            let visited = inputs.visitation.is_site_visited(&site.id);
            if inputs.show_only_visited_sites && !visited {
                return None;
            }
            let mut props = Map::new();
            props.insert(SITE_ID_PROPERTY.to_string(), Value::String(site.id.clone()));
            props.insert(NAME_PROPERTY.to_string(), Value::String(site.name.clone()));
            props.insert(
                CATEGORY_PROPERTY.to_string(),
                Value::String(site.category.as_str().to_string()),
            );
            props.insert(VISITED_PROPERTY.to_string(), Value::Bool(visited));
            let mut feature = Feature::point(position, props);
            feature.id = Some(site.id.clone());
            Some(feature)
        })
        .collect();
    FeatureCollection::new(features)
}

#[cfg(test)]
mod tests {
    use super::{GraphInputs, LayerGraph, VISITED_PROPERTY};
    use crate::keys::{LayerKey, LayerKind, SourceKey, SourceKind};
    use crate::spec::SourceData;
    use crate::symbology::{CULTURAL_COLOR, Theme};
    use formats::{Feature, FeatureCollection};
    use foundation::{CountryCode, LngLat};
    use pretty_assertions::assert_eq;
    use scene::{Country, HeritageSite, SiteCategory, VisitationState};
    use serde_json::{Map, Value, json};
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use streaming::{RegionalCollection, RegionalDataset};

    const COUNTRIES_URL: &str = "https://tiles.test/countries.geojson";

    fn props(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn inputs<'a>(visitation: &'a VisitationState, sites: &'a [HeritageSite]) -> GraphInputs<'a> {
        GraphInputs {
            visitation,
            heritage_sites: sites,
            focused: None,
            regional: None,
            show_only_visited_sites: false,
            theme: Theme::Dark,
            countries_url: COUNTRIES_URL,
        }
    }

    fn site(id: &str, lat: f64, lng: f64, category: &str) -> HeritageSite {
        HeritageSite {
            id: id.to_string(),
            name: format!("Site {id}"),
            coordinates: Some(LngLat::new(lng, lat)),
            category: SiteCategory::parse(category),
            country: None,
        }
    }

    fn japan_regions() -> RegionalDataset {
        let mut p = Map::new();
        p.insert("code".to_string(), json!("JP-13"));
        RegionalDataset::Resolved(Arc::new(RegionalCollection {
            country: CountryCode::new("JP"),
            subdivision_type: "prefectures".to_string(),
            regions: vec!["JP-13".to_string()],
            skipped: Vec::new(),
            features: Arc::new(FeatureCollection::new(vec![Feature::point(
                LngLat::new(139.7, 35.7),
                p,
            )])),
        }))
    }

    fn heritage_features(graph: &LayerGraph) -> Arc<FeatureCollection> {
        match graph.source(&SourceKey::global(SourceKind::HeritageSites)).map(|s| &s.data) {
            Some(SourceData::Features(fc)) => Arc::clone(fc),
            other => panic!("unexpected heritage source {other:?}"),
        }
    }

    #[test]
    fn visited_country_filter_matches_only_japan() {
        let visitation = VisitationState::new().with_countries(["Japan"]);
        let graph = LayerGraph::build(&inputs(&visitation, &[]));

        let layer = graph.layer_by_kind(LayerKind::VisitedCountries).expect("visited layer");
        let filter = layer.filter.as_ref().expect("filter");
        assert!(filter.evaluate(&props(json!({ "name": "Japan" }))));
        assert!(!filter.evaluate(&props(json!({ "name": "China" }))));
        assert!(graph.layer_by_kind(LayerKind::FocusedCountry).is_none());
    }

    #[test]
    fn visited_filter_set_equals_input_set() {
        let cases: [&[&str]; 3] = [&[], &["France"], &["Japan", "Peru", "Chile", "Côte d'Ivoire"]];
        for names in cases {
            let visitation = VisitationState::new().with_countries(names.iter().copied());
            let graph = LayerGraph::build(&inputs(&visitation, &[]));
            let filter = graph
                .layer_by_kind(LayerKind::VisitedCountries)
                .and_then(|l| l.filter.as_ref())
                .expect("filter");
            let expected: BTreeSet<String> = names.iter().map(|s| s.to_string()).collect();
            assert_eq!(filter.membership("name"), Some(&expected));
        }
    }

    #[test]
    fn unvisited_cultural_site_lands_in_unvisited_sublayer() {
        let visitation = VisitationState::new();
        let sites = vec![site("1", 10.0, 20.0, "cultural")];
        let graph = LayerGraph::build(&inputs(&visitation, &sites));

        let fc = heritage_features(&graph);
        assert_eq!(fc.len(), 1);
        let feature = &fc.features[0];
        assert_eq!(feature.properties.get(VISITED_PROPERTY), Some(&json!(false)));

        let unvisited = graph.layer_by_kind(LayerKind::HeritageUnvisited).expect("unvisited");
        let visited = graph.layer_by_kind(LayerKind::HeritageVisited).expect("visited");
        assert!(unvisited.filter.as_ref().is_some_and(|f| f.evaluate(&feature.properties)));
        assert!(!visited.filter.as_ref().is_some_and(|f| f.evaluate(&feature.properties)));
        match &unvisited.paint {
            crate::symbology::Paint::Circle { color, .. } => {
                assert_eq!(color.resolve(&feature.properties), CULTURAL_COLOR)
            }
            other => panic!("unexpected paint {other:?}"),
        }
    }

    #[test]
    fn show_only_visited_drops_sublayer_and_unvisited_points() {
        let visitation = VisitationState::new().with_heritage_sites(["2"]);
        let sites = vec![
            site("1", 10.0, 20.0, "cultural"),
            site("2", 11.0, 21.0, "natural"),
            HeritageSite {
                coordinates: None,
                ..site("3", 0.0, 0.0, "mixed")
            },
        ];
        let mut i = inputs(&visitation, &sites);
        i.show_only_visited_sites = true;
        let graph = LayerGraph::build(&i);

        assert!(graph.layer_by_kind(LayerKind::HeritageUnvisited).is_none());
        let ids: Vec<Option<String>> = heritage_features(&graph)
            .features
            .iter()
            .map(|f| f.id.clone())
            .collect();
        assert_eq!(ids, vec![Some("2".to_string())]);
    }

    #[test]
    fn focused_layer_exists_only_while_unvisited() {
        let japan = Country {
            code: CountryCode::new("JP"),
            name: "Japan".to_string(),
            coordinates: LngLat::new(138.0, 36.0),
        };
        let none = VisitationState::new();
        let mut i = inputs(&none, &[]);
        i.focused = Some(&japan);
        let graph = LayerGraph::build(&i);
        let focused = graph.layer_by_kind(LayerKind::FocusedCountry).expect("focused");
        assert!(focused.filter.as_ref().is_some_and(|f| f.evaluate(&props(json!({ "name": "Japan" })))));

        let visited = VisitationState::new().with_countries(["Japan"]);
        let mut i = inputs(&visited, &[]);
        i.focused = Some(&japan);
        assert!(LayerGraph::build(&i).layer_by_kind(LayerKind::FocusedCountry).is_none());
    }

    #[test]
    fn layers_follow_fixed_draw_order() {
        let japan = Country {
            code: CountryCode::new("JP"),
            name: "Japan".to_string(),
            coordinates: LngLat::new(138.0, 36.0),
        };
        let regional = japan_regions();
        let visitation = VisitationState::new().with_subdivisions(["JP-13"]);
        let mut i = inputs(&visitation, &[]);
        i.focused = Some(&japan);
        i.regional = Some(&regional);
        let graph = LayerGraph::build(&i);

        assert_eq!(
            graph.layer_ids(),
            vec![
                "countries-fill",
                "countries-visited",
                "countries-focused",
                "countries-border",
                "subdivisions-fill:JP",
                "subdivisions-visited:JP",
                "subdivisions-border:JP",
                "heritage-unvisited",
                "heritage-visited",
            ]
        );
        assert_eq!(graph.source_ids(), vec!["countries", "subdivisions:JP", "heritage-sites"]);
    }

    #[test]
    fn empty_visited_subdivisions_omit_overlay_but_keep_source() {
        let regional = japan_regions();
        let visitation = VisitationState::new();
        let mut i = inputs(&visitation, &[]);
        i.regional = Some(&regional);
        let graph = LayerGraph::build(&i);

        let jp = CountryCode::new("JP");
        assert!(!graph.has_layer(&LayerKey::for_country(LayerKind::VisitedSubdivisions, jp.clone())));
        assert!(graph.has_layer(&LayerKey::for_country(LayerKind::SubdivisionFill, jp.clone())));
        assert!(graph.source(&SourceKey::for_country(SourceKind::Subdivisions, jp)).is_some());
    }

    #[test]
    fn unavailable_regional_data_keeps_country_level_only() {
        let visitation = VisitationState::new();
        let mut i = inputs(&visitation, &[]);
        i.regional = Some(&RegionalDataset::Unavailable);
        let graph = LayerGraph::build(&i);
        assert!(graph.layer_by_kind(LayerKind::SubdivisionFill).is_none());
        assert_eq!(graph.sources.len(), 2);
    }

    #[test]
    fn build_is_deterministic_and_theme_sensitive() {
        let visitation = VisitationState::new().with_countries(["Peru"]);
        let sites = vec![site("7", -13.1, -72.5, "mixed")];
        let a = LayerGraph::build(&inputs(&visitation, &sites));
        let b = LayerGraph::build(&inputs(&visitation, &sites));
        assert_eq!(a, b);

        let mut light = inputs(&visitation, &sites);
        light.theme = Theme::Light;
        assert_ne!(LayerGraph::build(&light), a);
    }
}
