//! Structured layer and source identifiers.
//!
//! Engine ids are strings; everything above the engine works with
//! `(kind, country)` keys and converts through one lookup table, so ids for
//! different countries can never collide and always parse back.

use foundation::CountryCode;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    Countries,
    Subdivisions,
    HeritageSites,
}

/// Layer kinds, declared in draw order (bottom first).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerKind {
    CountryFill,
    VisitedCountries,
    FocusedCountry,
    CountryBorder,
    SubdivisionFill,
    VisitedSubdivisions,
    SubdivisionBorder,
    HeritageUnvisited,
    HeritageVisited,
}

/// What a pointer over a layer's features is pointing at.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HitCategory {
    Heritage,
    Subdivision,
    Country,
}

struct LayerEntry {
    kind: LayerKind,
    id: &'static str,
    source: SourceKind,
    /// `None` for decoration layers (borders) that never take part in hit testing.
    hit: Option<HitCategory>,
}

#[rustfmt::skip]
const LAYER_TABLE: &[LayerEntry] = &[
    LayerEntry { kind: LayerKind::CountryFill, id: "countries-fill", source: SourceKind::Countries, hit: Some(HitCategory::Country) },
    LayerEntry { kind: LayerKind::VisitedCountries, id: "countries-visited", source: SourceKind::Countries, hit: Some(HitCategory::Country) },
    LayerEntry { kind: LayerKind::FocusedCountry, id: "countries-focused", source: SourceKind::Countries, hit: Some(HitCategory::Country) },
    LayerEntry { kind: LayerKind::CountryBorder, id: "countries-border", source: SourceKind::Countries, hit: None },
    LayerEntry { kind: LayerKind::SubdivisionFill, id: "subdivisions-fill", source: SourceKind::Subdivisions, hit: Some(HitCategory::Subdivision) },
    LayerEntry { kind: LayerKind::VisitedSubdivisions, id: "subdivisions-visited", source: SourceKind::Subdivisions, hit: Some(HitCategory::Subdivision) },
    LayerEntry { kind: LayerKind::SubdivisionBorder, id: "subdivisions-border", source: SourceKind::Subdivisions, hit: None },
    LayerEntry { kind: LayerKind::HeritageUnvisited, id: "heritage-unvisited", source: SourceKind::HeritageSites, hit: Some(HitCategory::Heritage) },
    LayerEntry { kind: LayerKind::HeritageVisited, id: "heritage-visited", source: SourceKind::HeritageSites, hit: Some(HitCategory::Heritage) },
];

const SOURCE_TABLE: &[(SourceKind, &str)] = &[
    (SourceKind::Countries, "countries"),
    (SourceKind::Subdivisions, "subdivisions"),
    (SourceKind::HeritageSites, "heritage-sites"),
];

const COUNTRY_SEPARATOR: char = ':';

fn layer_entry(kind: LayerKind) -> &'static LayerEntry {
    // The table has one row per variant, in declaration order.
    &LAYER_TABLE[kind as usize]
}

impl LayerKind {
    pub const ALL: [LayerKind; 9] = [
        LayerKind::CountryFill,
        LayerKind::VisitedCountries,
        LayerKind::FocusedCountry,
        LayerKind::CountryBorder,
        LayerKind::SubdivisionFill,
        LayerKind::VisitedSubdivisions,
        LayerKind::SubdivisionBorder,
        LayerKind::HeritageUnvisited,
        LayerKind::HeritageVisited,
    ];

    pub fn id_prefix(self) -> &'static str {
        layer_entry(self).id
    }

    pub fn source(self) -> SourceKind {
        layer_entry(self).source
    }

    pub fn hit_category(self) -> Option<HitCategory> {
        layer_entry(self).hit
    }
}

impl SourceKind {
    pub fn id_prefix(self) -> &'static str {
        SOURCE_TABLE
            .iter()
            .find(|(k, _)| *k == self)
            .map(|(_, id)| *id)
            .unwrap_or("unknown")
    }

    /// Subdivision geometry is per country; the others are global.
    pub fn is_country_scoped(self) -> bool {
        matches!(self, SourceKind::Subdivisions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceKey {
    pub kind: SourceKind,
    pub country: Option<CountryCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerKey {
    pub kind: LayerKind,
    pub country: Option<CountryCode>,
}

fn join_id(prefix: &str, country: Option<&CountryCode>) -> String {
    match country {
        Some(cc) => format!("{prefix}{COUNTRY_SEPARATOR}{}", cc.as_str()),
        None => prefix.to_string(),
    }
}

fn split_id(id: &str) -> (&str, Option<CountryCode>) {
    match id.split_once(COUNTRY_SEPARATOR) {
        Some((prefix, cc)) if !cc.is_empty() => (prefix, Some(CountryCode::new(cc))),
        _ => (id, None),
    }
}

impl SourceKey {
    pub fn global(kind: SourceKind) -> Self {
        Self { kind, country: None }
    }

    pub fn for_country(kind: SourceKind, country: CountryCode) -> Self {
        Self {
            kind,
            country: Some(country),
        }
    }

    pub fn id(&self) -> String {
        join_id(self.kind.id_prefix(), self.country.as_ref())
    }

    pub fn parse(id: &str) -> Option<Self> {
        let (prefix, country) = split_id(id);
        let kind = SOURCE_TABLE
            .iter()
            .find(|(_, p)| *p == prefix)
            .map(|(k, _)| *k)?;
        if kind.is_country_scoped() != country.is_some() {
            return None;
        }
        Some(Self { kind, country })
    }
}

impl LayerKey {
    pub fn global(kind: LayerKind) -> Self {
        Self { kind, country: None }
    }

    pub fn for_country(kind: LayerKind, country: CountryCode) -> Self {
        Self {
            kind,
            country: Some(country),
        }
    }

    pub fn id(&self) -> String {
        join_id(self.kind.id_prefix(), self.country.as_ref())
    }

    pub fn source(&self) -> SourceKey {
        SourceKey {
            kind: self.kind.source(),
            country: self.country.clone(),
        }
    }

    pub fn parse(id: &str) -> Option<Self> {
        let (prefix, country) = split_id(id);
        let entry = LAYER_TABLE.iter().find(|e| e.id == prefix)?;
        if entry.source.is_country_scoped() != country.is_some() {
            return None;
        }
        Some(Self {
            kind: entry.kind,
            country,
        })
    }
}

impl std::fmt::Display for LayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id())
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id())
    }
}
