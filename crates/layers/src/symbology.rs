use scene::SiteCategory;
use serde_json::{Map, Value, json};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn from_dark(dark: bool) -> Self {
        if dark { Theme::Dark } else { Theme::Light }
    }

    pub fn is_dark(self) -> bool {
        matches!(self, Theme::Dark)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub const VISITED_COLOR: Color = Color::rgb(0x00, 0x8d, 0x8d);
pub const UNVISITED_SITE_COLOR: Color = Color::rgb(0x6b, 0x72, 0x80);
pub const CULTURAL_COLOR: Color = Color::rgb(0xd9, 0x77, 0x06);
pub const NATURAL_COLOR: Color = Color::rgb(0x16, 0xa3, 0x4a);
pub const MIXED_COLOR: Color = Color::rgb(0x7c, 0x3a, 0xed);
/// Used for categories the data layer sends that are not recognized.
pub const FALLBACK_CATEGORY_COLOR: Color = UNVISITED_SITE_COLOR;

pub fn category_color(category: &SiteCategory) -> Color {
    match category {
        SiteCategory::Cultural => CULTURAL_COLOR,
        SiteCategory::Natural => NATURAL_COLOR,
        SiteCategory::Mixed => MIXED_COLOR,
        SiteCategory::Other(_) => FALLBACK_CATEGORY_COLOR,
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ThemePalette {
    pub country_fill: Color,
    pub country_fill_opacity: f32,
    pub country_border: Color,
    pub visited_fill: Color,
    pub visited_opacity: f32,
    pub focused_fill: Color,
    pub subdivision_fill: Color,
    pub subdivision_border: Color,
    pub site_stroke: Color,
}

pub fn palette_for(theme: Theme) -> ThemePalette {
    match theme {
        Theme::Dark => ThemePalette {
            country_fill: Color::rgb(0x1e, 0x29, 0x3b),
            country_fill_opacity: 0.6,
            country_border: Color::rgb(0x47, 0x55, 0x69),
            visited_fill: VISITED_COLOR,
            visited_opacity: 0.5,
            focused_fill: Color::rgb(0xf5, 0x9e, 0x0b),
            subdivision_fill: Color::rgb(0x33, 0x41, 0x55),
            subdivision_border: Color::rgb(0x64, 0x74, 0x8b),
            site_stroke: Color::rgb(0x0f, 0x17, 0x2a),
        },
        Theme::Light => ThemePalette {
            country_fill: Color::rgb(0xe2, 0xe8, 0xf0),
            country_fill_opacity: 0.4,
            country_border: Color::rgb(0x94, 0xa3, 0xb8),
            visited_fill: VISITED_COLOR,
            visited_opacity: 0.4,
            focused_fill: Color::rgb(0xfb, 0xbf, 0x24),
            subdivision_fill: Color::rgb(0xcb, 0xd5, 0xe1),
            subdivision_border: Color::rgb(0x94, 0xa3, 0xb8),
            site_stroke: Color::rgb(0xff, 0xff, 0xff),
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColorRule {
    Fixed(Color),
    /// Looks up a string property; unknown or missing values get `fallback`.
    ByCategory {
        property: String,
        stops: Vec<(String, Color)>,
        fallback: Color,
    },
}

impl ColorRule {
    /// Colors heritage sites by their `category` property.
    pub fn site_categories(property: impl Into<String>) -> Self {
        ColorRule::ByCategory {
            property: property.into(),
            stops: [SiteCategory::Cultural, SiteCategory::Natural, SiteCategory::Mixed]
                .iter()
                .map(|c| (c.as_str().to_string(), category_color(c)))
                .collect(),
            fallback: FALLBACK_CATEGORY_COLOR,
        }
    }

    pub fn resolve(&self, props: &Map<String, Value>) -> Color {
        match self {
            ColorRule::Fixed(c) => *c,
            ColorRule::ByCategory {
                property,
                stops,
                fallback,
            } => {
                let value = props.get(property).and_then(Value::as_str);
                stops
                    .iter()
                    .find(|(k, _)| Some(k.as_str()) == value)
                    .map(|(_, c)| *c)
                    .unwrap_or(*fallback)
            }
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ColorRule::Fixed(c) => Value::String(c.to_hex()),
            ColorRule::ByCategory {
                property,
                stops,
                fallback,
            } => {
                let mut out = vec![json!("match"), json!(["get", property])];
                for (k, c) in stops {
                    out.push(Value::String(k.clone()));
                    out.push(Value::String(c.to_hex()));
                }
                out.push(Value::String(fallback.to_hex()));
                Value::Array(out)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Fill {
        color: ColorRule,
        opacity: f32,
    },
    Line {
        color: Color,
        width: f32,
        opacity: f32,
    },
    Circle {
        color: ColorRule,
        radius: f32,
        stroke_color: Color,
        stroke_width: f32,
        opacity: f32,
    },
}

impl Paint {
    /// Engine layer type.
    pub fn layer_type(&self) -> &'static str {
        match self {
            Paint::Fill { .. } => "fill",
            Paint::Line { .. } => "line",
            Paint::Circle { .. } => "circle",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Paint::Fill { color, opacity } => json!({
                "fill-color": color.to_json(),
                "fill-opacity": opacity,
            }),
            Paint::Line {
                color,
                width,
                opacity,
            } => json!({
                "line-color": color.to_hex(),
                "line-width": width,
                "line-opacity": opacity,
            }),
            Paint::Circle {
                color,
                radius,
                stroke_color,
                stroke_width,
                opacity,
            } => json!({
                "circle-color": color.to_json(),
                "circle-radius": radius,
                "circle-stroke-color": stroke_color.to_hex(),
                "circle-stroke-width": stroke_width,
                "circle-opacity": opacity,
            }),
        }
    }
}
