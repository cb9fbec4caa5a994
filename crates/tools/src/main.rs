use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser, Subcommand};
use foundation::math::project;
use foundation::{CountryCode, LngLat, ScreenPoint, Viewport};
use layers::LayerSpec;
use serde_json::json;
use streaming::{
    DirGeoJsonSource, GeoJsonSource, HttpGeoJsonSource, ProberConfig, RegionalDataProber,
    RegionalDataset, StaticGeoJsonSource,
};
use surface::{HeadlessEngine, HeadlessLoader, LazyEngineLibrary, MapEngine, StyleLoadMode};
use tracing::info;
use tracing_subscriber::EnvFilter;
use view::{MapView, ViewConfig};

mod scenario;

use scenario::Scenario;

#[derive(Parser, Debug)]
#[command(author, version, about = "Travel map layer-sync tooling")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe regional subdivision geometry for one country
    Probe {
        /// ISO country code (e.g. JP)
        #[arg(long)]
        country: String,

        /// Static host serving geojson/{country}/{type}/...
        #[arg(long, conflicts_with = "dir")]
        base_url: Option<String>,

        /// Local directory with the same layout
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Comma-separated candidate subdivision types, tried in order
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
    },

    /// Mount a scenario on a headless engine and print the live layer graph
    Graph {
        #[arg(long)]
        scenario: PathBuf,

        /// Render with the dark base style
        #[arg(long)]
        dark: bool,
    },

    /// Hit-test a geographic position against a mounted scenario
    Hit {
        #[arg(long)]
        scenario: PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Also simulate a click at the position
        #[arg(long)]
        click: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match args.command {
        Command::Probe {
            country,
            base_url,
            dir,
            types,
        } => probe(&country, base_url, dir, types).await?,
        Command::Graph { scenario, dark } => graph(&scenario, dark).await?,
        Command::Hit {
            scenario,
            lng,
            lat,
            click,
        } => hit(&scenario, LngLat::new(lng, lat), click).await?,
    }

    Ok(())
}

async fn probe(
    country: &str,
    base_url: Option<String>,
    dir: Option<PathBuf>,
    types: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ViewConfig::from_env();
    let source: Rc<dyn GeoJsonSource> = match (dir, base_url) {
        (Some(dir), _) => Rc::new(DirGeoJsonSource::new(dir)),
        (None, Some(url)) => Rc::new(HttpGeoJsonSource::new(url)),
        (None, None) => Rc::new(HttpGeoJsonSource::new(config.geojson_base_url.clone())),
    };
    let prober_config = if types.is_empty() {
        config.prober_config()
    } else {
        ProberConfig { candidates: types }
    };

    let code = CountryCode::new(country);
    let prober = RegionalDataProber::new(source, prober_config);
    let summary = match prober.probe(&code).await {
        RegionalDataset::Resolved(c) => json!({
            "country": c.country.as_str(),
            "status": "resolved",
            "subdivision_type": c.subdivision_type,
            "regions": c.regions,
            "skipped": c.skipped.iter().map(|s| json!({ "region": s.region, "reason": s.reason })).collect::<Vec<_>>(),
            "features": c.features.len(),
        }),
        RegionalDataset::Unavailable => json!({
            "country": code.as_str(),
            "status": "unavailable",
        }),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn mount_scenario(
    scenario: &Scenario,
    dark: bool,
) -> Result<(HeadlessEngine, MapView), Box<dyn std::error::Error>> {
    let mut config = scenario.view_config();
    config.dark = config.dark || dark;

    let engine = HeadlessEngine::new(StyleLoadMode::Immediate);
    engine.register_url(config.countries_url.clone(), scenario.countries()?);

    let source: Rc<dyn GeoJsonSource> = match &scenario.geojson_dir {
        Some(dir) => Rc::new(DirGeoJsonSource::new(dir)),
        None => Rc::new(StaticGeoJsonSource::new()),
    };
    let library = LazyEngineLibrary::new(HeadlessLoader::new(engine.clone()));
    let view = MapView::mount(&library, config, source, scenario.inputs()).await;
    info!(state = ?view.surface_state(), "scenario mounted");
    Ok((engine, view))
}

async fn graph(path: &Path, dark: bool) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(path)?;
    let (_engine, view) = mount_scenario(&scenario, dark).await?;
    let graph = view.layer_graph();
    let out = json!({
        "theme": view.theme().as_str(),
        "sources": graph.source_ids(),
        "layers": graph.layers.iter().map(LayerSpec::to_json).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn hit(path: &Path, at: LngLat, click: bool) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(path)?;
    let (engine, view) = mount_scenario(&scenario, false).await?;
    let point: ScreenPoint = project(at, &engine.camera(), Viewport::default());

    let tooltip = view.on_pointer_move(point);
    let toggled = if click { view.on_click(point) } else { None };
    let out = json!({
        "point": { "x": point.x, "y": point.y },
        "tooltip": tooltip.map(|t| json!({
            "category": format!("{:?}", t.category),
            "id": t.id,
            "name": t.name,
            "visited": t.visited,
            "swatch": t.swatch.map(|c| c.to_hex()),
        })),
        "poi_toggled": toggled.map(|t| t.site_id),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
