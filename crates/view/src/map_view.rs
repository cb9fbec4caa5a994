//! One map container: surface, layer graph, hit testing and theme in one
//! place.
//!
//! Collaborators push inputs (visitation, heritage sites, focus, flags);
//! every change re-derives the desired graph and reconciles it
//! incrementally. While a base-style swap is loading, changes only update
//! the inputs and the rebuild after the swap picks them up.

use std::cell::RefCell;
use std::rc::Rc;

use foundation::{Camera, ScreenPoint, Viewport};
use layers::{GraphInputs, LayerGraph, Theme};
use runtime::{Event, EventBus, Signal};
use scene::{Country, HeritageSite, VisitationState};
use streaming::{GeoJsonSource, RegionalDataProber, RegionalDataset};
use surface::{
    LazyEngineLibrary, RenderSurfaceController, StyleLoad, SurfaceOptions, SurfaceState,
};
use tracing::{debug, info};

use crate::config::ViewConfig;
use crate::picking::{HitTestRouter, PoiToggled, Tooltip};
use crate::reconcile::{LayerGraphManager, ReconcileFailure, ReconcileMode};
use crate::theme::{ThemeHost, ThemeReactiveStyleSwitcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEvent {
    /// A heritage site was clicked; the host decides whether and how to
    /// persist the visited toggle.
    PoiToggled { site_id: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewInputs {
    pub visitation: VisitationState,
    pub heritage_sites: Vec<HeritageSite>,
    pub focused: Option<Country>,
    pub show_only_visited_sites: bool,
}

#[derive(Debug)]
struct ViewState {
    inputs: ViewInputs,
    /// Regional geometry of the focused country, once probed.
    regional: Option<RegionalDataset>,
    theme: Theme,
}

pub struct MapView {
    config: ViewConfig,
    surface: RefCell<RenderSurfaceController>,
    prober: RegionalDataProber,
    state: RefCell<ViewState>,
    layers: RefCell<LayerGraphManager>,
    router: RefCell<HitTestRouter>,
    theme: ThemeReactiveStyleSwitcher,
    events: RefCell<EventBus<MapEvent>>,
}

impl MapView {
    /// Creates the surface and, once its style loaded, builds the full graph.
    /// A failed engine leaves the view mounted but inert.
    pub async fn mount(
        library: &LazyEngineLibrary,
        config: ViewConfig,
        source: Rc<dyn GeoJsonSource>,
        inputs: ViewInputs,
    ) -> Self {
        let theme = config.theme();
        let options = SurfaceOptions {
            container: config.container.clone(),
            center: config.center,
            zoom: config.zoom,
            style_url: config.style_url(theme).to_string(),
            viewport: Viewport::default(),
        };
        let surface = RenderSurfaceController::create(library, options).await;
        let focused = inputs.focused.clone();

        let view = Self {
            prober: RegionalDataProber::new(source, config.prober_config()),
            config,
            surface: RefCell::new(surface),
            state: RefCell::new(ViewState {
                inputs,
                regional: None,
                theme,
            }),
            layers: RefCell::new(LayerGraphManager::new()),
            router: RefCell::new(HitTestRouter::new()),
            theme: ThemeReactiveStyleSwitcher::new(theme),
            events: RefCell::new(EventBus::new()),
        };

        view.sync(ReconcileMode::Full);
        if focused.is_some() {
            view.focus_country(focused).await;
        }
        view
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn surface_state(&self) -> SurfaceState {
        self.surface.borrow().state()
    }

    pub fn is_loading(&self) -> bool {
        self.surface.borrow().is_loading()
    }

    pub fn theme(&self) -> Theme {
        self.state.borrow().theme
    }

    /// Graph currently live on the engine.
    pub fn layer_graph(&self) -> LayerGraph {
        self.layers.borrow().current().clone()
    }

    pub fn regional(&self) -> Option<RegionalDataset> {
        self.state.borrow().regional.clone()
    }

    pub fn tooltip(&self) -> Option<Tooltip> {
        self.router.borrow().tooltip().cloned()
    }

    pub fn set_visitation(&self, visitation: VisitationState) -> Vec<ReconcileFailure> {
        self.state.borrow_mut().inputs.visitation = visitation;
        self.sync(ReconcileMode::Incremental)
    }

    pub fn set_heritage_sites(&self, sites: Vec<HeritageSite>) -> Vec<ReconcileFailure> {
        self.state.borrow_mut().inputs.heritage_sites = sites;
        self.sync(ReconcileMode::Incremental)
    }

    pub fn set_show_only_visited_sites(&self, only_visited: bool) -> Vec<ReconcileFailure> {
        self.state.borrow_mut().inputs.show_only_visited_sites = only_visited;
        self.sync(ReconcileMode::Incremental)
    }

    /// Moves focus: flies the camera there, then probes regional geometry
    /// and adds it once available. `None` clears focus and regional layers.
    pub async fn focus_country(&self, country: Option<Country>) -> Option<RegionalDataset> {
        {
            let mut state = self.state.borrow_mut();
            let same = state.inputs.focused.as_ref().map(|c| &c.code)
                == country.as_ref().map(|c| &c.code);
            if !same {
                state.regional = None;
            }
            state.inputs.focused = country.clone();
        }

        let Some(country) = country else {
            self.sync(ReconcileMode::Incremental);
            return None;
        };

        if let Some(engine) = self.surface.borrow_mut().engine_mut() {
            engine.fly_to(Camera::new(country.coordinates, self.config.focus_zoom));
        }
        self.sync(ReconcileMode::Incremental);

        let dataset = self.prober.probe(&country.code).await;

        let still_focused = {
            let mut state = self.state.borrow_mut();
            let current = state.inputs.focused.as_ref().map(|c| &c.code) == Some(&country.code);
            if current {
                state.regional = Some(dataset.clone());
            }
            current
        };
        if still_focused {
            self.sync(ReconcileMode::Incremental);
        } else {
            debug!(country = %country.code, "focus moved on before regional data arrived");
        }
        Some(dataset)
    }

    pub fn on_pointer_move(&self, point: ScreenPoint) -> Option<Tooltip> {
        let mut surface = self.surface.borrow_mut();
        if !surface.is_style_ready() {
            return None;
        }
        let engine = surface.engine_mut()?;
        self.router
            .borrow_mut()
            .on_pointer_move(engine, point)
            .cloned()
    }

    /// Emits [`MapEvent::PoiToggled`] when a heritage site is under `point`.
    pub fn on_click(&self, point: ScreenPoint) -> Option<PoiToggled> {
        let toggled = {
            let surface = self.surface.borrow();
            if !surface.is_style_ready() {
                return None;
            }
            self.router.borrow().on_click(surface.engine()?, point)?
        };
        self.events.borrow_mut().emit(MapEvent::PoiToggled {
            site_id: toggled.site_id.clone(),
        });
        Some(toggled)
    }

    pub fn drain_events(&self) -> Vec<Event<MapEvent>> {
        self.events.borrow_mut().drain()
    }

    pub fn attach_theme(&self, signal: &Signal<bool>) {
        self.theme.attach(signal);
    }

    pub fn request_theme(&self, theme: Theme) {
        self.theme.request(theme);
    }

    /// Applies pending theme requests; see [`ThemeReactiveStyleSwitcher::settle`].
    pub async fn settle_theme(&self) -> Option<Theme> {
        self.theme.settle(self).await
    }

    /// Unsubscribes from the theme signal and releases the engine. Safe to
    /// call more than once.
    pub fn dispose(&self) {
        self.theme.detach();
        self.router.borrow_mut().unbind();
        self.layers.borrow_mut().invalidate();
        self.surface.borrow_mut().destroy();
    }

    fn desired_graph(&self) -> LayerGraph {
        let state = self.state.borrow();
        let inputs = &state.inputs;
        LayerGraph::build(&GraphInputs {
            visitation: &inputs.visitation,
            heritage_sites: &inputs.heritage_sites,
            focused: inputs.focused.as_ref(),
            regional: state.regional.as_ref(),
            show_only_visited_sites: inputs.show_only_visited_sites,
            theme: state.theme,
            countries_url: &self.config.countries_url,
        })
    }

    fn sync(&self, mode: ReconcileMode) -> Vec<ReconcileFailure> {
        let mut surface = self.surface.borrow_mut();
        if !surface.is_style_ready() {
            debug!(?mode, state = ?surface.state(), "style not ready; layer sync deferred");
            return Vec::new();
        }
        let Some(engine) = surface.engine_mut() else {
            return Vec::new();
        };

        let desired = self.desired_graph();
        let mut layers = self.layers.borrow_mut();
        let failures = match mode {
            ReconcileMode::Full => layers.rebuild(engine, &desired),
            ReconcileMode::Incremental => layers.apply(engine, &desired),
        };
        self.router
            .borrow_mut()
            .bind(layers.current(), &self.state.borrow().inputs.visitation);
        failures
    }
}

impl ThemeHost for MapView {
    fn capture_camera(&self) -> Option<Camera> {
        self.surface.borrow().engine().map(|e| e.camera())
    }

    fn begin_style_swap(&self, theme: Theme) -> StyleLoad {
        // The swap tears every custom layer down.
        self.layers.borrow_mut().invalidate();
        self.router.borrow_mut().unbind();
        info!(theme = theme.as_str(), "switching base style");
        self.surface
            .borrow_mut()
            .swap_style(self.config.style_url(theme))
    }

    fn complete_style_swap(&self, theme: Theme, camera: Option<Camera>) {
        self.state.borrow_mut().theme = theme;
        if let Some(camera) = camera {
            if let Some(engine) = self.surface.borrow_mut().engine_mut() {
                engine.jump_to(camera);
            }
        }
        self.sync(ReconcileMode::Full);
    }
}

impl Drop for MapView {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for MapView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapView")
            .field("surface", &*self.surface.borrow())
            .field("state", &*self.state.borrow())
            .field("theme", &self.theme)
            .finish()
    }
}
