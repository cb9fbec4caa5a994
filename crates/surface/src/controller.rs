use std::cell::{Cell, RefCell};
use std::rc::Rc;

use foundation::{Camera, EngineHandle, LngLat, Viewport};
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::engine::{EngineError, MapEngine, StyleLoad};

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceOptions {
    /// Host element the engine renders into.
    pub container: String,
    pub center: LngLat,
    pub zoom: f64,
    pub style_url: String,
    pub viewport: Viewport,
}

impl SurfaceOptions {
    pub fn camera(&self) -> Camera {
        Camera::new(self.center, self.zoom)
    }
}

/// A loaded engine library: constructs engine instances.
pub trait EngineLibrary {
    fn create(&self, options: &SurfaceOptions) -> Result<Box<dyn MapEngine>, EngineError>;
}

/// Async factory for the (heavy) engine library.
pub trait EngineLoader {
    fn load(&self) -> LocalBoxFuture<'_, Result<Rc<dyn EngineLibrary>, EngineError>>;
}

/// Runs the loader on first use and hands out the cached library afterwards.
/// A failed load is not cached; the next call retries.
pub struct LazyEngineLibrary {
    loader: Box<dyn EngineLoader>,
    library: OnceCell<Rc<dyn EngineLibrary>>,
}

impl LazyEngineLibrary {
    pub fn new(loader: impl EngineLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            library: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.library.initialized()
    }

    pub async fn get(&self) -> Result<Rc<dyn EngineLibrary>, EngineError> {
        self.library
            .get_or_try_init(|| self.loader.load())
            .await
            .map(Rc::clone)
    }
}

impl std::fmt::Debug for LazyEngineLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyEngineLibrary")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceState {
    Loading,
    Ready,
    StyleSwapping,
    Failed(String),
    Destroyed,
}

/// Owns the single engine instance of one map container.
pub struct RenderSurfaceController {
    handle: EngineHandle,
    engine: Option<Box<dyn MapEngine>>,
    state: Rc<RefCell<SurfaceState>>,
    swap_seq: Rc<Cell<u64>>,
}

impl RenderSurfaceController {
    /// Creates the engine and waits for the initial style. Failures end in
    /// [`SurfaceState::Failed`] instead of an error.
    pub async fn create(library: &LazyEngineLibrary, options: SurfaceOptions) -> Self {
        let handle = EngineHandle::allocate();
        let mut controller = Self {
            handle,
            engine: None,
            state: Rc::new(RefCell::new(SurfaceState::Loading)),
            swap_seq: Rc::new(Cell::new(0)),
        };

        let engine = match library.get().await {
            Ok(lib) => lib.create(&options),
            Err(e) => Err(e),
        };
        let mut engine = match engine {
            Ok(engine) => engine,
            Err(e) => {
                warn!(surface = %handle, container = %options.container, error = %e, "engine creation failed");
                controller.set_state(SurfaceState::Failed(e.to_string()));
                return controller;
            }
        };

        let load = engine.set_style(&options.style_url);
        match load.await {
            Ok(()) => {
                info!(surface = %handle, style = %options.style_url, "surface ready");
                controller.engine = Some(engine);
                controller.set_state(SurfaceState::Ready);
            }
            Err(e) => {
                warn!(surface = %handle, style = %options.style_url, error = %e, "initial style failed");
                engine.remove();
                controller.set_state(SurfaceState::Failed(e.to_string()));
            }
        }
        controller
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle
    }

    pub fn state(&self) -> SurfaceState {
        self.state.borrow().clone()
    }

    fn set_state(&self, state: SurfaceState) {
        *self.state.borrow_mut() = state;
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            *self.state.borrow(),
            SurfaceState::Loading | SurfaceState::StyleSwapping
        )
    }

    /// Layers may be touched only while this holds.
    pub fn is_style_ready(&self) -> bool {
        self.engine.is_some() && *self.state.borrow() == SurfaceState::Ready
    }

    pub fn engine(&self) -> Option<&dyn MapEngine> {
        self.engine.as_deref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut (dyn MapEngine + 'static)> {
        self.engine.as_deref_mut()
    }

    /// Starts a base-style swap. Custom layers are gone once this returns;
    /// the future resolves after the engine finished loading the new style.
    /// Only the most recent swap updates the surface state.
    pub fn swap_style(&mut self, url: &str) -> StyleLoad {
        let Some(engine) = self.engine.as_mut() else {
            return futures_util::future::ready(Err(EngineError::Destroyed)).boxed_local();
        };

        let seq = self.swap_seq.get() + 1;
        self.swap_seq.set(seq);
        *self.state.borrow_mut() = SurfaceState::StyleSwapping;
        debug!(surface = %self.handle, style = %url, seq, "style swap started");

        let load = engine.set_style(url);
        let state = Rc::clone(&self.state);
        let latest = Rc::clone(&self.swap_seq);
        async move {
            let result = load.await;
            if latest.get() == seq {
                let mut state = state.borrow_mut();
                if *state == SurfaceState::StyleSwapping {
                    *state = match &result {
                        Ok(()) => SurfaceState::Ready,
                        Err(e) => SurfaceState::Failed(e.to_string()),
                    };
                }
            }
            result
        }
        .boxed_local()
    }

    /// Releases the engine. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.remove();
            info!(surface = %self.handle, "surface destroyed");
        }
        self.set_state(SurfaceState::Destroyed);
    }
}

impl Drop for RenderSurfaceController {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for RenderSurfaceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSurfaceController")
            .field("handle", &self.handle)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{LazyEngineLibrary, RenderSurfaceController, SurfaceOptions, SurfaceState};
    use crate::engine::{EngineError, MapEngine};
    use crate::headless::{HeadlessEngine, HeadlessLoader, StyleLoadMode};
    use foundation::{LngLat, Viewport};

    fn options(style: &str) -> SurfaceOptions {
        SurfaceOptions {
            container: "map".to_string(),
            center: LngLat::new(0.0, 20.0),
            zoom: 1.5,
            style_url: style.to_string(),
            viewport: Viewport::default(),
        }
    }

    #[tokio::test]
    async fn create_waits_for_initial_style() {
        let engine = HeadlessEngine::new(StyleLoadMode::Immediate);
        let library = LazyEngineLibrary::new(HeadlessLoader::new(engine.clone()));
        let surface = RenderSurfaceController::create(&library, options("light.json")).await;

        assert_eq!(surface.state(), SurfaceState::Ready);
        assert!(surface.is_style_ready());
        assert!(!surface.is_loading());
        assert_eq!(engine.style_url().as_deref(), Some("light.json"));
    }

    #[tokio::test]
    async fn library_is_loaded_once() {
        let engine = HeadlessEngine::new(StyleLoadMode::Immediate);
        let loader = HeadlessLoader::new(engine);
        let loads = loader.load_count();
        let library = LazyEngineLibrary::new(loader);

        let _a = RenderSurfaceController::create(&library, options("a.json")).await;
        let _b = RenderSurfaceController::create(&library, options("b.json")).await;
        assert!(library.is_loaded());
        assert_eq!(loads.get(), 1);
    }

    #[tokio::test]
    async fn init_failure_is_a_state_not_an_error() {
        let library = LazyEngineLibrary::new(HeadlessLoader::failing("no webgl"));
        let surface = RenderSurfaceController::create(&library, options("a.json")).await;
        assert!(matches!(surface.state(), SurfaceState::Failed(_)));
        assert!(!surface.is_loading());
        assert!(surface.engine().is_none());

        let engine = HeadlessEngine::new(StyleLoadMode::Immediate);
        engine.fail_style("broken.json");
        let library = LazyEngineLibrary::new(HeadlessLoader::new(engine.clone()));
        let surface = RenderSurfaceController::create(&library, options("broken.json")).await;
        assert!(matches!(surface.state(), SurfaceState::Failed(_)));
        assert!(engine.is_removed());
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let engine = HeadlessEngine::new(StyleLoadMode::Immediate);
        let library = LazyEngineLibrary::new(HeadlessLoader::new(engine.clone()));
        let mut surface = RenderSurfaceController::create(&library, options("a.json")).await;

        surface.destroy();
        surface.destroy();
        assert_eq!(surface.state(), SurfaceState::Destroyed);
        assert_eq!(engine.remove_count(), 1);
        assert_eq!(surface.swap_style("b.json").await, Err(EngineError::Destroyed));
    }

    #[tokio::test]
    async fn swap_blocks_layer_access_until_loaded() {
        let engine = HeadlessEngine::new(StyleLoadMode::Immediate);
        let library = LazyEngineLibrary::new(HeadlessLoader::new(engine.clone()));
        let mut surface = RenderSurfaceController::create(&library, options("light.json")).await;

        engine.set_mode(StyleLoadMode::Manual);
        let first = surface.swap_style("dark.json");
        assert!(!surface.is_style_ready());
        assert!(surface.is_loading());
        assert!(!engine.is_style_loaded());

        // A newer swap supersedes the pending one.
        let second = surface.swap_style("light.json");
        assert!(matches!(first.await, Err(EngineError::StyleSuperseded { .. })));
        assert_eq!(surface.state(), SurfaceState::StyleSwapping);

        assert_eq!(engine.complete_style_loads(), 1);
        assert_eq!(second.await, Ok(()));
        assert!(surface.is_style_ready());
        assert_eq!(
            surface.engine().and_then(|e| e.style_url()).as_deref(),
            Some("light.json")
        );
    }
}
