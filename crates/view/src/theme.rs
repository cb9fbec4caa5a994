//! Theme-driven base-style swaps.
//!
//! Requests are only recorded when the theme signal fires; `settle` does the
//! async work. It runs one swap at a time and, when a newer request arrived
//! while a swap was loading, discards that result and swaps again, so only
//! the last requested theme is ever rebuilt. A swap that fails outright
//! falls back to the last applied style so the map keeps its layers.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use foundation::Camera;
use layers::Theme;
use runtime::{Signal, Subscription};
use surface::{EngineError, StyleLoad};
use tracing::{debug, info, warn};

/// The side effects a theme switch needs from its map.
pub trait ThemeHost {
    fn capture_camera(&self) -> Option<Camera>;
    /// Starts swapping to the base style of `theme`.
    fn begin_style_swap(&self, theme: Theme) -> StyleLoad;
    /// Called once per settled request, after the final style loaded.
    fn complete_style_swap(&self, theme: Theme, camera: Option<Camera>);
}

#[derive(Debug)]
struct ThemeRequests {
    generation: u64,
    settled: u64,
    target: Theme,
    /// `None` once a failed swap left the engine on an unknown style.
    applied: Option<Theme>,
}

impl ThemeRequests {
    fn request(&mut self, theme: Theme) {
        self.generation += 1;
        self.target = theme;
    }
}

pub struct ThemeReactiveStyleSwitcher {
    requests: Rc<RefCell<ThemeRequests>>,
    running: Cell<bool>,
    subscription: RefCell<Option<Subscription>>,
}

impl ThemeReactiveStyleSwitcher {
    pub fn new(initial: Theme) -> Self {
        Self {
            requests: Rc::new(RefCell::new(ThemeRequests {
                generation: 0,
                settled: 0,
                target: initial,
                applied: Some(initial),
            })),
            running: Cell::new(false),
            subscription: RefCell::new(None),
        }
    }

    /// Follows `signal` (`true` = dark) until [`detach`](Self::detach).
    pub fn attach(&self, signal: &Signal<bool>) {
        let requests = Rc::clone(&self.requests);
        let subscription = signal.subscribe(move |dark| {
            requests.borrow_mut().request(Theme::from_dark(*dark));
        });
        if let Some(previous) = self.subscription.replace(Some(subscription)) {
            previous.unsubscribe();
        }
        let current = Theme::from_dark(signal.get());
        if current != self.requests.borrow().target {
            self.request(current);
        }
    }

    pub fn detach(&self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.borrow().is_some()
    }

    pub fn request(&self, theme: Theme) {
        self.requests.borrow_mut().request(theme);
    }

    pub fn has_pending(&self) -> bool {
        let r = self.requests.borrow();
        r.generation != r.settled
    }

    pub fn is_settling(&self) -> bool {
        self.running.get()
    }

    /// Theme whose rebuild last completed, if the engine is still on it.
    pub fn applied(&self) -> Option<Theme> {
        self.requests.borrow().applied
    }

    /// Works through pending requests until none is left. Returns the theme
    /// that was applied, or `None` when nothing was done (no request, or
    /// another `settle` call is already running and will pick it up). A
    /// failed request yields `None` even when the previous style came back.
    pub async fn settle<H: ThemeHost + ?Sized>(&self, host: &H) -> Option<Theme> {
        if self.running.replace(true) {
            return None;
        }
        let _running = RunningGuard(&self.running);

        let mut camera: Option<Camera> = None;
        let mut swapped = false;
        let mut applied = None;

        loop {
            let (generation, theme, current) = {
                let r = self.requests.borrow();
                if r.generation == r.settled {
                    break;
                }
                (r.generation, r.target, r.applied)
            };

            if !swapped && Some(theme) == current {
                debug!(theme = theme.as_str(), "theme already applied");
                self.requests.borrow_mut().settled = generation;
                continue;
            }

            if !swapped {
                camera = host.capture_camera();
            }
            swapped = true;
            let result = host.begin_style_swap(theme).await;

            if self.requests.borrow().generation != generation {
                debug!(theme = theme.as_str(), "style swap superseded by a newer theme");
                continue;
            }

            match result {
                Ok(()) => {
                    host.complete_style_swap(theme, camera);
                    let mut r = self.requests.borrow_mut();
                    r.settled = generation;
                    r.applied = Some(theme);
                    applied = Some(theme);
                }
                Err(EngineError::StyleSuperseded { .. }) => {
                    debug!(theme = theme.as_str(), "style load interrupted; retrying");
                }
                Err(e) => {
                    warn!(theme = theme.as_str(), error = %e, "theme style swap failed");
                    let previous = {
                        let mut r = self.requests.borrow_mut();
                        r.settled = generation;
                        r.applied.take()
                    };
                    if let Some(previous) = previous.filter(|p| *p != theme) {
                        self.restore(host, previous, generation, camera).await;
                    }
                }
            }
        }
        applied
    }

    /// Swaps back to `previous` after a failed swap and rebuilds on it, unless
    /// a newer request arrived meanwhile.
    async fn restore<H: ThemeHost + ?Sized>(
        &self,
        host: &H,
        previous: Theme,
        generation: u64,
        camera: Option<Camera>,
    ) {
        match host.begin_style_swap(previous).await {
            Ok(()) if self.requests.borrow().generation == generation => {
                info!(theme = previous.as_str(), "restored previous base style");
                host.complete_style_swap(previous, camera);
                self.requests.borrow_mut().applied = Some(previous);
            }
            Ok(()) => debug!(theme = previous.as_str(), "restore superseded by a newer theme"),
            Err(e) => {
                warn!(theme = previous.as_str(), error = %e, "could not restore previous base style");
            }
        }
    }
}

impl Drop for ThemeReactiveStyleSwitcher {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for ThemeReactiveStyleSwitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeReactiveStyleSwitcher")
            .field("requests", &*self.requests.borrow())
            .field("running", &self.running.get())
            .field("attached", &self.is_attached())
            .finish()
    }
}

struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::{ThemeHost, ThemeReactiveStyleSwitcher};
    use foundation::{Camera, LngLat};
    use futures_util::{FutureExt, poll};
    use layers::Theme;
    use runtime::Signal;
    use std::cell::RefCell;
    use std::pin::pin;
    use surface::{HeadlessEngine, MapEngine, StyleLoad, StyleLoadMode};

    struct RecordingHost {
        engine: RefCell<HeadlessEngine>,
        completed: RefCell<Vec<(Theme, Option<Camera>)>>,
    }

    impl RecordingHost {
        fn new(mode: StyleLoadMode) -> Self {
            let mut engine = HeadlessEngine::new(StyleLoadMode::Immediate);
            engine.jump_to(Camera::new(LngLat::new(2.35, 48.85), 5.0));
            engine
                .set_style("light.json")
                .now_or_never()
                .expect("immediate")
                .expect("style");
            engine.set_mode(mode);
            Self {
                engine: RefCell::new(engine),
                completed: RefCell::new(Vec::new()),
            }
        }
    }

    impl ThemeHost for RecordingHost {
        fn capture_camera(&self) -> Option<Camera> {
            Some(self.engine.borrow().camera())
        }

        fn begin_style_swap(&self, theme: Theme) -> StyleLoad {
            // Base styles reset the camera.
            let mut engine = self.engine.borrow_mut();
            engine.jump_to(Camera::default());
            engine.set_style(&format!("{}.json", theme.as_str()))
        }

        fn complete_style_swap(&self, theme: Theme, camera: Option<Camera>) {
            if let Some(camera) = camera {
                self.engine.borrow_mut().jump_to(camera);
            }
            self.completed.borrow_mut().push((theme, camera));
        }
    }

    #[tokio::test]
    async fn single_change_swaps_and_restores_camera() {
        let host = RecordingHost::new(StyleLoadMode::Immediate);
        let switcher = ThemeReactiveStyleSwitcher::new(Theme::Light);
        let signal = Signal::new(false);
        switcher.attach(&signal);

        signal.set(true);
        assert!(switcher.has_pending());
        assert_eq!(switcher.settle(&host).await, Some(Theme::Dark));

        let expected = Camera::new(LngLat::new(2.35, 48.85), 5.0);
        assert_eq!(*host.completed.borrow(), vec![(Theme::Dark, Some(expected))]);
        assert_eq!(host.engine.borrow().camera(), expected);
        assert_eq!(host.engine.borrow().style_url().as_deref(), Some("dark.json"));
        assert!(!switcher.has_pending());
    }

    #[tokio::test]
    async fn rapid_toggles_converge_on_the_last_theme() {
        let host = RecordingHost::new(StyleLoadMode::Manual);
        let switcher = ThemeReactiveStyleSwitcher::new(Theme::Light);
        let signal = Signal::new(false);
        switcher.attach(&signal);

        signal.set(true);
        let mut settle = pin!(switcher.settle(&host));
        assert!(poll!(settle.as_mut()).is_pending());
        assert_eq!(host.engine.borrow().style_url().as_deref(), Some("dark.json"));

        // Second change before the first swap finished loading.
        signal.set(false);
        let engine = host.engine.borrow().clone();
        assert_eq!(engine.complete_style_loads(), 1);
        assert!(poll!(settle.as_mut()).is_pending());
        assert_eq!(engine.style_url().as_deref(), Some("light.json"));

        assert_eq!(engine.complete_style_loads(), 1);
        assert_eq!(settle.await, Some(Theme::Light));

        let themes: Vec<Theme> = host.completed.borrow().iter().map(|(t, _)| *t).collect();
        assert_eq!(themes, vec![Theme::Light]);
    }

    #[tokio::test]
    async fn concurrent_settle_returns_immediately() {
        let host = RecordingHost::new(StyleLoadMode::Manual);
        let switcher = ThemeReactiveStyleSwitcher::new(Theme::Light);
        switcher.request(Theme::Dark);

        let mut first = pin!(switcher.settle(&host));
        assert!(poll!(first.as_mut()).is_pending());
        assert!(switcher.is_settling());
        assert_eq!(switcher.settle(&host).await, None);

        host.engine.borrow().complete_style_loads();
        assert_eq!(first.await, Some(Theme::Dark));
        assert!(!switcher.is_settling());
    }

    #[tokio::test]
    async fn toggling_back_before_settle_is_a_no_op() {
        let host = RecordingHost::new(StyleLoadMode::Immediate);
        let switcher = ThemeReactiveStyleSwitcher::new(Theme::Light);
        switcher.request(Theme::Dark);
        switcher.request(Theme::Light);

        assert_eq!(switcher.settle(&host).await, None);
        assert!(host.completed.borrow().is_empty());
        assert_eq!(host.engine.borrow().style_url().as_deref(), Some("light.json"));
    }

    #[tokio::test]
    async fn failed_swap_restores_the_applied_theme() {
        let host = RecordingHost::new(StyleLoadMode::Immediate);
        host.engine.borrow().fail_style("dark.json");
        let switcher = ThemeReactiveStyleSwitcher::new(Theme::Light);
        switcher.request(Theme::Dark);

        assert_eq!(switcher.settle(&host).await, None);
        let expected = Camera::new(LngLat::new(2.35, 48.85), 5.0);
        assert_eq!(*host.completed.borrow(), vec![(Theme::Light, Some(expected))]);
        assert_eq!(host.engine.borrow().style_url().as_deref(), Some("light.json"));
        assert_eq!(switcher.applied(), Some(Theme::Light));
        assert!(!switcher.has_pending());
    }

    #[tokio::test]
    async fn failed_swap_without_fallback_always_swaps_next_time() {
        let host = RecordingHost::new(StyleLoadMode::Immediate);
        host.engine.borrow().fail_style("dark.json");
        host.engine.borrow().fail_style("light.json");
        let switcher = ThemeReactiveStyleSwitcher::new(Theme::Light);

        switcher.request(Theme::Dark);
        assert_eq!(switcher.settle(&host).await, None);
        assert_eq!(switcher.applied(), None);
        assert!(host.completed.borrow().is_empty());

        // Styles reachable again; the old theme is no longer assumed applied.
        *host.engine.borrow_mut() = HeadlessEngine::new(StyleLoadMode::Immediate);
        switcher.request(Theme::Light);
        assert_eq!(switcher.settle(&host).await, Some(Theme::Light));
        assert_eq!(host.engine.borrow().style_url().as_deref(), Some("light.json"));
        assert_eq!(switcher.applied(), Some(Theme::Light));
    }

    #[test]
    fn detach_stops_following_the_signal() {
        let switcher = ThemeReactiveStyleSwitcher::new(Theme::Light);
        let signal = Signal::new(false);
        switcher.attach(&signal);
        assert_eq!(signal.subscriber_count(), 1);

        switcher.detach();
        assert_eq!(signal.subscriber_count(), 0);
        signal.set(true);
        assert!(!switcher.has_pending());
    }
}
