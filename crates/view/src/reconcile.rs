//! Drives the engine from one layer graph to another.
//!
//! Incremental mode touches only what differs (filters, paints and source
//! data are updated in place). Full mode clears whatever the previous graph
//! left behind and re-adds everything in draw order; it is used on mount and
//! after a base-style swap. A failing step is logged and recorded, and the
//! remaining steps still run.

use std::collections::BTreeMap;

use layers::{LayerGraph, LayerSpec, SourceSpec};
use surface::{EngineError, MapEngine};
use tracing::{debug, info, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReconcileMode {
    Incremental,
    Full,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReconcileStep {
    AddSource,
    UpdateSource,
    RemoveSource,
    AddLayer,
    UpdateFilter,
    UpdatePaint,
    RemoveLayer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileFailure {
    pub step: ReconcileStep,
    pub target: String,
    pub error: EngineError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// What is actually live on the engine afterwards.
    pub graph: LayerGraph,
    pub failures: Vec<ReconcileFailure>,
}

struct Pass<'e> {
    engine: &'e mut dyn MapEngine,
    sources: BTreeMap<String, SourceSpec>,
    layers: BTreeMap<String, LayerSpec>,
    failures: Vec<ReconcileFailure>,
}

impl Pass<'_> {
    fn fail(&mut self, step: ReconcileStep, target: String, error: EngineError) {
        warn!(?step, %target, %error, "reconcile step failed");
        self.failures.push(ReconcileFailure {
            step,
            target,
            error,
        });
    }

    fn remove_layer(&mut self, id: &str) {
        match self.engine.remove_layer(id) {
            Ok(()) => {
                self.layers.remove(id);
            }
            Err(e) => {
                if !self.engine.has_layer(id) {
                    self.layers.remove(id);
                }
                self.fail(ReconcileStep::RemoveLayer, id.to_string(), e);
            }
        }
    }

    fn remove_source(&mut self, id: &str) {
        match self.engine.remove_source(id) {
            Ok(()) => {
                self.sources.remove(id);
            }
            Err(e) => {
                if !self.engine.has_source(id) {
                    self.sources.remove(id);
                }
                self.fail(ReconcileStep::RemoveSource, id.to_string(), e);
            }
        }
    }

    fn put_source(&mut self, spec: &SourceSpec, known: Option<&SourceSpec>) {
        let id = spec.id();
        if self.engine.has_source(&id) {
            if known == Some(spec) {
                return;
            }
            match self.engine.set_source_data(&id, &spec.data) {
                Ok(()) => {
                    self.sources.insert(id, spec.clone());
                }
                Err(e) => self.fail(ReconcileStep::UpdateSource, id, e),
            }
            return;
        }
        match self.engine.add_source(spec) {
            Ok(()) => {
                self.sources.insert(id, spec.clone());
            }
            Err(e) => self.fail(ReconcileStep::AddSource, id, e),
        }
    }

    fn add_layer(&mut self, spec: &LayerSpec, before: Option<&str>) {
        let id = spec.id();
        match self.engine.add_layer(spec, before) {
            Ok(()) => {
                self.layers.insert(id, spec.clone());
            }
            Err(e) => self.fail(ReconcileStep::AddLayer, id, e),
        }
    }

    /// Brings an existing engine layer in line with `spec`. `known` is what
    /// the previous graph says the layer looks like, if anything.
    fn update_layer(&mut self, spec: &LayerSpec, known: Option<&LayerSpec>, before: Option<&str>) {
        let id = spec.id();
        let mut live = known.cloned().unwrap_or_else(|| LayerSpec {
            filter: None,
            ..spec.clone()
        });

        if known.is_some_and(|k| k.paint.layer_type() != spec.paint.layer_type()) {
            // Layer type cannot change in place.
            self.remove_layer(&id);
            self.add_layer(spec, before);
            return;
        }

        if known.is_none() || live.filter != spec.filter {
            match self.engine.set_filter(&id, spec.filter.as_ref()) {
                Ok(()) => live.filter = spec.filter.clone(),
                Err(e) => self.fail(ReconcileStep::UpdateFilter, id.clone(), e),
            }
        }
        if known.is_none() || live.paint != spec.paint {
            match self.engine.set_paint(&id, &spec.paint) {
                Ok(()) => live.paint = spec.paint.clone(),
                Err(e) => self.fail(ReconcileStep::UpdatePaint, id.clone(), e),
            }
        }
        self.layers.insert(id, live);
    }

    fn finish(self, desired: &LayerGraph) -> ReconcileOutcome {
        let layers = self
            .engine
            .layer_ids()
            .into_iter()
            .filter_map(|id| self.layers.get(&id).cloned())
            .collect();

        let mut sources: Vec<SourceSpec> = desired
            .sources
            .iter()
            .filter_map(|s| self.sources.get(&s.id()).cloned())
            .collect();
        for (id, spec) in &self.sources {
            if desired.source(&spec.key).is_none() && self.engine.has_source(id) {
                sources.push(spec.clone());
            }
        }

        ReconcileOutcome {
            graph: LayerGraph { sources, layers },
            failures: self.failures,
        }
    }
}

/// Applies `desired` on top of what `current` says is live.
pub fn reconcile(
    engine: &mut dyn MapEngine,
    desired: &LayerGraph,
    current: &LayerGraph,
    mode: ReconcileMode,
) -> ReconcileOutcome {
    let mut pass = Pass {
        engine,
        sources: current.sources.iter().map(|s| (s.id(), s.clone())).collect(),
        layers: current.layers.iter().map(|l| (l.id(), l.clone())).collect(),
        failures: Vec::new(),
    };

    match mode {
        ReconcileMode::Full => {
            for layer in current.layers.iter().rev() {
                let id = layer.id();
                if pass.engine.has_layer(&id) {
                    pass.remove_layer(&id);
                } else {
                    pass.layers.remove(&id);
                }
            }
            for source in &current.sources {
                let id = source.id();
                if pass.engine.has_source(&id) {
                    pass.remove_source(&id);
                } else {
                    pass.sources.remove(&id);
                }
            }
            for source in &desired.sources {
                pass.put_source(source, None);
            }
            for layer in &desired.layers {
                if pass.engine.has_layer(&layer.id()) {
                    pass.update_layer(layer, None, None);
                } else {
                    pass.add_layer(layer, None);
                }
            }
        }
        ReconcileMode::Incremental => {
            for layer in current.layers.iter().rev() {
                if !desired.has_layer(&layer.key) && pass.engine.has_layer(&layer.id()) {
                    pass.remove_layer(&layer.id());
                }
            }
            for source in &desired.sources {
                let known = current.source(&source.key);
                pass.put_source(source, known);
            }
            for (i, layer) in desired.layers.iter().enumerate() {
                let before = next_live_layer(&*pass.engine, &desired.layers[i + 1..]);
                if pass.engine.has_layer(&layer.id()) {
                    pass.update_layer(layer, current.layer(&layer.key), before.as_deref());
                } else {
                    pass.add_layer(layer, before.as_deref());
                }
            }
            for source in &current.sources {
                if desired.source(&source.key).is_none() && pass.engine.has_source(&source.id()) {
                    pass.remove_source(&source.id());
                }
            }
        }
    }

    let outcome = pass.finish(desired);
    match mode {
        ReconcileMode::Full => info!(
            layers = outcome.graph.layers.len(),
            failures = outcome.failures.len(),
            "layer graph rebuilt"
        ),
        ReconcileMode::Incremental => debug!(
            layers = outcome.graph.layers.len(),
            failures = outcome.failures.len(),
            "layer graph updated"
        ),
    }
    outcome
}

/// First layer after the insertion point that already exists on the engine.
fn next_live_layer(engine: &dyn MapEngine, rest: &[LayerSpec]) -> Option<String> {
    rest.iter().map(LayerSpec::id).find(|id| engine.has_layer(id))
}

/// Remembers what was last applied to the engine.
#[derive(Debug, Default)]
pub struct LayerGraphManager {
    current: LayerGraph,
}

impl LayerGraphManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &LayerGraph {
        &self.current
    }

    pub fn apply(&mut self, engine: &mut dyn MapEngine, desired: &LayerGraph) -> Vec<ReconcileFailure> {
        self.run(engine, desired, ReconcileMode::Incremental)
    }

    pub fn rebuild(&mut self, engine: &mut dyn MapEngine, desired: &LayerGraph) -> Vec<ReconcileFailure> {
        self.run(engine, desired, ReconcileMode::Full)
    }

    /// The engine dropped every custom layer (style swap); forget them.
    pub fn invalidate(&mut self) {
        self.current = LayerGraph::default();
    }

    fn run(
        &mut self,
        engine: &mut dyn MapEngine,
        desired: &LayerGraph,
        mode: ReconcileMode,
    ) -> Vec<ReconcileFailure> {
        let outcome = reconcile(engine, desired, &self.current, mode);
        self.current = outcome.graph;
        outcome.failures
    }
}
