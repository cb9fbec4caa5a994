use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_SURFACE_INDEX: AtomicU32 = AtomicU32::new(1);

/// Generational handle naming one rendering-engine instance.
///
/// The handle is opaque to collaborators; it never grants access to the
/// engine itself, it only identifies it (logs, equality checks).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EngineHandle {
    index: u32,
    generation: u32,
}

impl EngineHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Allocates a handle with a process-unique index.
    pub fn allocate() -> Self {
        Self::new(NEXT_SURFACE_INDEX.fetch_add(1, Ordering::Relaxed), 0)
    }

    /// Same slot, next generation (used when a surface is re-created).
    pub fn next_generation(self) -> Self {
        Self::new(self.index, self.generation.wrapping_add(1))
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface#{}v{}", self.index, self.generation)
    }
}
