pub mod event_bus;
pub mod signal;

pub use event_bus::*;
pub use signal::*;
