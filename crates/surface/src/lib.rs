pub mod controller;
pub mod engine;
pub mod headless;

pub use controller::*;
pub use engine::*;
pub use headless::*;
