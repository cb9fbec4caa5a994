pub mod config;
pub mod map_view;
pub mod picking;
pub mod reconcile;
pub mod theme;

pub use config::*;
pub use map_view::*;
pub use picking::*;
pub use reconcile::*;
pub use theme::*;
