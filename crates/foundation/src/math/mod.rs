pub mod mercator;
pub mod polygon;

pub use mercator::*;
pub use polygon::*;
