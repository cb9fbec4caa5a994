pub mod expr;
pub mod graph;
pub mod keys;
pub mod spec;
pub mod symbology;

pub use expr::*;
pub use graph::*;
pub use keys::*;
pub use spec::*;
pub use symbology::*;
