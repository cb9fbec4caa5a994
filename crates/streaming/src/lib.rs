pub mod cache;
pub mod prober;
pub mod source;

pub use cache::*;
pub use prober::*;
pub use source::*;
