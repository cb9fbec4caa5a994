pub mod entities;
pub mod visitation;

pub use entities::*;
pub use visitation::*;
