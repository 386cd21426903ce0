pub mod engine;
pub mod filter;
pub mod result;

pub use engine::{ChainWalk, ElementResolver};
pub use filter::VisibilityFilter;
pub use result::ResolvedElement;
