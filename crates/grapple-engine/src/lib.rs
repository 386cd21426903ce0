pub mod backend;
pub mod config;
pub mod dropdown;
pub mod error;
pub mod executor;
pub mod prober;
pub mod report;
pub mod resolution;
pub mod runner;
pub mod session;
pub mod suite;
pub mod technique;
pub mod wait;

pub use grapple_common::formatter;
pub use grapple_common::locator;
pub use grapple_common::protocol;
pub use grapple_common::table;

pub use error::{EngineError, NotFoundError};
pub use session::SessionContext;
