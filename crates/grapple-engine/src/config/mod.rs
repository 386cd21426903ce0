pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{EngineConfig, GrappleConfig, ReportConfig, SessionConfig, WindowSize};
