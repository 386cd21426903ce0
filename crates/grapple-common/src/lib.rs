pub mod error;
pub mod formatter;
pub mod locator;
pub mod protocol;
pub mod table;

pub use error::backend_error::BackendError;
pub use locator::{ChainError, LocatorCandidate, LocatorChain, Strategy};
pub use table::{LocatorTable, TableError};
