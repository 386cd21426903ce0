//! W3C WebDriver backend for the grapple engine.

pub mod backend;
pub mod driver;
pub mod webdriver;

pub use backend::WebDriverBackend;
pub use driver::BrowserKind;
