use async_trait::async_trait;
pub use grapple_common::error::backend_error::BackendError;
use grapple_common::locator::LocatorCandidate;
use grapple_common::protocol::{ElementHandle, ElementState, SyntheticEvent};

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
    pub status: u16, // generic status code (e.g. 200)
}

/// Ctrl+A, release modifiers (NULL key), Delete, in WebDriver key codes.
pub const SELECT_ALL_THEN_DELETE: &str = "\u{E009}a\u{E000}\u{E017}";

/// The single seam between the engine and a browser.
///
/// Implementations own one browser session. Handles returned by [`find_elements`]
/// belong to the document that was live at the time; after `navigate` or `refresh`
/// every older handle must fail with [`BackendError::ElementStale`].
///
/// [`find_elements`]: Backend::find_elements
#[async_trait]
pub trait Backend: Send + Sync {
    /// Launch the backend (start driver, create the browser session).
    async fn launch(&mut self) -> Result<(), BackendError>;

    /// Close the browser session and cleanup resources.
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Check if the backend is ready to accept commands.
    async fn is_ready(&self) -> bool;

    /// Navigate to a specific URL.
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError>;

    /// Full page reload.
    async fn refresh(&mut self) -> Result<NavigationResult, BackendError>;

    async fn current_url(&mut self) -> Result<String, BackendError> {
        Err(BackendError::NotSupported("current_url".into()))
    }

    /// Capture a PNG screenshot of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError>;

    /// All elements matching one candidate, in document order.
    async fn find_elements(
        &mut self,
        locator: &LocatorCandidate,
    ) -> Result<Vec<ElementHandle>, BackendError>;

    /// Visibility, enabled state and bounding box of an element.
    async fn inspect(&mut self, element: &ElementHandle) -> Result<ElementState, BackendError>;

    /// Rendered text of an element.
    async fn text(&mut self, element: &ElementHandle) -> Result<String, BackendError>;

    /// Current `value` property of a form control (empty for elements without one).
    async fn value(&mut self, element: &ElementHandle) -> Result<String, BackendError>;

    /// Native click through the driver.
    async fn click(&mut self, element: &ElementHandle) -> Result<(), BackendError>;

    /// Native key input through the driver.
    async fn send_keys(&mut self, element: &ElementHandle, text: &str)
    -> Result<(), BackendError>;

    /// Native clear through the driver.
    async fn clear(&mut self, element: &ElementHandle) -> Result<(), BackendError>;

    /// Select the whole value with the keyboard and delete it.
    async fn select_all_delete(&mut self, element: &ElementHandle) -> Result<(), BackendError> {
        self.send_keys(element, SELECT_ALL_THEN_DELETE).await
    }

    /// Move the pointer onto the element, then press and release, through the
    /// driver's input actions pipeline.
    async fn hover_click(&mut self, _element: &ElementHandle) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("hover_click".into()))
    }

    /// Click via the scripting bridge (`HTMLElement.click()`).
    async fn script_click(&mut self, _element: &ElementHandle) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("script_click".into()))
    }

    /// Scroll the element to the centre of the viewport.
    async fn scroll_into_center(&mut self, _element: &ElementHandle) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("scroll_into_center".into()))
    }

    /// Hide an element and return its previous inline visibility.
    async fn hide_element(&mut self, _element: &ElementHandle) -> Result<String, BackendError> {
        Err(BackendError::NotSupported("hide_element".into()))
    }

    /// Undo [`Backend::hide_element`].
    async fn restore_visibility(
        &mut self,
        _element: &ElementHandle,
        _previous: &str,
    ) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("restore_visibility".into()))
    }

    /// Assign a value through the scripting bridge and fire `input`/`change`.
    async fn set_value(&mut self, _element: &ElementHandle, _value: &str) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("set_value".into()))
    }

    /// Dispatch a raw synthetic DOM event on the element.
    async fn dispatch_event(
        &mut self,
        _element: &ElementHandle,
        _event: SyntheticEvent,
    ) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("dispatch_event".into()))
    }
}
