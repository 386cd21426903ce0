use crate::driver::{self, BrowserKind, DriverProcess};
use crate::webdriver::WebDriverClient;
use async_trait::async_trait;
use fantoccini::actions::{InputSource, MOUSE_BUTTON_LEFT, MouseActions, PointerAction};
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, Locator};
use grapple_common::locator::{LocatorCandidate, Strategy};
use grapple_common::protocol::{ElementHandle, ElementState, Rect, SyntheticEvent};
use grapple_engine::backend::{Backend, BackendError, NavigationResult};
use grapple_engine::config::SessionConfig;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Live elements of the current document, keyed by handle id.
///
/// The WebDriver element reference is indexed too, so finding the same node twice
/// yields the same handle and repeated polling does not grow the registry.
struct ElementRegistry<E> {
    elements: HashMap<u64, E>,
    by_ref: HashMap<String, u64>,
    next_id: u64,
    generation: u64,
}

impl<E: Clone> ElementRegistry<E> {
    fn new() -> Self {
        Self {
            elements: HashMap::new(),
            by_ref: HashMap::new(),
            next_id: 1,
            generation: 0,
        }
    }

    fn register(&mut self, reference: String, element: E) -> ElementHandle {
        let id = match self.by_ref.get(&reference) {
            Some(&id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                self.by_ref.insert(reference, id);
                self.elements.insert(id, element);
                id
            }
        };
        ElementHandle {
            id,
            generation: self.generation,
        }
    }

    fn get(&self, handle: &ElementHandle) -> Result<E, BackendError> {
        if handle.generation != self.generation {
            return Err(BackendError::ElementStale { id: handle.id });
        }
        self.elements
            .get(&handle.id)
            .cloned()
            .ok_or(BackendError::ElementNotFound { id: handle.id })
    }

    /// Forget every element of the previous document.
    fn new_document(&mut self) {
        self.generation += 1;
        self.clear();
    }

    fn clear(&mut self) {
        self.elements.clear();
        self.by_ref.clear();
    }

    fn len(&self) -> usize {
        self.elements.len()
    }
}

/// [`Backend`] over a W3C WebDriver session.
///
/// Navigating or reloading empties the element registry and bumps its
/// generation, so handles from the previous document report as stale.
pub struct WebDriverBackend {
    kind: BrowserKind,
    session: SessionConfig,
    client: Option<WebDriverClient>,
    webdriver_url: Option<String>,
    driver: Option<DriverProcess>,
    port: u16,
    elements: ElementRegistry<Element>,
}

impl WebDriverBackend {
    /// Create a backend that launches the browser's WebDriver server itself.
    pub fn new(kind: BrowserKind, session: SessionConfig) -> Self {
        Self {
            kind,
            session,
            client: None,
            webdriver_url: None,
            driver: None,
            port: kind.default_port(),
            elements: ElementRegistry::new(),
        }
    }

    /// Create a backend connecting to an already running WebDriver server.
    pub fn with_url(webdriver_url: String, kind: BrowserKind, session: SessionConfig) -> Self {
        Self {
            webdriver_url: Some(webdriver_url),
            ..Self::new(kind, session)
        }
    }

    pub fn kind(&self) -> BrowserKind {
        self.kind
    }

    fn client(&self) -> Result<&Client, BackendError> {
        self.client
            .as_ref()
            .map(|c| &c.client)
            .ok_or(BackendError::NotReady)
    }

    fn element(&self, handle: &ElementHandle) -> Result<Element, BackendError> {
        self.elements.get(handle)
    }

    async fn navigation_result(&self) -> Result<NavigationResult, BackendError> {
        let client = self.client()?;
        let title = or_logged(client.title().await, "page title");
        let url = or_logged(client.current_url().await.map(|u| u.to_string()), "current URL");

        Ok(NavigationResult {
            url,
            title,
            status: 200,
        })
    }

    /// Run one of the element snippets with the element as `arguments[0]`.
    async fn run_script(
        &self,
        handle: &ElementHandle,
        script: &str,
        mut extra: Vec<Value>,
        operation: &str,
    ) -> Result<Value, BackendError> {
        let element = self.element(handle)?;
        let mut args = vec![serde_json::to_value(&element)?];
        args.append(&mut extra);
        self.client()?
            .execute(script, args)
            .await
            .map_err(|e| classify(e, handle.id, operation))
    }
}

/// Page details read after a successful navigation. A failed read is logged and
/// left empty.
fn or_logged<T: Default, E: std::fmt::Display>(result: Result<T, E>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        warn!("Could not read {}: {}", what, e);
        T::default()
    })
}

/// Map a WebDriver command error onto the backend taxonomy by its W3C error text.
fn classify(err: CmdError, id: u64, operation: &str) -> BackendError {
    let message = err.to_string();
    let lower = message.to_lowercase();

    if lower.contains("stale element reference") {
        BackendError::ElementStale { id }
    } else if lower.contains("element click intercepted") {
        BackendError::ClickIntercepted { id, reason: message }
    } else if lower.contains("element not interactable") {
        BackendError::ElementNotInteractable { id, reason: message }
    } else if lower.contains("no such element") {
        BackendError::ElementNotFound { id }
    } else if lower.contains("invalid session id")
        || lower.contains("no such window")
        || lower.contains("did not respond")
        || lower.contains("connection refused")
    {
        BackendError::ConnectionLost
    } else if lower.contains("javascript error") {
        BackendError::ScriptError(message)
    } else if lower.contains("timeout") {
        BackendError::TimeoutWithContext {
            operation: operation.to_string(),
        }
    } else {
        BackendError::Other(format!("{} failed: {}", operation, message))
    }
}

#[async_trait]
impl Backend for WebDriverBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        let mut session = self.session.clone();
        if !session.headless && driver::is_headless_environment() {
            info!("No display available, running {} headless", self.kind);
            session.headless = true;
        }

        let webdriver_url = if let Some(url) = &self.webdriver_url {
            info!("Connecting to external WebDriver at {}...", url);
            url.clone()
        } else {
            info!(
                "Launching {} for {} on port {}...",
                self.kind.driver_binary(),
                self.kind,
                self.port
            );
            let process = driver::launch_driver(self.kind, self.port)
                .await
                .map_err(BackendError::Other)?;
            let url = process.webdriver_url();
            self.driver = Some(process);
            url
        };

        let client = WebDriverClient::connect(&webdriver_url, driver::capabilities(self.kind, &session))
            .await
            .map_err(|e| BackendError::Other(e.to_string()))?;
        client
            .configure(&session)
            .await
            .map_err(|e| BackendError::Other(e.to_string()))?;
        self.client = Some(client);
        info!(browser = %self.kind, headless = session.headless, "Browser session created");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.elements.clear();
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| BackendError::Other(e.to_string()))?;
        }
        // Dropping the process handle stops the driver server.
        self.driver = None;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        self.elements.new_document();
        info!("Navigating to: {}", url);
        self.client()?
            .goto(url)
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?;

        self.navigation_result().await
    }

    async fn refresh(&mut self) -> Result<NavigationResult, BackendError> {
        self.elements.new_document();
        self.client()?
            .refresh()
            .await
            .map_err(|e| BackendError::Navigation(format!("refresh failed: {}", e)))?;

        self.navigation_result().await
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        let url = self
            .client()?
            .current_url()
            .await
            .map_err(|e| classify(e, 0, "current_url"))?;
        Ok(url.to_string())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError> {
        let bytes = self
            .client()?
            .screenshot()
            .await
            .map_err(|e| BackendError::Other(format!("Screenshot failed: {}", e)))?;
        Ok(bytes)
    }

    async fn find_elements(
        &mut self,
        locator: &LocatorCandidate,
    ) -> Result<Vec<ElementHandle>, BackendError> {
        let partial_text;
        let query = match locator.strategy {
            Strategy::Id => Locator::Id(&locator.expression),
            Strategy::Css => Locator::Css(&locator.expression),
            Strategy::XPath => Locator::XPath(&locator.expression),
            Strategy::LinkText => Locator::LinkText(&locator.expression),
            Strategy::PartialText => {
                partial_text = locator.partial_text_xpath();
                Locator::XPath(&partial_text)
            }
        };

        let found = self.client()?.find_all(query).await.map_err(|e| {
            let message = e.to_string();
            if message.to_lowercase().contains("invalid selector") {
                BackendError::SelectorInvalid {
                    selector: locator.description.clone(),
                }
            } else {
                classify(e, 0, "find_elements")
            }
        })?;
        let handles: Vec<ElementHandle> = found
            .into_iter()
            .map(|el| self.elements.register(el.element_id().to_string(), el))
            .collect();
        debug!(
            locator = %locator.description,
            count = handles.len(),
            registered = self.elements.len(),
            "find_elements"
        );
        Ok(handles)
    }

    async fn inspect(&mut self, handle: &ElementHandle) -> Result<ElementState, BackendError> {
        let element = self.element(handle)?;
        let map = |e| classify(e, handle.id, "inspect");
        let visible = element.is_displayed().await.map_err(map)?;
        let enabled = element.is_enabled().await.map_err(map)?;
        let (x, y, width, height) = element.rectangle().await.map_err(map)?;
        Ok(ElementState {
            rect: Rect::new(x, y, width, height),
            visible,
            enabled,
        })
    }

    async fn text(&mut self, handle: &ElementHandle) -> Result<String, BackendError> {
        self.element(handle)?
            .text()
            .await
            .map_err(|e| classify(e, handle.id, "text"))
    }

    async fn value(&mut self, handle: &ElementHandle) -> Result<String, BackendError> {
        let value = self
            .element(handle)?
            .prop("value")
            .await
            .map_err(|e| classify(e, handle.id, "value"))?;
        Ok(value.unwrap_or_default())
    }

    async fn click(&mut self, handle: &ElementHandle) -> Result<(), BackendError> {
        self.element(handle)?
            .click()
            .await
            .map_err(|e| classify(e, handle.id, "click"))
    }

    async fn send_keys(&mut self, handle: &ElementHandle, text: &str) -> Result<(), BackendError> {
        self.element(handle)?
            .send_keys(text)
            .await
            .map_err(|e| classify(e, handle.id, "send_keys"))
    }

    async fn clear(&mut self, handle: &ElementHandle) -> Result<(), BackendError> {
        self.element(handle)?
            .clear()
            .await
            .map_err(|e| classify(e, handle.id, "clear"))
    }

    async fn hover_click(&mut self, handle: &ElementHandle) -> Result<(), BackendError> {
        let element = self.element(handle)?;
        let actions = MouseActions::new("grapple-mouse".to_string())
            .then(PointerAction::MoveToElement {
                element,
                duration: None,
                x: Default::default(),
                y: Default::default(),
            })
            .then(PointerAction::Down {
                button: MOUSE_BUTTON_LEFT,
            })
            .then(PointerAction::Up {
                button: MOUSE_BUTTON_LEFT,
            });
        self.client()?
            .perform_actions(actions)
            .await
            .map_err(|e| classify(e, handle.id, "hover_click"))
    }

    async fn script_click(&mut self, handle: &ElementHandle) -> Result<(), BackendError> {
        self.run_script(handle, grapple_scripts::SCRIPT_CLICK_JS, vec![], "script_click")
            .await?;
        Ok(())
    }

    async fn scroll_into_center(&mut self, handle: &ElementHandle) -> Result<(), BackendError> {
        let in_view = self
            .run_script(
                handle,
                grapple_scripts::SCROLL_INTO_CENTER_JS,
                vec![],
                "scroll_into_center",
            )
            .await?;
        debug!(id = handle.id, in_view = in_view.as_bool().unwrap_or(false), "Scrolled into center");
        Ok(())
    }

    async fn hide_element(&mut self, handle: &ElementHandle) -> Result<String, BackendError> {
        let previous = self
            .run_script(handle, grapple_scripts::HIDE_ELEMENT_JS, vec![], "hide_element")
            .await?;
        Ok(previous.as_str().unwrap_or_default().to_string())
    }

    async fn restore_visibility(
        &mut self,
        handle: &ElementHandle,
        previous: &str,
    ) -> Result<(), BackendError> {
        self.run_script(
            handle,
            grapple_scripts::RESTORE_VISIBILITY_JS,
            vec![Value::from(previous)],
            "restore_visibility",
        )
        .await?;
        Ok(())
    }

    async fn set_value(&mut self, handle: &ElementHandle, value: &str) -> Result<(), BackendError> {
        self.run_script(
            handle,
            grapple_scripts::SET_VALUE_JS,
            vec![Value::from(value)],
            "set_value",
        )
        .await?;
        Ok(())
    }

    async fn dispatch_event(
        &mut self,
        handle: &ElementHandle,
        event: SyntheticEvent,
    ) -> Result<(), BackendError> {
        self.run_script(
            handle,
            grapple_scripts::DISPATCH_EVENT_JS,
            vec![Value::from(event.dom_name())],
            "dispatch_event",
        )
        .await?;
        Ok(())
    }
}
