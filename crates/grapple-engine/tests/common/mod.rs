#![allow(dead_code)]

use async_trait::async_trait;
use grapple_engine::backend::{Backend, BackendError, NavigationResult, SELECT_ALL_THEN_DELETE};
use grapple_engine::config::EngineConfig;
use grapple_engine::locator::LocatorCandidate;
use grapple_engine::protocol::{ElementHandle, ElementState, Rect, SyntheticEvent};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// A scripted element in the fake page.
#[derive(Debug, Clone)]
pub struct FakeElement {
    pub id: u64,
    /// Locators that match this element, in `prefix=expression` form.
    pub locators: Vec<String>,
    pub text: String,
    pub value: String,
    pub visible: bool,
    pub enabled: bool,
    /// Hidden through the scripting bridge.
    pub hidden: bool,
    /// Invisible until this instant.
    pub visible_at: Option<Instant>,
    /// Invisible again from this instant on.
    pub gone_at: Option<Instant>,
    /// Absent from the DOM until the page has been reloaded this many times.
    pub min_refreshes: u32,
    /// Native and pointer clicks are intercepted while this element is shown.
    pub covered_by: Option<u64>,
    /// Operations that fail with the given error.
    pub failures: HashMap<&'static str, BackendError>,
    /// Operations that succeed without any effect.
    pub ignored: HashSet<&'static str>,
    /// Value-driven validation: the indicator is shown while the value is not accepted.
    pub validation: Option<(u64, Vec<String>)>,
    pub clicks: u32,
}

#[derive(Debug, Default)]
pub struct FakeDom {
    pub elements: Vec<FakeElement>,
    pub generation: u64,
    pub refreshes: u32,
    pub url: String,
    pub title: String,
    pub calls: Vec<String>,
    pub invalid_selectors: HashSet<String>,
    pub launched: bool,
    pub closes: u32,
    pub screenshots: u32,
    pub fail_launch: bool,
    pub fail_screenshot: bool,
}

fn key(locator: &LocatorCandidate) -> String {
    format!("{}={}", locator.strategy.prefix(), locator.expression)
}

impl FakeDom {
    pub fn new() -> Self {
        Self {
            title: "Fake Page".into(),
            url: "about:blank".into(),
            ..Default::default()
        }
    }

    /// Add a visible, enabled element matched by `locators`. Returns its id.
    pub fn add(&mut self, locators: &[&str]) -> u64 {
        let id = self.elements.len() as u64 + 1;
        self.elements.push(FakeElement {
            id,
            locators: locators.iter().map(|s| s.to_string()).collect(),
            text: String::new(),
            value: String::new(),
            visible: true,
            enabled: true,
            hidden: false,
            visible_at: None,
            gone_at: None,
            min_refreshes: 0,
            covered_by: None,
            failures: HashMap::new(),
            ignored: HashSet::new(),
            validation: None,
            clicks: 0,
        });
        id
    }

    pub fn add_text(&mut self, locators: &[&str], text: &str) -> u64 {
        let id = self.add(locators);
        self.el(id).text = text.into();
        id
    }

    pub fn el(&mut self, id: u64) -> &mut FakeElement {
        &mut self.elements[(id - 1) as usize]
    }

    pub fn get(&self, id: u64) -> &FakeElement {
        &self.elements[(id - 1) as usize]
    }

    pub fn fail(&mut self, id: u64, op: &'static str, err: BackendError) {
        self.el(id).failures.insert(op, err);
    }

    pub fn ignore(&mut self, id: u64, op: &'static str) {
        self.el(id).ignored.insert(op);
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.iter().any(|c| c == call)
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn into_backend(self) -> (FakeBackend, Arc<Mutex<FakeDom>>) {
        let dom = Arc::new(Mutex::new(self));
        (FakeBackend { dom: dom.clone() }, dom)
    }

    fn present(&self, el: &FakeElement) -> bool {
        self.refreshes >= el.min_refreshes
    }

    fn is_shown(&self, el: &FakeElement) -> bool {
        el.visible
            && !el.hidden
            && el.visible_at.is_none_or(|at| Instant::now() >= at)
            && el.gone_at.is_none_or(|at| Instant::now() < at)
    }

    fn reload(&mut self) {
        self.generation += 1;
        for el in &mut self.elements {
            el.hidden = false;
            el.value.clear();
        }
        let ids: Vec<u64> = self.elements.iter().map(|e| e.id).collect();
        for id in ids {
            self.revalidate(id);
        }
    }

    fn live(&mut self, handle: &ElementHandle, op: &'static str) -> Result<u64, BackendError> {
        if handle.generation != self.generation {
            return Err(BackendError::ElementStale { id: handle.id });
        }
        let present = match self.elements.get((handle.id.wrapping_sub(1)) as usize) {
            Some(el) => self.present(el),
            None => false,
        };
        if !present {
            return Err(BackendError::ElementNotFound { id: handle.id });
        }
        self.calls.push(format!("{} #{}", op, handle.id));
        if let Some(err) = self.get(handle.id).failures.get(op) {
            return Err(err.clone());
        }
        Ok(handle.id)
    }

    fn intercepted(&self, id: u64) -> Option<BackendError> {
        let el = self.get(id);
        let cover = el.covered_by?;
        if self.is_shown(self.get(cover)) {
            return Some(BackendError::ClickIntercepted {
                id,
                reason: format!("element #{} would receive the click", cover),
            });
        }
        None
    }

    fn set_value(&mut self, id: u64, value: String) {
        self.el(id).value = value;
        self.revalidate(id);
    }

    fn revalidate(&mut self, id: u64) {
        let el = self.get(id).clone();
        if let Some((indicator, accepted)) = el.validation {
            let rejected = !el.value.is_empty() && !accepted.contains(&el.value);
            self.el(indicator).visible = rejected;
        }
    }
}

pub struct FakeBackend {
    pub dom: Arc<Mutex<FakeDom>>,
}

impl FakeBackend {
    fn dom(&self) -> MutexGuard<'_, FakeDom> {
        self.dom.lock().unwrap()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        let mut dom = self.dom();
        if dom.fail_launch {
            return Err(BackendError::NotReady);
        }
        dom.launched = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        let mut dom = self.dom();
        dom.launched = false;
        dom.closes += 1;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.dom().launched
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        let mut dom = self.dom();
        dom.calls.push(format!("navigate {}", url));
        dom.url = url.to_string();
        dom.reload();
        Ok(NavigationResult {
            url: dom.url.clone(),
            title: dom.title.clone(),
            status: 200,
        })
    }

    async fn refresh(&mut self) -> Result<NavigationResult, BackendError> {
        let mut dom = self.dom();
        dom.calls.push("refresh".to_string());
        dom.refreshes += 1;
        dom.reload();
        Ok(NavigationResult {
            url: dom.url.clone(),
            title: dom.title.clone(),
            status: 200,
        })
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        Ok(self.dom().url.clone())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError> {
        let mut dom = self.dom();
        if dom.fail_screenshot {
            return Err(BackendError::Other("screenshot unavailable".into()));
        }
        dom.screenshots += 1;
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn find_elements(
        &mut self,
        locator: &LocatorCandidate,
    ) -> Result<Vec<ElementHandle>, BackendError> {
        let dom = self.dom();
        let key = key(locator);
        if dom.invalid_selectors.contains(&key) {
            return Err(BackendError::SelectorInvalid { selector: key });
        }
        Ok(dom
            .elements
            .iter()
            .filter(|el| dom.present(el) && el.locators.contains(&key))
            .map(|el| ElementHandle {
                id: el.id,
                generation: dom.generation,
            })
            .collect())
    }

    async fn inspect(&mut self, element: &ElementHandle) -> Result<ElementState, BackendError> {
        let mut dom = self.dom();
        if element.generation != dom.generation {
            return Err(BackendError::ElementStale { id: element.id });
        }
        let el = dom.get(element.id).clone();
        let visible = dom.is_shown(&el);
        dom.calls.push(format!("inspect #{}", element.id));
        Ok(ElementState {
            rect: Rect::new(0.0, el.id as f64 * 40.0, 120.0, 32.0),
            visible,
            enabled: el.enabled,
        })
    }

    async fn text(&mut self, element: &ElementHandle) -> Result<String, BackendError> {
        let mut dom = self.dom();
        let id = dom.live(element, "text")?;
        Ok(dom.get(id).text.clone())
    }

    async fn value(&mut self, element: &ElementHandle) -> Result<String, BackendError> {
        let mut dom = self.dom();
        let id = dom.live(element, "value")?;
        Ok(dom.get(id).value.clone())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), BackendError> {
        let mut dom = self.dom();
        let id = dom.live(element, "click")?;
        if let Some(err) = dom.intercepted(id) {
            return Err(err);
        }
        if !dom.is_shown(dom.get(id)) {
            return Err(BackendError::ElementNotInteractable {
                id,
                reason: "element not visible".into(),
            });
        }
        dom.el(id).clicks += 1;
        Ok(())
    }

    async fn send_keys(&mut self, element: &ElementHandle, text: &str) -> Result<(), BackendError> {
        let mut dom = self.dom();
        if text == SELECT_ALL_THEN_DELETE {
            let id = dom.live(element, "select_all_delete")?;
            if !dom.get(id).ignored.contains("select_all_delete") {
                dom.set_value(id, String::new());
            }
            return Ok(());
        }
        let id = dom.live(element, "send_keys")?;
        dom.calls.push(format!("typed {}", text));
        if !dom.get(id).ignored.contains("send_keys") {
            let value = format!("{}{}", dom.get(id).value, text);
            dom.set_value(id, value);
        }
        Ok(())
    }

    async fn clear(&mut self, element: &ElementHandle) -> Result<(), BackendError> {
        let mut dom = self.dom();
        let id = dom.live(element, "clear")?;
        if !dom.get(id).ignored.contains("clear") {
            dom.set_value(id, String::new());
        }
        Ok(())
    }

    async fn hover_click(&mut self, element: &ElementHandle) -> Result<(), BackendError> {
        let mut dom = self.dom();
        let id = dom.live(element, "hover_click")?;
        if let Some(err) = dom.intercepted(id) {
            return Err(err);
        }
        dom.el(id).clicks += 1;
        Ok(())
    }

    async fn script_click(&mut self, element: &ElementHandle) -> Result<(), BackendError> {
        let mut dom = self.dom();
        let id = dom.live(element, "script_click")?;
        dom.el(id).clicks += 1;
        Ok(())
    }

    async fn scroll_into_center(&mut self, element: &ElementHandle) -> Result<(), BackendError> {
        let mut dom = self.dom();
        dom.live(element, "scroll")?;
        Ok(())
    }

    async fn hide_element(&mut self, element: &ElementHandle) -> Result<String, BackendError> {
        let mut dom = self.dom();
        let id = dom.live(element, "hide")?;
        dom.el(id).hidden = true;
        Ok("visible".to_string())
    }

    async fn restore_visibility(
        &mut self,
        element: &ElementHandle,
        _previous: &str,
    ) -> Result<(), BackendError> {
        let mut dom = self.dom();
        let id = dom.live(element, "restore")?;
        dom.el(id).hidden = false;
        Ok(())
    }

    async fn set_value(&mut self, element: &ElementHandle, value: &str) -> Result<(), BackendError> {
        let mut dom = self.dom();
        let id = dom.live(element, "set_value")?;
        if !dom.get(id).ignored.contains("set_value") {
            dom.set_value(id, value.to_string());
        }
        Ok(())
    }

    async fn dispatch_event(
        &mut self,
        element: &ElementHandle,
        event: SyntheticEvent,
    ) -> Result<(), BackendError> {
        let mut dom = self.dom();
        let id = dom.live(element, "dispatch_event")?;
        dom.calls.push(format!("event {}", event.dom_name()));
        if event == SyntheticEvent::Click {
            dom.el(id).clicks += 1;
        }
        Ok(())
    }
}

/// Short timeouts so tests run quickly under the paused clock.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        resolve_timeout_ms: 2000,
        candidate_timeout_ms: 500,
        poll_interval_ms: 100,
        settle_timeout_ms: 400,
        probe_settle_ms: 0,
        clear_verify_timeout_ms: 200,
        occluders: vec![LocatorCandidate::css("header")],
        ..EngineConfig::default()
    }
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}
