//! The interaction techniques the executor escalates through.
//!
//! Each technique is a strategy object; [`ActionExecutor`](crate::executor::ActionExecutor)
//! iterates them in ladder order and stops at the first success.

use crate::backend::Backend;
use crate::resolution::ResolvedElement;
use async_trait::async_trait;
use grapple_common::error::backend_error::BackendError;
use grapple_common::locator::LocatorCandidate;
use grapple_common::protocol::{Action, ElementHandle, SyntheticEvent, Technique};
use tracing::{debug, warn};

/// Per-call inputs shared by all techniques.
#[derive(Debug, Clone, Copy)]
pub struct TechniqueContext<'a> {
    /// Locators of elements that may cover the target (fixed headers, banners).
    pub occluders: &'a [LocatorCandidate],
}

#[async_trait]
pub trait ActionTechnique: Send + Sync {
    fn technique(&self) -> Technique;

    async fn attempt(
        &self,
        backend: &mut dyn Backend,
        element: &ResolvedElement,
        action: &Action,
        ctx: &TechniqueContext<'_>,
    ) -> Result<(), BackendError>;
}

/// The full ladder in escalation order.
pub fn default_ladder() -> Vec<Box<dyn ActionTechnique>> {
    vec![
        Box::new(Native),
        Box::new(ScriptClick),
        Box::new(ScrollThenClick),
        Box::new(HideOccluderThenClick),
        Box::new(HoverThenClick),
        Box::new(SyntheticEventDispatch),
    ]
}

async fn native(
    backend: &mut dyn Backend,
    el: &ElementHandle,
    action: &Action,
) -> Result<(), BackendError> {
    match action {
        Action::Click => backend.click(el).await,
        Action::Type(text) => backend.send_keys(el, text).await,
        Action::Clear => backend.clear(el).await,
    }
}

/// Driver-native click, key input or clear.
pub struct Native;

#[async_trait]
impl ActionTechnique for Native {
    fn technique(&self) -> Technique {
        Technique::Native
    }

    async fn attempt(
        &self,
        backend: &mut dyn Backend,
        element: &ResolvedElement,
        action: &Action,
        _ctx: &TechniqueContext<'_>,
    ) -> Result<(), BackendError> {
        native(backend, &element.handle, action).await
    }
}

/// `HTMLElement.click()` through the scripting bridge. Type and clear assign the
/// value directly.
pub struct ScriptClick;

#[async_trait]
impl ActionTechnique for ScriptClick {
    fn technique(&self) -> Technique {
        Technique::ScriptClick
    }

    async fn attempt(
        &self,
        backend: &mut dyn Backend,
        element: &ResolvedElement,
        action: &Action,
        _ctx: &TechniqueContext<'_>,
    ) -> Result<(), BackendError> {
        match action {
            Action::Click => backend.script_click(&element.handle).await,
            Action::Type(text) => backend.set_value(&element.handle, text).await,
            Action::Clear => backend.set_value(&element.handle, "").await,
        }
    }
}

pub struct ScrollThenClick;

#[async_trait]
impl ActionTechnique for ScrollThenClick {
    fn technique(&self) -> Technique {
        Technique::ScrollThenClick
    }

    async fn attempt(
        &self,
        backend: &mut dyn Backend,
        element: &ResolvedElement,
        action: &Action,
        _ctx: &TechniqueContext<'_>,
    ) -> Result<(), BackendError> {
        backend.scroll_into_center(&element.handle).await?;
        native(backend, &element.handle, action).await
    }
}

/// Hides every visible occluder, retries natively, then restores what it hid.
pub struct HideOccluderThenClick;

impl HideOccluderThenClick {
    async fn hide_all(
        backend: &mut dyn Backend,
        target: &ElementHandle,
        occluders: &[LocatorCandidate],
        hidden: &mut Vec<(ElementHandle, String)>,
    ) -> Result<(), BackendError> {
        for locator in occluders {
            let handles = match backend.find_elements(locator).await {
                Ok(handles) => handles,
                Err(BackendError::SelectorInvalid { .. }) => continue,
                Err(e) => return Err(e),
            };
            for handle in handles {
                if handle == *target {
                    continue;
                }
                match backend.inspect(&handle).await {
                    Ok(state) if state.visible => {}
                    Ok(_) => continue,
                    Err(e) if e.is_stale() => continue,
                    Err(e) => return Err(e),
                }
                let previous = backend.hide_element(&handle).await?;
                debug!(occluder = %locator, handle = %handle, "Hid occluder");
                hidden.push((handle, previous));
            }
        }
        Ok(())
    }

    async fn restore_all(backend: &mut dyn Backend, hidden: Vec<(ElementHandle, String)>) {
        for (handle, previous) in hidden.into_iter().rev() {
            if let Err(e) = backend.restore_visibility(&handle, &previous).await {
                warn!(handle = %handle, error_kind = e.code(), "Failed to restore occluder: {}", e);
            }
        }
    }
}

#[async_trait]
impl ActionTechnique for HideOccluderThenClick {
    fn technique(&self) -> Technique {
        Technique::HideOccluderThenClick
    }

    async fn attempt(
        &self,
        backend: &mut dyn Backend,
        element: &ResolvedElement,
        action: &Action,
        ctx: &TechniqueContext<'_>,
    ) -> Result<(), BackendError> {
        let mut hidden = Vec::new();
        let result = match Self::hide_all(backend, &element.handle, ctx.occluders, &mut hidden).await
        {
            Ok(()) if hidden.is_empty() => Err(BackendError::ElementNotInteractable {
                id: element.handle.id,
                reason: "no occluder present".into(),
            }),
            Ok(()) => native(backend, &element.handle, action).await,
            Err(e) => Err(e),
        };
        // Restore on every path, including partial hides.
        Self::restore_all(backend, hidden).await;
        result
    }
}

/// Pointer move onto the element, then click, through the input actions pipeline.
/// Clicks only: a pointer click followed by separate key input could leave the
/// click's effect behind when the keys fail.
pub struct HoverThenClick;

#[async_trait]
impl ActionTechnique for HoverThenClick {
    fn technique(&self) -> Technique {
        Technique::HoverThenClick
    }

    async fn attempt(
        &self,
        backend: &mut dyn Backend,
        element: &ResolvedElement,
        action: &Action,
        _ctx: &TechniqueContext<'_>,
    ) -> Result<(), BackendError> {
        match action {
            Action::Click => backend.hover_click(&element.handle).await,
            Action::Type(_) | Action::Clear => Err(BackendError::NotSupported(format!(
                "{} through a pointer click",
                action.name()
            ))),
        }
    }
}

/// Raw DOM events, bypassing hit-testing entirely.
pub struct SyntheticEventDispatch;

#[async_trait]
impl ActionTechnique for SyntheticEventDispatch {
    fn technique(&self) -> Technique {
        Technique::SyntheticEvent
    }

    async fn attempt(
        &self,
        backend: &mut dyn Backend,
        element: &ResolvedElement,
        action: &Action,
        _ctx: &TechniqueContext<'_>,
    ) -> Result<(), BackendError> {
        let el = &element.handle;
        match action {
            Action::Click => backend.dispatch_event(el, SyntheticEvent::Click).await,
            // `set_value` fires `input` and `change` itself.
            Action::Type(text) => {
                backend.dispatch_event(el, SyntheticEvent::Focus).await?;
                backend.set_value(el, text).await?;
                backend.dispatch_event(el, SyntheticEvent::Blur).await
            }
            Action::Clear => {
                backend.dispatch_event(el, SyntheticEvent::Focus).await?;
                backend.set_value(el, "").await?;
                backend.dispatch_event(el, SyntheticEvent::Blur).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder_order() {
        let order: Vec<Technique> = default_ladder().iter().map(|t| t.technique()).collect();
        assert_eq!(order, Technique::LADDER.to_vec());
    }
}
