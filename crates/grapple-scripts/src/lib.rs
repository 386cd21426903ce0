//! JavaScript snippets run through the WebDriver scripting bridge.
//!
//! Every snippet takes the target element as `arguments[0]`. Snippets that act on an
//! element throw a "stale element reference" error when it has left the document, so
//! backends can map the failure the same way as a native stale-element response.

/// Click through `HTMLElement.click()`, bypassing native event dispatch.
pub const SCRIPT_CLICK_JS: &str = include_str!("js/script_click.js");

/// Scroll the element to the centre of the viewport. Returns whether it is now in view.
pub const SCROLL_INTO_CENTER_JS: &str = include_str!("js/scroll_into_center.js");

/// Hide an occluding element. Returns its previous inline `visibility`.
pub const HIDE_ELEMENT_JS: &str = include_str!("js/hide_element.js");

/// Restore the inline `visibility` captured by [`HIDE_ELEMENT_JS`] (`arguments[1]`).
pub const RESTORE_VISIBILITY_JS: &str = include_str!("js/restore_visibility.js");

/// Assign `arguments[1]` as the element's value and fire `input` + `change`.
pub const SET_VALUE_JS: &str = include_str!("js/set_value.js");

/// Dispatch a bubbling DOM event named by `arguments[1]`.
pub const DISPATCH_EVENT_JS: &str = include_str!("js/dispatch_event.js");
