use grapple_common::protocol::ElementState;
use serde::{Deserialize, Serialize};

/// Which matched elements count as resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityFilter {
    pub require_visible: bool,
    pub require_enabled: bool,
}

impl Default for VisibilityFilter {
    fn default() -> Self {
        Self {
            require_visible: true,
            require_enabled: true,
        }
    }
}

impl VisibilityFilter {
    /// Any attached element, hidden or disabled.
    pub fn present() -> Self {
        Self {
            require_visible: false,
            require_enabled: false,
        }
    }

    /// Visible, enabled or not.
    pub fn visible() -> Self {
        Self {
            require_visible: true,
            require_enabled: false,
        }
    }

    pub fn accepts(&self, state: &ElementState) -> bool {
        (!self.require_visible || state.visible) && (!self.require_enabled || state.enabled)
    }
}
