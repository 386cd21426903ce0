use grapple_common::protocol::{ElementHandle, ElementState, Rect};

/// An element found through a chain, valid only for the navigation epoch it was
/// resolved in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedElement {
    pub handle: ElementHandle,
    /// Logical name of the chain that produced this element.
    pub target: String,
    pub matched_candidate_index: usize,
    /// Description of the matching candidate.
    pub description: String,
    pub bounding_box: Rect,
    pub is_visible: bool,
    pub is_enabled: bool,
    pub epoch: u64,
}

impl ResolvedElement {
    pub(crate) fn new(
        handle: ElementHandle,
        target: &str,
        index: usize,
        description: &str,
        state: ElementState,
        epoch: u64,
    ) -> Self {
        Self {
            handle,
            target: target.to_string(),
            matched_candidate_index: index,
            description: description.to_string(),
            bounding_box: state.rect,
            is_visible: state.visible,
            is_enabled: state.enabled,
            epoch,
        }
    }
}
