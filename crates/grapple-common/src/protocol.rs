use crate::error::backend_error::BackendError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to a live DOM element issued by a backend.
///
/// `generation` is the backend's document generation at issue time; once the page is
/// reloaded or navigated, every older handle is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    pub id: u64,
    pub generation: u64,
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.id, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Live state of an element as read from the DOM.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementState {
    pub rect: Rect,
    pub visible: bool,
    pub enabled: bool,
}

/// What the caller wants done to an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "text", rename_all = "snake_case")]
pub enum Action {
    Click,
    Type(String),
    Clear,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::Type(_) => "type",
            Action::Clear => "clear",
        }
    }
}

/// Interaction techniques in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    Native,
    ScriptClick,
    ScrollThenClick,
    HideOccluderThenClick,
    HoverThenClick,
    SyntheticEvent,
}

impl Technique {
    pub const LADDER: [Technique; 6] = [
        Technique::Native,
        Technique::ScriptClick,
        Technique::ScrollThenClick,
        Technique::HideOccluderThenClick,
        Technique::HoverThenClick,
        Technique::SyntheticEvent,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Technique::Native => "native",
            Technique::ScriptClick => "script_click",
            Technique::ScrollThenClick => "scroll_then_click",
            Technique::HideOccluderThenClick => "hide_occluder_then_click",
            Technique::HoverThenClick => "hover_then_click",
            Technique::SyntheticEvent => "synthetic_event",
        }
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw DOM events the synthetic-event technique can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntheticEvent {
    Click,
    Focus,
    Blur,
}

impl SyntheticEvent {
    pub fn dom_name(&self) -> &'static str {
        match self {
            SyntheticEvent::Click => "click",
            SyntheticEvent::Focus => "focus",
            SyntheticEvent::Blur => "blur",
        }
    }
}

/// Serializable summary of an error, for outcomes and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl From<&BackendError> for ErrorDetail {
    fn from(err: &BackendError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechniqueFailure {
    pub technique: Technique,
    pub error: ErrorDetail,
}

impl fmt::Display for TechniqueFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.technique, self.error)
    }
}

/// Result of running the technique ladder against one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub succeeded: bool,
    pub technique_used: Option<Technique>,
    /// Techniques tried, including the successful one.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<TechniqueFailure>,
}

impl ActionOutcome {
    pub fn success(technique: Technique, failures: Vec<TechniqueFailure>) -> Self {
        Self {
            succeeded: true,
            technique_used: Some(technique),
            attempts: failures.len() as u32 + 1,
            error: None,
            failures,
        }
    }

    pub fn exhausted(failures: Vec<TechniqueFailure>) -> Self {
        let error = failures.last().map(|f| f.error.clone());
        Self {
            succeeded: false,
            technique_used: None,
            attempts: failures.len() as u32,
            error,
            failures,
        }
    }
}

/// Readiness of a dropdown's option list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DropdownReadiness {
    pub option_count: usize,
    pub is_populated: bool,
    pub refresh_count: u32,
}

/// Outcome of probing candidate values against a validated field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CandidateProbeResult {
    pub accepted_value: Option<String>,
    pub rejected_values: Vec<String>,
    pub exhausted: bool,
}

impl CandidateProbeResult {
    pub fn reject(&mut self, value: impl Into<String>) {
        self.rejected_values.push(value.into());
    }

    /// Records the accepted value. Returns false if one was already set.
    pub fn accept(&mut self, value: impl Into<String>) -> bool {
        if self.accepted_value.is_some() {
            return false;
        }
        self.accepted_value = Some(value.into());
        self.exhausted = false;
        true
    }

    pub fn mark_exhausted(&mut self) {
        if self.accepted_value.is_none() {
            self.exhausted = true;
        }
    }
}
