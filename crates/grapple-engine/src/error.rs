use crate::config::ConfigError;
use crate::report::ReportError;
use grapple_common::error::backend_error::BackendError;
use grapple_common::locator::Strategy;
use grapple_common::protocol::TechniqueFailure;
use grapple_common::table::TableError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why one candidate of a chain did not produce a usable element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CandidateFailure {
    /// The locator matched nothing.
    NoMatches,
    /// Elements matched but none passed the visibility filter within the
    /// per-candidate timeout.
    FilteredOut { matched: usize },
    /// The overall deadline ran out while waiting on this candidate.
    TimedOut { matched: usize },
    /// The browser rejected the expression.
    Invalid { message: String },
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateFailure::NoMatches => f.write_str("zero matches"),
            CandidateFailure::FilteredOut { matched } => {
                write!(f, "{} match(es) filtered out", matched)
            }
            CandidateFailure::TimedOut { matched } => {
                write!(f, "timed out with {} filtered match(es)", matched)
            }
            CandidateFailure::Invalid { message } => write!(f, "invalid locator: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAttempt {
    pub index: usize,
    pub strategy: Strategy,
    pub expression: String,
    pub description: String,
    pub failure: CandidateFailure,
}

impl fmt::Display for CandidateAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.index, self.description, self.failure)
    }
}

/// No candidate of a chain resolved in time. Lists every candidate attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotFoundError {
    pub target: String,
    pub timeout_ms: u64,
    pub attempts: Vec<CandidateAttempt>,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' not found within {}ms after {} candidate(s)",
            self.target,
            self.timeout_ms,
            self.attempts.len()
        )?;
        for attempt in &self.attempts {
            write!(f, "; {}", attempt)?;
        }
        Ok(())
    }
}

impl std::error::Error for NotFoundError {}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("All {} interaction technique(s) failed to {action} '{target}'", .failures.len())]
    InteractionExhausted {
        target: String,
        action: String,
        failures: Vec<TechniqueFailure>,
    },

    #[error("Could not clear '{target}', value still {remaining:?}")]
    ClearFailed {
        target: String,
        remaining: String,
        attempts: Vec<String>,
    },

    #[error("Element '{target}' is stale; re-resolve it after navigation")]
    StaleReference { target: String },

    #[error("Dropdown '{target}' had no options after {refreshes} refresh(es)")]
    DataUnavailable { target: String, refreshes: u32 },

    #[error("No candidate value accepted by '{field}' (rejected: {})", .rejected.join(", "))]
    ProbeExhausted { field: String, rejected: Vec<String> },

    #[error("Option '{option}' not found in dropdown '{target}'")]
    OptionNotFound {
        target: String,
        option: String,
        available: Vec<String>,
    },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::InteractionExhausted { .. } => "INTERACTION_EXHAUSTED",
            EngineError::ClearFailed { .. } => "CLEAR_FAILED",
            EngineError::StaleReference { .. } => "STALE_REFERENCE",
            EngineError::DataUnavailable { .. } => "DATA_UNAVAILABLE",
            EngineError::ProbeExhausted { .. } => "PROBE_EXHAUSTED",
            EngineError::OptionNotFound { .. } => "OPTION_NOT_FOUND",
            EngineError::Table(_) => "UNKNOWN_ELEMENT",
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::Report(_) => "REPORT_ERROR",
            EngineError::Backend(e) => e.code(),
        }
    }

    /// Every candidate, technique or value tried before giving up, for logs and reports.
    pub fn attempted(&self) -> Vec<String> {
        match self {
            EngineError::NotFound(e) => e.attempts.iter().map(ToString::to_string).collect(),
            EngineError::InteractionExhausted { failures, .. } => {
                failures.iter().map(ToString::to_string).collect()
            }
            EngineError::ClearFailed { attempts, .. } => attempts.clone(),
            EngineError::ProbeExhausted { rejected, .. } => {
                rejected.iter().map(|v| format!("{}: rejected", v)).collect()
            }
            EngineError::OptionNotFound { available, .. } => {
                available.iter().map(|o| format!("option {:?}", o)).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl EngineError {
    pub(crate) fn from_backend(err: BackendError, target: &str) -> Self {
        if err.is_stale() {
            EngineError::StaleReference {
                target: target.to_string(),
            }
        } else {
            EngineError::Backend(err)
        }
    }
}
