//! Probing candidate values against server-side validation.
//!
//! Fields like autocomplete-validated names accept only values that exist in the
//! backing environment. The prober enters candidates one at a time, asks a
//! [`Validate`] implementation whether the page accepted the value, and stops at
//! the first accepted one. Values after it are never entered.

use crate::backend::Backend;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::executor::ActionOptions;
use crate::resolution::{ResolvedElement, VisibilityFilter};
use crate::session::SessionContext;
use crate::wait::Deadline;
use async_trait::async_trait;
use grapple_common::error::backend_error::BackendError;
use grapple_common::locator::LocatorChain;
use grapple_common::protocol::{Action, CandidateProbeResult};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Decides whether the value just entered was accepted.
#[async_trait]
pub trait Validate<B: Backend>: Send {
    async fn is_accepted(
        &mut self,
        session: &mut SessionContext<B>,
        value: &str,
    ) -> Result<bool, EngineError>;
}

/// Rejects a value as soon as an inline "invalid" indicator becomes visible;
/// accepts it once `settle` passes without one.
#[derive(Debug, Clone)]
pub struct InvalidIndicator {
    pub indicator: LocatorChain,
    pub settle: Duration,
}

impl InvalidIndicator {
    pub fn new(indicator: LocatorChain, settle: Duration) -> Self {
        Self { indicator, settle }
    }
}

#[async_trait]
impl<B: Backend> Validate<B> for InvalidIndicator {
    async fn is_accepted(
        &mut self,
        session: &mut SessionContext<B>,
        _value: &str,
    ) -> Result<bool, EngineError> {
        let deadline = Deadline::after(self.settle, session.config.poll_interval());
        loop {
            let shown = session
                .resolver
                .count_matches(&mut session.backend, &self.indicator, VisibilityFilter::visible())
                .await?;
            if !shown.is_empty() {
                debug!(indicator = %self.indicator.name(), "Invalid indicator shown");
                return Ok(false);
            }
            if !deadline.tick().await {
                return Ok(true);
            }
        }
    }
}

/// Adapts a plain predicate on the entered value.
pub struct ValidateFn<F>(pub F);

#[async_trait]
impl<B, F> Validate<B> for ValidateFn<F>
where
    B: Backend,
    F: FnMut(&str) -> bool + Send,
{
    async fn is_accepted(
        &mut self,
        _session: &mut SessionContext<B>,
        value: &str,
    ) -> Result<bool, EngineError> {
        Ok((self.0)(value))
    }
}

/// Ways of emptying a field, tried in order until one verifiably works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearMethod {
    SelectAllDelete,
    NativeClear,
    ScriptReset,
}

impl ClearMethod {
    pub const CHAIN: [ClearMethod; 3] = [
        ClearMethod::SelectAllDelete,
        ClearMethod::NativeClear,
        ClearMethod::ScriptReset,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ClearMethod::SelectAllDelete => "select_all_delete",
            ClearMethod::NativeClear => "native_clear",
            ClearMethod::ScriptReset => "script_reset",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateValueProber {
    pub clear_verify_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for CandidateValueProber {
    fn default() -> Self {
        Self {
            clear_verify_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl CandidateValueProber {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            clear_verify_timeout: config.clear_verify_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    pub async fn probe<B: Backend, S: AsRef<str> + Sync>(
        &self,
        session: &mut SessionContext<B>,
        field: &LocatorChain,
        candidates: &[S],
        validate: &mut dyn Validate<B>,
    ) -> Result<CandidateProbeResult, EngineError> {
        let mut result = CandidateProbeResult::default();

        for value in candidates.iter().map(AsRef::as_ref) {
            let timeout = session.config.resolve_timeout();
            let element = session
                .resolve_inner(field, timeout, VisibilityFilter::default())
                .await?;
            self.clear(session, &element).await?;
            session
                .act_inner(&element, &Action::Type(value.to_string()), &ActionOptions::default())
                .await?;

            session.nesting += 1;
            let accepted = validate.is_accepted(session, value).await;
            session.nesting -= 1;

            if accepted? {
                info!(field = %field.name(), value, rejected = result.rejected_values.len(), "Value accepted");
                result.accept(value);
                return Ok(result);
            }
            debug!(field = %field.name(), value, "Value rejected");
            result.reject(value);
        }

        warn!(field = %field.name(), rejected = ?result.rejected_values, "No candidate value accepted");
        result.mark_exhausted();
        Ok(result)
    }

    /// Empty the field, trying each [`ClearMethod`] until a re-read shows it empty.
    pub async fn clear<B: Backend>(
        &self,
        session: &mut SessionContext<B>,
        element: &ResolvedElement,
    ) -> Result<ClearMethod, EngineError> {
        let backend = &mut session.backend;
        let el = &element.handle;
        let mut attempts = Vec::new();
        let mut remaining = String::new();

        for method in ClearMethod::CHAIN {
            let applied = match method {
                ClearMethod::SelectAllDelete => backend.select_all_delete(el).await,
                ClearMethod::NativeClear => backend.clear(el).await,
                ClearMethod::ScriptReset => backend.set_value(el, "").await,
            };
            match applied {
                Ok(()) => {}
                Err(e) if e.is_stale() || e.is_session_fatal() => {
                    return Err(EngineError::from_backend(e, &element.target));
                }
                Err(e) => {
                    debug!(method = method.name(), error_kind = e.code(), "Clear method failed");
                    attempts.push(format!("{}: {}", method.name(), e));
                    continue;
                }
            }

            let deadline = Deadline::after(self.clear_verify_timeout, self.poll_interval);
            loop {
                remaining = backend
                    .value(el)
                    .await
                    .map_err(|e: BackendError| EngineError::from_backend(e, &element.target))?;
                if remaining.is_empty() {
                    debug!(target_name = %element.target, method = method.name(), "Field cleared");
                    return Ok(method);
                }
                if !deadline.tick().await {
                    break;
                }
            }
            attempts.push(format!("{}: value still {:?}", method.name(), remaining));
        }

        Err(EngineError::ClearFailed {
            target: element.target.clone(),
            remaining,
            attempts,
        })
    }
}

pub trait ProbeResultExt {
    /// The accepted value, or [`EngineError::ProbeExhausted`].
    fn into_accepted(self, field: &str) -> Result<String, EngineError>;
}

impl ProbeResultExt for CandidateProbeResult {
    fn into_accepted(self, field: &str) -> Result<String, EngineError> {
        match self.accepted_value {
            Some(value) => Ok(value),
            None => Err(EngineError::ProbeExhausted {
                field: field.to_string(),
                rejected: self.rejected_values,
            }),
        }
    }
}
