//! Escalating action execution.
//!
//! `ActionExecutor::act` runs one action against a resolved element by trying each
//! technique of the ladder in order until one succeeds:
//! native → script click → scroll then click → hide occluder then click →
//! hover then click → synthetic event.
//!
//! Technique failures are collected into the [`ActionOutcome`]. Two kinds of
//! failure end the ladder early: a stale handle (re-resolution is the caller's job)
//! and errors that mean the browser session itself is gone.

use crate::backend::Backend;
use crate::error::EngineError;
use crate::resolution::ResolvedElement;
use crate::technique::{ActionTechnique, TechniqueContext, default_ladder};
use grapple_common::locator::LocatorCandidate;
use grapple_common::protocol::{Action, ActionOutcome, ErrorDetail, Technique, TechniqueFailure};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct ActionOptions {
    /// Highest technique to try; `None` runs the whole ladder.
    pub max_technique: Option<Technique>,
    /// Replaces the executor's configured occluders for this call.
    pub occluders: Option<Vec<LocatorCandidate>>,
}

impl ActionOptions {
    pub fn up_to(technique: Technique) -> Self {
        Self {
            max_technique: Some(technique),
            ..Default::default()
        }
    }

    pub fn with_occluders(mut self, occluders: Vec<LocatorCandidate>) -> Self {
        self.occluders = Some(occluders);
        self
    }
}

pub struct ActionExecutor {
    techniques: Vec<Box<dyn ActionTechnique>>,
    occluders: Vec<LocatorCandidate>,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ActionExecutor {
    pub fn new(occluders: Vec<LocatorCandidate>) -> Self {
        Self {
            techniques: default_ladder(),
            occluders,
        }
    }

    /// Executor with a custom ladder, tried in the given order.
    pub fn with_techniques(
        techniques: Vec<Box<dyn ActionTechnique>>,
        occluders: Vec<LocatorCandidate>,
    ) -> Self {
        Self {
            techniques,
            occluders,
        }
    }

    pub fn occluders(&self) -> &[LocatorCandidate] {
        &self.occluders
    }

    pub fn techniques(&self) -> impl Iterator<Item = Technique> + '_ {
        self.techniques.iter().map(|t| t.technique())
    }

    /// Run `action` through the ladder.
    ///
    /// Returns `Ok` with `succeeded == false` when every technique failed; use
    /// [`OutcomeExt::into_result`] to escalate that. Returns `Err` only for a stale
    /// element or a lost session.
    pub async fn act(
        &self,
        backend: &mut dyn Backend,
        element: &ResolvedElement,
        action: &Action,
        options: &ActionOptions,
    ) -> Result<ActionOutcome, EngineError> {
        let ctx = TechniqueContext {
            occluders: options.occluders.as_deref().unwrap_or(&self.occluders),
        };
        let mut failures = Vec::new();

        for technique in &self.techniques {
            let kind = technique.technique();
            if options.max_technique.is_some_and(|max| kind > max) {
                break;
            }

            match technique.attempt(backend, element, action, &ctx).await {
                Ok(()) => {
                    if failures.is_empty() {
                        debug!(target_name = %element.target, technique = %kind, action = action.name(), "Action succeeded");
                    } else {
                        info!(
                            target_name = %element.target,
                            technique = %kind,
                            action = action.name(),
                            attempts = failures.len() + 1,
                            "Action succeeded after escalation"
                        );
                    }
                    return Ok(ActionOutcome::success(kind, failures));
                }
                Err(e) if e.is_stale() => {
                    warn!(target_name = %element.target, technique = %kind, error_kind = e.code(), "Element went stale");
                    return Err(EngineError::StaleReference {
                        target: element.target.clone(),
                    });
                }
                Err(e) if e.is_session_fatal() => return Err(EngineError::Backend(e)),
                Err(e) => {
                    warn!(
                        target_name = %element.target,
                        technique = %kind,
                        action = action.name(),
                        error_kind = e.code(),
                        "Technique failed: {}",
                        e
                    );
                    failures.push(TechniqueFailure {
                        technique: kind,
                        error: ErrorDetail::from(&e),
                    });
                }
            }
        }

        Ok(ActionOutcome::exhausted(failures))
    }
}

pub trait OutcomeExt {
    /// Escalate an exhausted outcome to [`EngineError::InteractionExhausted`].
    fn into_result(self, target: &str, action: &Action) -> Result<ActionOutcome, EngineError>;
}

impl OutcomeExt for ActionOutcome {
    fn into_result(self, target: &str, action: &Action) -> Result<ActionOutcome, EngineError> {
        if self.succeeded {
            Ok(self)
        } else {
            Err(EngineError::InteractionExhausted {
                target: target.to_string(),
                action: action.name().to_string(),
                failures: self.failures,
            })
        }
    }
}
