//! Waiting for server-populated dropdowns.
//!
//! Some dropdowns render their trigger long before the option data arrives, and
//! occasionally never receive it until the page is reloaded. The waiter opens the
//! dropdown, watches the option list for the settle timeout, and when nothing but
//! placeholders shows up reloads the page and asks the caller to get back to the
//! same screen. Reloads are bounded by `max_refreshes`.

use crate::backend::Backend;
use crate::config::{ConfigError, EngineConfig};
use crate::error::EngineError;
use crate::executor::ActionOptions;
use crate::resolution::{ResolvedElement, VisibilityFilter};
use crate::session::SessionContext;
use crate::wait::Deadline;
use async_trait::async_trait;
use grapple_common::locator::LocatorChain;
use grapple_common::protocol::{Action, DropdownReadiness, ElementHandle};
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A dropdown: the element that opens it and the elements that are its options.
#[derive(Debug, Clone)]
pub struct DropdownTarget {
    pub trigger: LocatorChain,
    pub options: LocatorChain,
}

impl DropdownTarget {
    pub fn new(trigger: LocatorChain, options: LocatorChain) -> Self {
        Self { trigger, options }
    }

    pub fn name(&self) -> &str {
        self.trigger.name()
    }
}

/// Brings the session back to the page holding the dropdown after a reload.
#[async_trait]
pub trait Renavigate<B: Backend>: Send {
    async fn renavigate(&mut self, session: &mut SessionContext<B>) -> Result<(), EngineError>;
}

/// Re-navigate by loading a fixed URL.
#[derive(Debug, Clone)]
pub struct NavigateTo(pub String);

#[async_trait]
impl<B: Backend> Renavigate<B> for NavigateTo {
    async fn renavigate(&mut self, session: &mut SessionContext<B>) -> Result<(), EngineError> {
        session.navigate(&self.0).await?;
        Ok(())
    }
}

/// The reload alone lands back on the right screen.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRenavigate;

#[async_trait]
impl<B: Backend> Renavigate<B> for NoRenavigate {
    async fn renavigate(&mut self, _session: &mut SessionContext<B>) -> Result<(), EngineError> {
        Ok(())
    }
}

#[derive(Debug)]
enum Phase {
    Closed,
    Opened,
    Inspected(Vec<DropdownOption>),
    Populated(Vec<DropdownOption>),
    Empty,
}

/// One real (non-placeholder) option currently displayed.
#[derive(Debug, Clone)]
pub struct DropdownOption {
    pub handle: ElementHandle,
    pub text: String,
    pub candidate_index: usize,
}

#[derive(Debug, Clone)]
pub struct DropdownReadinessWaiter {
    pub max_refreshes: u32,
    pub settle_timeout: Duration,
    pub poll_interval: Duration,
    placeholders: Vec<Regex>,
}

impl DropdownReadinessWaiter {
    pub fn new(
        max_refreshes: u32,
        settle_timeout: Duration,
        poll_interval: Duration,
        placeholders: Vec<Regex>,
    ) -> Self {
        Self {
            max_refreshes,
            settle_timeout,
            poll_interval,
            placeholders,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.max_refreshes,
            config.settle_timeout(),
            config.poll_interval(),
            config.compiled_placeholders()?,
        ))
    }

    pub fn is_placeholder(&self, text: &str) -> bool {
        let text = text.trim();
        self.placeholders.iter().any(|p| p.is_match(text))
    }

    /// Open the dropdown until it shows real options, reloading at most
    /// `max_refreshes` times.
    pub async fn wait<B: Backend>(
        &self,
        session: &mut SessionContext<B>,
        target: &DropdownTarget,
        renavigate: &mut dyn Renavigate<B>,
    ) -> Result<DropdownReadiness, EngineError> {
        self.wait_for_options(session, target, renavigate)
            .await
            .map(|(readiness, _)| readiness)
    }

    /// Wait for readiness, then click the option whose text equals `option`
    /// (falling back to the first that contains it). `None` picks the first real option.
    pub async fn select_option<B: Backend>(
        &self,
        session: &mut SessionContext<B>,
        target: &DropdownTarget,
        option: Option<&str>,
        renavigate: &mut dyn Renavigate<B>,
    ) -> Result<DropdownReadiness, EngineError> {
        let (readiness, options) = self.wait_for_options(session, target, renavigate).await?;

        let chosen = match option {
            None => options.first(),
            Some(wanted) => {
                let wanted = wanted.trim();
                options
                    .iter()
                    .find(|o| o.text == wanted)
                    .or_else(|| options.iter().find(|o| o.text.contains(wanted)))
            }
        };
        let Some(chosen) = chosen else {
            return Err(EngineError::OptionNotFound {
                target: target.name().to_string(),
                option: option.unwrap_or_default().to_string(),
                available: options.into_iter().map(|o| o.text).collect(),
            });
        };

        let state = session
            .backend
            .inspect(&chosen.handle)
            .await
            .map_err(|e| EngineError::from_backend(e, target.options.name()))?;
        let description = target
            .options
            .get(chosen.candidate_index)
            .map(|c| c.description.clone())
            .unwrap_or_default();
        let element = ResolvedElement::new(
            chosen.handle,
            target.options.name(),
            chosen.candidate_index,
            &description,
            state,
            session.epoch(),
        );
        session
            .act_inner(&element, &Action::Click, &ActionOptions::default())
            .await?;
        info!(target_name = %target.name(), option = %chosen.text, "Selected option");
        Ok(readiness)
    }

    async fn wait_for_options<B: Backend>(
        &self,
        session: &mut SessionContext<B>,
        target: &DropdownTarget,
        renavigate: &mut dyn Renavigate<B>,
    ) -> Result<(DropdownReadiness, Vec<DropdownOption>), EngineError> {
        let mut refresh_count = 0u32;
        let mut phase = Phase::Closed;

        loop {
            phase = match phase {
                Phase::Closed => {
                    let timeout = session.config.resolve_timeout();
                    let trigger = session
                        .resolve_inner(&target.trigger, timeout, VisibilityFilter::default())
                        .await?;
                    session
                        .act_inner(&trigger, &Action::Click, &ActionOptions::default())
                        .await?;
                    Phase::Opened
                }
                Phase::Opened => {
                    let deadline = Deadline::after(self.settle_timeout, self.poll_interval);
                    let mut options = self.populated_options(session, &target.options).await?;
                    while options.is_empty() && deadline.tick().await {
                        options = self.populated_options(session, &target.options).await?;
                    }
                    Phase::Inspected(options)
                }
                Phase::Inspected(options) if options.is_empty() => Phase::Empty,
                Phase::Inspected(options) => Phase::Populated(options),
                Phase::Populated(options) => {
                    let readiness = DropdownReadiness {
                        option_count: options.len(),
                        is_populated: true,
                        refresh_count,
                    };
                    debug!(
                        target_name = %target.name(),
                        options = readiness.option_count,
                        refresh_count,
                        "Dropdown populated"
                    );
                    return Ok((readiness, options));
                }
                Phase::Empty => {
                    if refresh_count >= self.max_refreshes {
                        warn!(
                            target_name = %target.name(),
                            refresh_count,
                            "Dropdown never populated"
                        );
                        return Err(EngineError::DataUnavailable {
                            target: target.name().to_string(),
                            refreshes: refresh_count,
                        });
                    }
                    refresh_count += 1;
                    info!(
                        target_name = %target.name(),
                        refresh_count,
                        max_refreshes = self.max_refreshes,
                        "Dropdown empty, reloading"
                    );
                    session.refresh_inner().await?;

                    session.nesting += 1;
                    let renavigated = renavigate.renavigate(session).await;
                    session.nesting -= 1;
                    renavigated?;
                    Phase::Closed
                }
            };
        }
    }

    /// Visible options of the first option candidate that shows any, minus placeholders.
    async fn populated_options<B: Backend>(
        &self,
        session: &mut SessionContext<B>,
        options: &LocatorChain,
    ) -> Result<Vec<DropdownOption>, EngineError> {
        for (index, candidate) in options.iter().enumerate() {
            let single = LocatorChain::single(candidate.clone());
            let handles = session
                .resolver
                .count_matches(&mut session.backend, &single, VisibilityFilter::visible())
                .await?;
            if handles.is_empty() {
                continue;
            }

            let mut populated = Vec::new();
            for handle in handles {
                let text = match session.backend.text(&handle).await {
                    Ok(text) => text,
                    Err(e) if e.is_stale() => continue,
                    Err(e) => return Err(e.into()),
                };
                if self.is_placeholder(&text) {
                    continue;
                }
                populated.push(DropdownOption {
                    handle,
                    text: text.trim().to_string(),
                    candidate_index: index,
                });
            }
            return Ok(populated);
        }
        Ok(Vec::new())
    }
}
