//! One browser session and everything the engine needs to drive it.
//!
//! A `SessionContext` owns exactly one [`Backend`]. Every operation takes
//! `&mut self`, so operations on a session are strictly sequential. Navigation
//! and reloads bump the session's epoch; a [`ResolvedElement`] from an older epoch
//! is rejected before it reaches the browser.
//!
//! Failures surfaced from the public operations are logged with everything that
//! was attempted and, when a [`ScreenshotSink`] is attached, captured as a
//! screenshot whose path is kept until [`SessionContext::take_artifacts`].

use crate::backend::{Backend, NavigationResult};
use crate::config::EngineConfig;
use crate::dropdown::{DropdownReadinessWaiter, DropdownTarget, Renavigate};
use crate::error::EngineError;
use crate::executor::{ActionExecutor, ActionOptions, OutcomeExt};
use crate::prober::{CandidateValueProber, Validate};
use crate::report::ScreenshotSink;
use crate::resolution::{ElementResolver, ResolvedElement, VisibilityFilter};
use futures::future::BoxFuture;
use grapple_common::formatter::mask_sensitive;
use grapple_common::locator::LocatorChain;
use grapple_common::protocol::{Action, ActionOutcome, CandidateProbeResult, DropdownReadiness};
use grapple_common::table::LocatorTable;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct SessionContext<B: Backend> {
    pub(crate) backend: B,
    pub(crate) config: EngineConfig,
    pub(crate) resolver: ElementResolver,
    pub(crate) executor: ActionExecutor,
    dropdown: Arc<DropdownReadinessWaiter>,
    prober: Arc<CandidateValueProber>,
    screenshots: Option<Arc<dyn ScreenshotSink>>,
    artifacts: Vec<PathBuf>,
    epoch: u64,
    /// Non-zero while a nested operation runs on behalf of another one, so a
    /// failure is reported once, by the outer operation.
    pub(crate) nesting: u32,
    launched: bool,
    torn_down: bool,
}

impl<B: Backend> SessionContext<B> {
    pub fn new(backend: B, config: EngineConfig) -> Result<Self, EngineError> {
        let dropdown = DropdownReadinessWaiter::from_config(&config)?;
        Ok(Self {
            backend,
            resolver: ElementResolver::new(config.candidate_timeout(), config.poll_interval()),
            executor: ActionExecutor::new(config.occluders.clone()),
            dropdown: Arc::new(dropdown),
            prober: Arc::new(CandidateValueProber::from_config(&config)),
            config,
            screenshots: None,
            artifacts: Vec::new(),
            epoch: 0,
            nesting: 0,
            launched: false,
            torn_down: false,
        })
    }

    pub fn with_screenshots(mut self, sink: Arc<dyn ScreenshotSink>) -> Self {
        self.screenshots = Some(sink);
        self
    }

    pub fn with_executor(mut self, executor: ActionExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Navigation counter; bumped by every navigate and refresh.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn is_launched(&self) -> bool {
        self.launched
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn launch(&mut self) -> Result<(), EngineError> {
        if self.launched {
            return Ok(());
        }
        self.backend.launch().await?;
        self.launched = true;
        info!("Session launched");
        Ok(())
    }

    /// Close the browser. Consumes the session, so it runs at most once.
    pub async fn teardown(mut self) -> Result<(), EngineError> {
        self.torn_down = true;
        if !self.launched {
            return Ok(());
        }
        self.launched = false;
        match self.backend.close().await {
            Ok(()) => {
                info!("Session closed");
                Ok(())
            }
            Err(e) => {
                warn!(error_kind = e.code(), "Session close failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Launch, run `f`, and tear down on every exit path.
    ///
    /// ```ignore
    /// let value = session
    ///     .scope(|s| Box::pin(async move { s.read_value(&chain).await }))
    ///     .await?;
    /// ```
    pub async fn scope<T, F>(mut self, f: F) -> Result<T, EngineError>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut Self) -> BoxFuture<'s, Result<T, EngineError>>,
    {
        let result = match self.launch().await {
            Ok(()) => f(&mut self).await,
            Err(e) => Err(e),
        };
        let closed = self.teardown().await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub async fn navigate(&mut self, url: &str) -> Result<NavigationResult, EngineError> {
        let result = self.navigate_inner(url).await;
        self.observe(result, "navigate", url).await
    }

    pub async fn refresh(&mut self) -> Result<NavigationResult, EngineError> {
        let result = self.refresh_inner().await;
        self.observe(result, "refresh", "page").await
    }

    pub(crate) async fn navigate_inner(&mut self, url: &str) -> Result<NavigationResult, EngineError> {
        let result = self.backend.navigate(url).await;
        // The old document is gone even if the new one failed to load.
        self.epoch += 1;
        let nav = result?;
        debug!(url = %nav.url, epoch = self.epoch, "Navigated");
        Ok(nav)
    }

    pub(crate) async fn refresh_inner(&mut self) -> Result<NavigationResult, EngineError> {
        let result = self.backend.refresh().await;
        self.epoch += 1;
        let nav = result?;
        debug!(url = %nav.url, epoch = self.epoch, "Reloaded");
        Ok(nav)
    }

    // ------------------------------------------------------------------
    // Resolution and actions
    // ------------------------------------------------------------------

    /// Resolve with the configured overall timeout.
    pub async fn resolve(
        &mut self,
        chain: &LocatorChain,
        filter: VisibilityFilter,
    ) -> Result<ResolvedElement, EngineError> {
        let timeout = self.config.resolve_timeout();
        self.resolve_within(chain, timeout, filter).await
    }

    pub async fn resolve_within(
        &mut self,
        chain: &LocatorChain,
        timeout: Duration,
        filter: VisibilityFilter,
    ) -> Result<ResolvedElement, EngineError> {
        let result = self.resolve_inner(chain, timeout, filter).await;
        self.observe(result, "resolve", chain.name()).await
    }

    pub async fn resolve_named(
        &mut self,
        table: &LocatorTable,
        name: &str,
        filter: VisibilityFilter,
    ) -> Result<ResolvedElement, EngineError> {
        let chain = match table.get(name) {
            Ok(chain) => chain,
            Err(e) => return self.observe(Err(e.into()), "resolve", name).await,
        };
        self.resolve(chain, filter).await
    }

    /// Act on an element resolved in the current epoch. An outcome is only
    /// returned on success; an exhausted ladder is an error.
    pub async fn act(
        &mut self,
        element: &ResolvedElement,
        action: &Action,
        options: &ActionOptions,
    ) -> Result<ActionOutcome, EngineError> {
        let result = self.act_inner(element, action, options).await;
        self.observe(result, action.name(), &element.target).await
    }

    pub async fn click(&mut self, chain: &LocatorChain) -> Result<ActionOutcome, EngineError> {
        let result = self.resolve_and_act(chain, &Action::Click).await;
        self.observe(result, "click", chain.name()).await
    }

    pub async fn type_text(
        &mut self,
        chain: &LocatorChain,
        text: &str,
    ) -> Result<ActionOutcome, EngineError> {
        debug!(
            target_name = %chain.name(),
            text = %mask_sensitive(text, chain.name(), &self.config.sensitive_fields),
            "Typing"
        );
        let result = self
            .resolve_and_act(chain, &Action::Type(text.to_string()))
            .await;
        self.observe(result, "type", chain.name()).await
    }

    pub async fn clear(&mut self, chain: &LocatorChain) -> Result<ActionOutcome, EngineError> {
        let result = self.resolve_and_act(chain, &Action::Clear).await;
        self.observe(result, "clear", chain.name()).await
    }

    /// Current value of a form control.
    pub async fn read_value(&mut self, chain: &LocatorChain) -> Result<String, EngineError> {
        let result = self.read_value_inner(chain).await;
        self.observe(result, "read_value", chain.name()).await
    }

    async fn read_value_inner(&mut self, chain: &LocatorChain) -> Result<String, EngineError> {
        let timeout = self.config.resolve_timeout();
        let element = self
            .resolve_inner(chain, timeout, VisibilityFilter::present())
            .await?;
        self.backend
            .value(&element.handle)
            .await
            .map_err(|e| EngineError::from_backend(e, chain.name()))
    }

    async fn resolve_and_act(
        &mut self,
        chain: &LocatorChain,
        action: &Action,
    ) -> Result<ActionOutcome, EngineError> {
        let timeout = self.config.resolve_timeout();
        let element = self
            .resolve_inner(chain, timeout, VisibilityFilter::default())
            .await?;
        self.act_inner(&element, action, &ActionOptions::default())
            .await
    }

    pub(crate) async fn resolve_inner(
        &mut self,
        chain: &LocatorChain,
        timeout: Duration,
        filter: VisibilityFilter,
    ) -> Result<ResolvedElement, EngineError> {
        self.resolver
            .resolve(&mut self.backend, chain, timeout, filter, self.epoch)
            .await
    }

    pub(crate) async fn act_inner(
        &mut self,
        element: &ResolvedElement,
        action: &Action,
        options: &ActionOptions,
    ) -> Result<ActionOutcome, EngineError> {
        if element.epoch != self.epoch {
            debug!(
                target_name = %element.target,
                element_epoch = element.epoch,
                epoch = self.epoch,
                "Rejecting element from an earlier page"
            );
            return Err(EngineError::StaleReference {
                target: element.target.clone(),
            });
        }
        self.executor
            .act(&mut self.backend, element, action, options)
            .await?
            .into_result(&element.target, action)
    }

    // ------------------------------------------------------------------
    // Dropdowns and probing
    // ------------------------------------------------------------------

    pub async fn wait_for_dropdown(
        &mut self,
        target: &DropdownTarget,
        renavigate: &mut dyn Renavigate<B>,
    ) -> Result<DropdownReadiness, EngineError> {
        let waiter = Arc::clone(&self.dropdown);
        let result = waiter.wait(self, target, renavigate).await;
        self.observe(result, "wait_for_dropdown", target.name()).await
    }

    /// Wait for the dropdown, then pick `option` (or the first real option when `None`).
    pub async fn select_from_dropdown(
        &mut self,
        target: &DropdownTarget,
        option: Option<&str>,
        renavigate: &mut dyn Renavigate<B>,
    ) -> Result<DropdownReadiness, EngineError> {
        let waiter = Arc::clone(&self.dropdown);
        let result = waiter.select_option(self, target, option, renavigate).await;
        self.observe(result, "select", target.name()).await
    }

    pub async fn probe_values<S: AsRef<str> + Sync>(
        &mut self,
        field: &LocatorChain,
        candidates: &[S],
        validate: &mut dyn Validate<B>,
    ) -> Result<CandidateProbeResult, EngineError> {
        let prober = Arc::clone(&self.prober);
        let result = prober.probe(self, field, candidates, validate).await;
        self.observe(result, "probe", field.name()).await
    }

    // ------------------------------------------------------------------
    // Artifacts
    // ------------------------------------------------------------------

    /// Screenshot through the attached sink. `Ok(None)` when no sink is attached.
    pub async fn capture(&mut self, label: &str) -> Result<Option<PathBuf>, EngineError> {
        let Some(sink) = self.screenshots.clone() else {
            return Ok(None);
        };
        let png = self.backend.screenshot().await?;
        let path = sink.store(label, &png).await?;
        debug!(path = %path.display(), "Stored screenshot");
        self.artifacts.push(path.clone());
        Ok(Some(path))
    }

    /// Artifact paths captured since the last call.
    pub fn take_artifacts(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.artifacts)
    }

    async fn observe<T>(
        &mut self,
        result: Result<T, EngineError>,
        operation: &str,
        target: &str,
    ) -> Result<T, EngineError> {
        if self.nesting == 0 {
            if let Err(e) = &result {
                self.report_failure(operation, target, e).await;
            }
        }
        result
    }

    async fn report_failure(&mut self, operation: &str, target: &str, err: &EngineError) {
        let attempted = err.attempted();
        error!(
            operation,
            target_name = target,
            error_kind = err.code(),
            attempted = ?attempted,
            "{}",
            err
        );
        if !self.launched {
            return;
        }
        let label = format!("{}_{}", operation, target);
        if let Err(e) = self.capture(&label).await {
            warn!(error_kind = e.code(), "Failure screenshot not captured: {}", e);
        }
    }
}

impl<B: Backend> Drop for SessionContext<B> {
    fn drop(&mut self) {
        if self.launched && !self.torn_down {
            warn!("Session dropped without teardown; browser may still be running");
        }
    }
}
