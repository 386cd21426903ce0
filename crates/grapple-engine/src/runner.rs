//! Runs suite scenarios, one fresh session each, and feeds a [`ReportSink`].

use crate::backend::Backend;
use crate::config::EngineConfig;
use crate::dropdown::{DropdownTarget, Renavigate};
use crate::error::EngineError;
use crate::prober::{InvalidIndicator, ProbeResultExt};
use crate::report::{ReportDocument, ReportSink, ScreenshotSink, StepRecord};
use crate::resolution::VisibilityFilter;
use crate::session::SessionContext;
use crate::suite::{Scenario, Step, Suite, substitute};
use async_trait::async_trait;
use grapple_common::formatter::{format_outcome, format_probe, format_readiness, mask_sensitive};
use grapple_common::locator::LocatorChain;
use grapple_common::table::LocatorTable;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Per-scenario state threaded through its steps.
#[derive(Debug, Default)]
struct ScenarioState {
    vars: HashMap<String, String>,
    /// Replayable steps executed so far, used to get back to the page after a reload.
    history: Vec<Step>,
}

/// Re-navigation by replaying the scenario's earlier goto/click/type/clear steps.
pub struct ReplaySteps<'a> {
    suite: &'a Suite,
    steps: Vec<Step>,
    vars: HashMap<String, String>,
}

impl<'a> ReplaySteps<'a> {
    pub fn new(suite: &'a Suite, steps: Vec<Step>, vars: HashMap<String, String>) -> Self {
        Self { suite, steps, vars }
    }
}

#[async_trait]
impl<'a, B: Backend> Renavigate<B> for ReplaySteps<'a> {
    async fn renavigate(&mut self, session: &mut SessionContext<B>) -> Result<(), EngineError> {
        for step in &self.steps {
            info!(step = %step.label(), "Replaying");
            match step {
                Step::Goto(target) => {
                    session.navigate(&self.suite.url_for(target)).await?;
                }
                Step::Click(el) => {
                    session.click(chain(&self.suite.elements, el)?).await?;
                }
                Step::Type(t) => {
                    let text = substitute(&t.text, &self.vars);
                    session
                        .type_text(chain(&self.suite.elements, &t.element)?, &text)
                        .await?;
                }
                Step::Clear(el) => {
                    session.clear(chain(&self.suite.elements, el)?).await?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn chain<'t>(table: &'t LocatorTable, name: &str) -> Result<&'t LocatorChain, EngineError> {
    Ok(table.get(name)?)
}

pub struct ScenarioRunner<'a> {
    suite: &'a Suite,
    config: &'a EngineConfig,
    screenshots: Option<Arc<dyn ScreenshotSink>>,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(suite: &'a Suite, config: &'a EngineConfig) -> Self {
        Self {
            suite,
            config,
            screenshots: None,
        }
    }

    pub fn with_screenshots(mut self, sink: Arc<dyn ScreenshotSink>) -> Self {
        self.screenshots = Some(sink);
        self
    }

    /// Run every scenario matching `tags`, each in a session over a fresh backend
    /// from `make_backend`, then finalize the report.
    pub async fn run<B, F>(
        &self,
        tags: &[String],
        mut make_backend: F,
        report: &mut dyn ReportSink,
    ) -> Result<ReportDocument, EngineError>
    where
        B: Backend,
        F: FnMut() -> B + Send,
    {
        let scenarios = self.suite.select(tags);
        info!(selected = scenarios.len(), total = self.suite.scenarios.len(), "Running suite");

        for scenario in scenarios {
            self.run_scenario(scenario, make_backend(), report).await?;
        }
        Ok(report.finalize().await?)
    }

    /// Run one scenario. Returns whether it passed; only report-writing failures are errors.
    pub async fn run_scenario<B: Backend>(
        &self,
        scenario: &Scenario,
        backend: B,
        report: &mut dyn ReportSink,
    ) -> Result<bool, EngineError> {
        info!(scenario = %scenario.name, "Scenario started");
        let mut session = SessionContext::new(backend, self.config.clone())?;
        if let Some(sink) = &self.screenshots {
            session = session.with_screenshots(sink.clone());
        }

        let started = Instant::now();
        if let Err(e) = session.launch().await {
            error!(scenario = %scenario.name, error_kind = e.code(), "Launch failed: {}", e);
            report
                .append_step_result(StepRecord::failed(
                    &scenario.name,
                    "launch",
                    &e,
                    Vec::new(),
                    elapsed_ms(started),
                ))
                .await?;
            for step in &scenario.steps {
                report
                    .append_step_result(StepRecord::skipped(&scenario.name, &step.label()))
                    .await?;
            }
            if let Err(e) = session.teardown().await {
                warn!(scenario = %scenario.name, error_kind = e.code(), "Teardown failed: {}", e);
            }
            return Ok(false);
        }

        let mut state = ScenarioState::default();
        let mut passed = true;
        for step in &scenario.steps {
            let label = step.label();
            if !passed {
                report
                    .append_step_result(StepRecord::skipped(&scenario.name, &label))
                    .await?;
                continue;
            }

            let started = Instant::now();
            let record = match self.execute_step(&mut session, step, &mut state).await {
                Ok(detail) => {
                    if step.is_replayable() {
                        state.history.push(step.clone());
                    }
                    StepRecord::passed(&scenario.name, &label, detail, elapsed_ms(started))
                        .with_artifacts(session.take_artifacts())
                }
                Err(e) => {
                    passed = false;
                    warn!(scenario = %scenario.name, step = %label, error_kind = e.code(), "Step failed: {}", e);
                    StepRecord::failed(
                        &scenario.name,
                        &label,
                        &e,
                        session.take_artifacts(),
                        elapsed_ms(started),
                    )
                }
            };
            report.append_step_result(record).await?;
        }

        if let Err(e) = session.teardown().await {
            warn!(scenario = %scenario.name, error_kind = e.code(), "Teardown failed: {}", e);
        }
        info!(scenario = %scenario.name, passed, "Scenario finished");
        Ok(passed)
    }

    async fn execute_step<B: Backend>(
        &self,
        session: &mut SessionContext<B>,
        step: &Step,
        state: &mut ScenarioState,
    ) -> Result<Option<String>, EngineError> {
        let table = &self.suite.elements;
        match step {
            Step::Goto(target) => {
                let nav = session.navigate(&self.suite.url_for(target)).await?;
                Ok(Some(format!("{} ({})", nav.url, nav.title)))
            }
            Step::Click(el) => {
                let outcome = session.click(chain(table, el)?).await?;
                Ok(Some(format_outcome(&outcome)))
            }
            Step::Type(t) => {
                let text = substitute(&t.text, &state.vars);
                let outcome = session.type_text(chain(table, &t.element)?, &text).await?;
                Ok(Some(format!(
                    "{:?}: {}",
                    mask_sensitive(&text, &t.element, &self.config.sensitive_fields),
                    format_outcome(&outcome)
                )))
            }
            Step::Clear(el) => {
                let outcome = session.clear(chain(table, el)?).await?;
                Ok(Some(format_outcome(&outcome)))
            }
            Step::Select(s) => {
                let target = DropdownTarget::new(
                    chain(table, &s.trigger)?.clone(),
                    chain(table, &s.options)?.clone(),
                );
                let mut replay =
                    ReplaySteps::new(self.suite, state.history.clone(), state.vars.clone());
                let readiness = session
                    .select_from_dropdown(&target, s.option.as_deref(), &mut replay)
                    .await?;
                Ok(Some(format_readiness(&readiness)))
            }
            Step::Probe(p) => {
                let field = chain(table, &p.field)?;
                let mut validator =
                    InvalidIndicator::new(chain(table, &p.invalid)?.clone(), self.config.probe_settle());
                let result = session
                    .probe_values(field, &p.candidates, &mut validator)
                    .await?;
                let detail = format_probe(&result);
                let accepted = match result.into_accepted(&p.field) {
                    Ok(value) => value,
                    Err(e) => {
                        // The prober itself does not treat exhaustion as an error.
                        if let Err(shot) = session.capture(&format!("probe_{}", p.field)).await {
                            warn!(
                                field = %p.field,
                                error_kind = shot.code(),
                                "Failure screenshot not captured: {}",
                                shot
                            );
                        }
                        return Err(e);
                    }
                };
                if let Some(name) = &p.save_as {
                    state.vars.insert(name.clone(), accepted);
                }
                Ok(Some(detail))
            }
            Step::AssertVisible(el) => {
                let element = session
                    .resolve(chain(table, el)?, VisibilityFilter::visible())
                    .await?;
                Ok(Some(format!("visible via {}", element.description)))
            }
            Step::Screenshot(label) => {
                let path = session.capture(label).await?;
                Ok(path.map(|p| p.display().to_string()))
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
