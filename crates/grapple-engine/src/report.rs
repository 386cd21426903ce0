//! Run reports and failure screenshots.
//!
//! A run gets its own directory under the configured output dir:
//!
//! ```text
//! reports/run_20240501_101500123/
//!     report.html
//!     report.json
//!     screenshots/click_save_button_chrome_20240501_101503456.png
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S%3f";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Stores screenshot bytes and returns where they went.
#[async_trait]
pub trait ScreenshotSink: Send + Sync {
    async fn store(&self, label: &str, png: &[u8]) -> Result<PathBuf, ReportError>;
}

/// Collects step results and renders the final report.
#[async_trait]
pub trait ReportSink: Send {
    async fn append_step_result(&mut self, record: StepRecord) -> Result<(), ReportError>;

    async fn finalize(&mut self) -> Result<ReportDocument, ReportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Passed,
    Failed,
    Skipped,
}

impl StepOutcome {
    fn css_class(&self) -> &'static str {
        match self {
            StepOutcome::Passed => "pass",
            StepOutcome::Failed => "fail",
            StepOutcome::Skipped => "skip",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pass,
    Partial,
    Fail,
}

impl RunStatus {
    /// PASS when every scenario passed (or there were none), FAIL when none did.
    pub fn from_scenarios<I: IntoIterator<Item = bool>>(passed: I) -> Self {
        let (mut ok, mut total) = (0usize, 0usize);
        for p in passed {
            total += 1;
            if p {
                ok += 1;
            }
        }
        if ok == total {
            RunStatus::Pass
        } else if ok == 0 {
            RunStatus::Fail
        } else {
            RunStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pass => "PASS",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub scenario: String,
    pub step: String,
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempted: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn passed(scenario: &str, step: &str, detail: Option<String>, duration_ms: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            step: step.to_string(),
            outcome: StepOutcome::Passed,
            detail,
            error_kind: None,
            attempted: Vec::new(),
            artifacts: Vec::new(),
            duration_ms,
        }
    }

    pub fn failed(
        scenario: &str,
        step: &str,
        error: &crate::error::EngineError,
        artifacts: Vec<PathBuf>,
        duration_ms: u64,
    ) -> Self {
        Self {
            scenario: scenario.to_string(),
            step: step.to_string(),
            outcome: StepOutcome::Failed,
            detail: Some(error.to_string()),
            error_kind: Some(error.code().to_string()),
            attempted: error.attempted(),
            artifacts,
            duration_ms,
        }
    }

    pub fn skipped(scenario: &str, step: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            step: step.to_string(),
            outcome: StepOutcome::Skipped,
            detail: None,
            error_kind: None,
            attempted: Vec::new(),
            artifacts: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<PathBuf>) -> Self {
        self.artifacts.extend(artifacts);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub name: String,
    pub passed: bool,
    pub steps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub title: String,
    pub browser: String,
    pub started_at: String,
    pub status: RunStatus,
    pub scenarios: Vec<ScenarioSummary>,
    pub steps: Vec<StepRecord>,
    #[serde(skip)]
    pub html_path: Option<PathBuf>,
    #[serde(skip)]
    pub json_path: Option<PathBuf>,
}

impl ReportDocument {
    pub fn build(title: &str, browser: &str, started_at: &str, steps: Vec<StepRecord>) -> Self {
        // Scenario order is order of first appearance.
        let mut order: Vec<String> = Vec::new();
        let mut passed: BTreeMap<String, (bool, usize)> = BTreeMap::new();
        for step in &steps {
            let entry = passed.entry(step.scenario.clone()).or_insert_with(|| {
                order.push(step.scenario.clone());
                (true, 0)
            });
            entry.0 &= step.outcome == StepOutcome::Passed;
            entry.1 += 1;
        }
        let scenarios: Vec<ScenarioSummary> = order
            .into_iter()
            .map(|name| {
                let (ok, count) = passed.get(&name).copied().unwrap_or((true, 0));
                ScenarioSummary {
                    name,
                    passed: ok,
                    steps: count,
                }
            })
            .collect();
        let status = RunStatus::from_scenarios(scenarios.iter().map(|s| s.passed));

        Self {
            title: title.to_string(),
            browser: browser.to_string(),
            started_at: started_at.to_string(),
            status,
            scenarios,
            steps,
            html_path: None,
            json_path: None,
        }
    }

    pub fn passed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| s.passed).count()
    }

    /// Render the self-contained HTML report. Artifact paths are made relative to `base`.
    pub fn render_html(&self, base: &Path) -> String {
        let mut html = String::new();

        html.push_str(&format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 20px; }}
        .summary {{ background: #f5f5f5; padding: 20px; border-radius: 8px; margin-bottom: 20px; }}
        .status-PASS {{ color: #2e7d32; }}
        .status-PARTIAL {{ color: #ef6c00; }}
        .status-FAIL {{ color: #c62828; }}
        .step {{ padding: 10px; margin: 5px 0; border-radius: 4px; }}
        .step.pass {{ background: #e8f5e9; border-left: 4px solid #4caf50; }}
        .step.fail {{ background: #ffebee; border-left: 4px solid #f44336; }}
        .step.skip {{ background: #fff3e0; border-left: 4px solid #ff9800; }}
        .error {{ color: #d32f2f; font-family: monospace; white-space: pre-wrap; }}
        .attempted {{ font-family: monospace; font-size: 0.9em; }}
        img {{ max-width: 480px; border: 1px solid #ddd; margin-top: 8px; }}
    </style>
</head>
<body>
"#,
            escape_html(&self.title)
        ));

        html.push_str(&format!(
            r#"<div class="summary">
    <h1>{}</h1>
    <h2 class="status-{status}">{status}: {}/{} scenarios passed</h2>
    <p>Browser: {} &middot; Started: {}</p>
</div>
"#,
            escape_html(&self.title),
            self.passed_count(),
            self.scenarios.len(),
            escape_html(&self.browser),
            escape_html(&self.started_at),
            status = self.status.as_str(),
        ));

        for scenario in &self.scenarios {
            html.push_str(&format!(
                "<h2>{} &mdash; {}</h2>\n",
                escape_html(&scenario.name),
                if scenario.passed { "passed" } else { "failed" }
            ));
            for step in self.steps.iter().filter(|s| s.scenario == scenario.name) {
                html.push_str(&format!(
                    r#"<div class="step {}">
    <strong>{}</strong> ({}ms)
"#,
                    step.outcome.css_class(),
                    escape_html(&step.step),
                    step.duration_ms
                ));
                if let Some(detail) = &step.detail {
                    let class = if step.outcome == StepOutcome::Failed {
                        "error"
                    } else {
                        "detail"
                    };
                    html.push_str(&format!(
                        "    <div class=\"{}\">{}</div>\n",
                        class,
                        escape_html(detail)
                    ));
                }
                if !step.attempted.is_empty() {
                    html.push_str("    <ul class=\"attempted\">\n");
                    for attempt in &step.attempted {
                        html.push_str(&format!("        <li>{}</li>\n", escape_html(attempt)));
                    }
                    html.push_str("    </ul>\n");
                }
                for artifact in &step.artifacts {
                    let rel = artifact.strip_prefix(base).unwrap_or(artifact);
                    let src = rel.to_string_lossy().replace('\\', "/");
                    html.push_str(&format!(
                        "    <div><a href=\"{0}\"><img src=\"{0}\" alt=\"screenshot\"></a></div>\n",
                        escape_html(&src)
                    ));
                }
                html.push_str("</div>\n");
            }
        }

        html.push_str("</body>\n</html>\n");
        html
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Replace everything outside `[A-Za-z0-9_-]` so the label is safe in a file name.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(80)
        .collect();
    if cleaned.is_empty() {
        "screenshot".to_string()
    } else {
        cleaned
    }
}

pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Writes `{label}_{browser}_{timestamp}.png` files into one directory.
#[derive(Debug, Clone)]
pub struct ScreenshotDir {
    dir: PathBuf,
    browser: String,
}

impl ScreenshotDir {
    pub fn new(dir: impl Into<PathBuf>, browser: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            browser: browser.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ScreenshotSink for ScreenshotDir {
    async fn store(&self, label: &str, png: &[u8]) -> Result<PathBuf, ReportError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let stem = format!(
            "{}_{}_{}",
            sanitize_label(label),
            sanitize_label(&self.browser),
            timestamp()
        );
        let mut path = self.dir.join(format!("{}.png", stem));
        let mut n = 1;
        while tokio::fs::try_exists(&path).await? {
            path = self.dir.join(format!("{}_{}.png", stem, n));
            n += 1;
        }
        tokio::fs::write(&path, png).await?;
        Ok(path)
    }
}

/// Report sink writing `report.html` and `report.json` into a per-run directory.
pub struct FileReportSink {
    run_dir: PathBuf,
    title: String,
    browser: String,
    started_at: String,
    screenshots: Arc<ScreenshotDir>,
    steps: Vec<StepRecord>,
}

impl FileReportSink {
    pub async fn create(
        output_dir: &Path,
        title: impl Into<String>,
        browser: impl Into<String>,
    ) -> Result<Self, ReportError> {
        let started_at = timestamp();
        let run_dir = output_dir.join(format!("run_{}", started_at));
        let browser = browser.into();
        tokio::fs::create_dir_all(run_dir.join("screenshots")).await?;
        info!(dir = %run_dir.display(), "Writing report");

        Ok(Self {
            screenshots: Arc::new(ScreenshotDir::new(run_dir.join("screenshots"), browser.clone())),
            run_dir,
            title: title.into(),
            browser,
            started_at,
            steps: Vec::new(),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Sink for sessions to store failure screenshots in this run's directory.
    pub fn screenshots(&self) -> Arc<dyn ScreenshotSink> {
        self.screenshots.clone()
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    async fn append_step_result(&mut self, record: StepRecord) -> Result<(), ReportError> {
        self.steps.push(record);
        Ok(())
    }

    async fn finalize(&mut self) -> Result<ReportDocument, ReportError> {
        let mut document = ReportDocument::build(
            &self.title,
            &self.browser,
            &self.started_at,
            self.steps.clone(),
        );

        let html_path = self.run_dir.join("report.html");
        let json_path = self.run_dir.join("report.json");
        tokio::fs::write(&html_path, document.render_html(&self.run_dir)).await?;
        tokio::fs::write(&json_path, serde_json::to_string_pretty(&document)?).await?;

        info!(
            status = document.status.as_str(),
            passed = document.passed_count(),
            total = document.scenarios.len(),
            html = %html_path.display(),
            "Report written"
        );
        document.html_path = Some(html_path);
        document.json_path = Some(json_path);
        Ok(document)
    }
}
