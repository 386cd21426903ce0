//! YAML suite files: a locator table plus tagged scenarios.
//!
//! ```yaml
//! base_url: https://hr.example.test
//! elements:
//!   username: ["css=input[name='username']", "xpath=//input[@placeholder='Username']"]
//!   login: ["css=button[type='submit']", "text=Login"]
//! scenarios:
//!   - name: Login
//!     tags: [smoke]
//!     steps:
//!       - goto: /auth/login
//!       - type: { element: username, text: Admin }
//!       - click: login
//! ```

use grapple_common::table::LocatorTable;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("Failed to read suite: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse suite: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Scenario '{scenario}' references unknown element '{element}'")]
    UnknownElement { scenario: String, element: String },

    #[error("Scenario '{0}' has no steps")]
    EmptyScenario(String),

    #[error("Duplicate scenario name '{0}'")]
    DuplicateScenario(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Suite {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub elements: LocatorTable,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeStep {
    pub element: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStep {
    pub trigger: String,
    pub options: String,
    /// Option text to pick; the first real option when absent.
    #[serde(default)]
    pub option: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeStep {
    pub field: String,
    pub candidates: Vec<String>,
    /// Element shown when the entered value is rejected.
    pub invalid: String,
    #[serde(default)]
    pub save_as: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Goto(String),
    Click(String),
    Type(TypeStep),
    Clear(String),
    Select(SelectStep),
    Probe(ProbeStep),
    AssertVisible(String),
    Screenshot(String),
}

impl Step {
    /// Short human-readable form for logs and reports.
    pub fn label(&self) -> String {
        match self {
            Step::Goto(url) => format!("goto {}", url),
            Step::Click(el) => format!("click {}", el),
            Step::Type(t) => format!("type {}", t.element),
            Step::Clear(el) => format!("clear {}", el),
            Step::Select(s) => match &s.option {
                Some(option) => format!("select {:?} in {}", option, s.trigger),
                None => format!("select first in {}", s.trigger),
            },
            Step::Probe(p) => format!("probe {}", p.field),
            Step::AssertVisible(el) => format!("assert_visible {}", el),
            Step::Screenshot(label) => format!("screenshot {}", label),
        }
    }

    /// Element names this step looks up in the table.
    pub fn element_refs(&self) -> Vec<&str> {
        match self {
            Step::Goto(_) | Step::Screenshot(_) => Vec::new(),
            Step::Click(el) | Step::Clear(el) | Step::AssertVisible(el) => vec![el.as_str()],
            Step::Type(t) => vec![t.element.as_str()],
            Step::Select(s) => vec![s.trigger.as_str(), s.options.as_str()],
            Step::Probe(p) => vec![p.field.as_str(), p.invalid.as_str()],
        }
    }

    /// Steps that only move the page forward and can be replayed after a reload.
    pub fn is_replayable(&self) -> bool {
        matches!(
            self,
            Step::Goto(_) | Step::Click(_) | Step::Type(_) | Step::Clear(_)
        )
    }
}

impl Scenario {
    /// An empty tag filter matches everything. Tags compare case-insensitively
    /// and a leading `@` is ignored.
    pub fn matches_tags(&self, filter: &[String]) -> bool {
        if filter.is_empty() {
            return true;
        }
        filter.iter().any(|wanted| {
            let wanted = normalize_tag(wanted);
            self.tags.iter().any(|t| normalize_tag(t) == wanted)
        })
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('@').to_lowercase()
}

impl Suite {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SuiteError> {
        let suite: Suite = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    pub async fn load(path: &Path) -> Result<Self, SuiteError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml_str(&content)
    }

    /// Scenario names are unique and every element a step names exists in the table.
    pub fn validate(&self) -> Result<(), SuiteError> {
        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            if !names.insert(scenario.name.as_str()) {
                return Err(SuiteError::DuplicateScenario(scenario.name.clone()));
            }
            if scenario.steps.is_empty() {
                return Err(SuiteError::EmptyScenario(scenario.name.clone()));
            }
            for step in &scenario.steps {
                for element in step.element_refs() {
                    if !self.elements.contains(element) {
                        return Err(SuiteError::UnknownElement {
                            scenario: scenario.name.clone(),
                            element: element.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn select(&self, tags: &[String]) -> Vec<&Scenario> {
        self.scenarios
            .iter()
            .filter(|s| s.matches_tags(tags))
            .collect()
    }

    /// Resolve a step URL against `base_url`. Absolute URLs pass through.
    pub fn url_for(&self, target: &str) -> String {
        match &self.base_url {
            Some(base) if !target.contains("://") => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                target.trim_start_matches('/')
            ),
            _ => target.to_string(),
        }
    }
}

/// Replace `${name}` with saved values. Unknown names are left untouched.
pub fn substitute(text: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
