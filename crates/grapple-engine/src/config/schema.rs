use super::loader::ConfigError;
use grapple_common::locator::LocatorCandidate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrappleConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Browser session settings applied at launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub window_size: WindowSize,
    /// Driver-side implicit wait. Kept at zero so the engine's own polling
    /// is the only waiting that happens.
    #[serde(default)]
    pub implicit_wait_ms: u64,
    #[serde(default = "default_page_load_timeout_ms")]
    pub page_load_timeout_ms: u64,
    #[serde(default = "default_script_timeout_ms")]
    pub script_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            window_size: WindowSize::default(),
            implicit_wait_ms: 0,
            page_load_timeout_ms: default_page_load_timeout_ms(),
            script_timeout_ms: default_script_timeout_ms(),
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_page_load_timeout_ms() -> u64 {
    30000
}

fn default_script_timeout_ms() -> u64 {
    30000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
    #[serde(default = "default_candidate_timeout_ms")]
    pub candidate_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
    #[serde(default = "default_max_refreshes")]
    pub max_refreshes: u32,
    #[serde(default = "default_occluders")]
    pub occluders: Vec<LocatorCandidate>,
    #[serde(default = "default_placeholder_patterns")]
    pub placeholder_patterns: Vec<String>,
    #[serde(default = "default_probe_settle_ms")]
    pub probe_settle_ms: u64,
    #[serde(default = "default_clear_verify_timeout_ms")]
    pub clear_verify_timeout_ms: u64,
    #[serde(default = "default_sensitive_fields")]
    pub sensitive_fields: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: default_resolve_timeout_ms(),
            candidate_timeout_ms: default_candidate_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_timeout_ms: default_settle_timeout_ms(),
            max_refreshes: default_max_refreshes(),
            occluders: default_occluders(),
            placeholder_patterns: default_placeholder_patterns(),
            probe_settle_ms: default_probe_settle_ms(),
            clear_verify_timeout_ms: default_clear_verify_timeout_ms(),
            sensitive_fields: default_sensitive_fields(),
        }
    }
}

impl EngineConfig {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn candidate_timeout(&self) -> Duration {
        Duration::from_millis(self.candidate_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn probe_settle(&self) -> Duration {
        Duration::from_millis(self.probe_settle_ms)
    }

    pub fn clear_verify_timeout(&self) -> Duration {
        Duration::from_millis(self.clear_verify_timeout_ms)
    }

    /// Compile `placeholder_patterns`, anchored so each must match the whole option text.
    pub fn compiled_placeholders(&self) -> Result<Vec<Regex>, ConfigError> {
        self.placeholder_patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i)^(?:{})$", p)).map_err(ConfigError::from))
            .collect()
    }
}

fn default_resolve_timeout_ms() -> u64 {
    10000
}

fn default_candidate_timeout_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_settle_timeout_ms() -> u64 {
    3000
}

fn default_max_refreshes() -> u32 {
    2
}

fn default_occluders() -> Vec<LocatorCandidate> {
    vec![
        LocatorCandidate::css("header").with_description("page header"),
        LocatorCandidate::css("[role='banner']").with_description("banner"),
    ]
}

fn default_placeholder_patterns() -> Vec<String> {
    vec![
        r"\s*".to_string(),
        r"-+\s*select\s*-+".to_string(),
        r"select".to_string(),
        r"please select.*".to_string(),
        r"loading(\.\.\.|…)?".to_string(),
    ]
}

fn default_probe_settle_ms() -> u64 {
    500
}

fn default_clear_verify_timeout_ms() -> u64 {
    1000
}

fn default_sensitive_fields() -> Vec<String> {
    [
        "password",
        "secret",
        "token",
        "api_key",
        "cvv",
        "ssn",
        "card_number",
        "credit_card",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            title: default_title(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_title() -> String {
    "Regression Report".to_string()
}
