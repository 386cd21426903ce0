use grapple_engine::config::SessionConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Browsers with a known WebDriver server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chrome,
    Firefox,
    Edge,
}

impl BrowserKind {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chrome",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Edge => "edge",
        }
    }

    /// Executable name of the WebDriver server for this browser.
    pub fn driver_binary(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chromedriver",
            BrowserKind::Firefox => "geckodriver",
            BrowserKind::Edge => "msedgedriver",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            BrowserKind::Chrome | BrowserKind::Edge => 9515,
            BrowserKind::Firefox => 4444,
        }
    }

    fn port_args(&self, port: u16) -> Vec<String> {
        match self {
            BrowserKind::Firefox => vec!["--port".to_string(), port.to_string()],
            BrowserKind::Chrome | BrowserKind::Edge => vec![format!("--port={}", port)],
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BrowserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chrome" | "chromium" => Ok(BrowserKind::Chrome),
            "firefox" | "ff" => Ok(BrowserKind::Firefox),
            "edge" | "msedge" => Ok(BrowserKind::Edge),
            other => Err(format!(
                "Unsupported browser '{}' (expected chrome, firefox or edge)",
                other
            )),
        }
    }
}

/// Common install locations checked after `PATH`.
const DRIVER_DIRS: &[&str] = &["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin", "/snap/bin"];

/// Detect if we're in a headless environment (no display server)
pub fn is_headless_environment() -> bool {
    std::env::var("DISPLAY").is_err() && std::env::var("WAYLAND_DISPLAY").is_err()
}

/// Find the WebDriver server binary for `kind` on the system
pub fn find_driver_binary(kind: BrowserKind) -> Option<String> {
    let name = kind.driver_binary();

    // First check PATH
    if let Ok(output) = Command::new("which").arg(name).output()
        && output.status.success()
        && let Ok(path) = String::from_utf8(output.stdout)
    {
        let path = path.trim();
        if !path.is_empty() {
            return Some(path.to_string());
        }
    }

    DRIVER_DIRS
        .iter()
        .map(|dir| std::path::Path::new(dir).join(name))
        .find(|path| path.exists())
        .map(|path| path.display().to_string())
}

/// Handle to a running WebDriver server process. The process is killed on drop.
pub struct DriverProcess {
    child: Child,
    port: u16,
    kind: BrowserKind,
}

impl DriverProcess {
    pub fn webdriver_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        info!("Shutting down {}...", self.kind.driver_binary());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Start the WebDriver server for `kind` on `port` and wait until `/status` answers.
pub async fn launch_driver(kind: BrowserKind, port: u16) -> Result<DriverProcess, String> {
    let binary = find_driver_binary(kind).ok_or_else(|| {
        format!(
            "{} not found. Install it and make sure it is on PATH",
            kind.driver_binary()
        )
    })?;

    info!("Launching {} from: {}", kind.driver_binary(), binary);
    let child = Command::new(&binary)
        .args(kind.port_args(port))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("Failed to launch {}: {}", kind.driver_binary(), e))?;
    info!("{} launched with PID: {}", kind.driver_binary(), child.id());

    // Wrapped immediately so every early return below kills the process.
    let process = DriverProcess { child, port, kind };
    wait_until_ready(&format!("{}/status", process.webdriver_url()), 30).await?;
    Ok(process)
}

/// Poll a WebDriver `/status` endpoint until it reports success.
pub async fn wait_until_ready(status_url: &str, attempts: u32) -> Result<(), String> {
    let client = reqwest::Client::new();

    for attempt in 1..=attempts {
        sleep(Duration::from_millis(200)).await;

        match client.get(status_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("WebDriver ready after {} attempts", attempt);
                return Ok(());
            }
            Ok(_) => {
                warn!("WebDriver responded but not ready yet (attempt {})", attempt);
            }
            Err(_) => {
                if attempt % 5 == 0 {
                    info!("Waiting for WebDriver... (attempt {})", attempt);
                }
            }
        }
    }

    Err(format!("WebDriver at {} did not become ready within timeout", status_url))
}

/// W3C capabilities for `kind`: browser name, headless flags and initial window size.
pub fn capabilities(
    kind: BrowserKind,
    session: &SessionConfig,
) -> serde_json::Map<String, serde_json::Value> {
    let mut caps = serde_json::Map::new();
    let size = session.window_size;

    match kind {
        BrowserKind::Firefox => {
            let mut args = Vec::new();
            if session.headless {
                args.push("--headless".to_string());
            }
            args.push(format!("--width={}", size.width));
            args.push(format!("--height={}", size.height));
            caps.insert("browserName".to_string(), json!("firefox"));
            caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
        }
        BrowserKind::Chrome | BrowserKind::Edge => {
            let mut args = vec!["--no-sandbox".to_string()];
            if session.headless {
                args.push("--headless=new".to_string());
                args.push("--disable-gpu".to_string());
                args.push("--disable-dev-shm-usage".to_string());
            }
            args.push(format!("--window-size={},{}", size.width, size.height));

            let (browser_name, options_key) = match kind {
                BrowserKind::Edge => ("MicrosoftEdge", "ms:edgeOptions"),
                _ => ("chrome", "goog:chromeOptions"),
            };
            caps.insert("browserName".to_string(), json!(browser_name));
            caps.insert(options_key.to_string(), json!({ "args": args }));
        }
    }

    caps
}
