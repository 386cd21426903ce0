use anyhow::Context;
use clap::Parser;
use grapple_engine::config::{ConfigLoader, GrappleConfig};
use grapple_engine::report::{FileReportSink, RunStatus};
use grapple_engine::runner::ScenarioRunner;
use grapple_engine::suite::Suite;
use grapple_wd::{BrowserKind, WebDriverBackend};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "grapple", version, about = "Run YAML UI regression suites through WebDriver")]
struct Args {
    /// Browser to drive: chrome, firefox or edge
    #[arg(short, long, default_value = "chrome")]
    browser: BrowserKind,

    /// Suite file (locator table + scenarios)
    #[arg(short, long)]
    suite: PathBuf,

    /// Only run scenarios carrying one of these tags (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Where run directories are created. Defaults to `report.output_dir` from the config.
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// URL of an external WebDriver server. If not provided, the driver is launched automatically.
    #[arg(short, long)]
    webdriver_url: Option<String>,

    /// Config file. Defaults to ./grapple.yaml, then ~/.grapple/config.yaml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force headless mode regardless of the config
    #[arg(long)]
    headless: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

struct Setup {
    config: GrappleConfig,
    suite: Suite,
    report: FileReportSink,
}

async fn setup(args: &Args) -> anyhow::Result<Setup> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConfigLoader::load_default().await?,
    };
    if args.headless {
        config.session.headless = true;
    }

    let suite = Suite::load(&args.suite)
        .await
        .with_context(|| format!("loading suite {}", args.suite.display()))?;

    let output_dir = args
        .report_dir
        .clone()
        .unwrap_or_else(|| config.report.output_dir.clone());
    let report = FileReportSink::create(&output_dir, config.report.title.clone(), args.browser.name())
        .await
        .with_context(|| format!("creating report directory under {}", output_dir.display()))?;

    Ok(Setup {
        config,
        suite,
        report,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the run summary.
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let Setup {
        config,
        suite,
        mut report,
    } = match setup(&args).await {
        Ok(setup) => setup,
        Err(e) => {
            error!("Setup failed: {:#}", e);
            return ExitCode::from(2);
        }
    };

    info!(browser = %args.browser, suite = %args.suite.display(), "Starting run");
    let runner =
        ScenarioRunner::new(&suite, &config.engine).with_screenshots(report.screenshots());
    let make_backend = || match &args.webdriver_url {
        Some(url) => WebDriverBackend::with_url(url.clone(), args.browser, config.session.clone()),
        None => WebDriverBackend::new(args.browser, config.session.clone()),
    };

    let document = match runner.run(&args.tags, make_backend, &mut report).await {
        Ok(document) => document,
        Err(e) => {
            error!(error_kind = e.code(), "Run aborted: {}", e);
            return ExitCode::from(2);
        }
    };

    println!(
        "{}: {}/{} scenarios passed",
        document.status.as_str(),
        document.passed_count(),
        document.scenarios.len()
    );
    if let Some(html) = &document.html_path {
        println!("Report: {}", html.display());
    }

    if document.status == RunStatus::Pass {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "grapple",
            "--browser",
            "Firefox",
            "--suite",
            "suite.yaml",
            "--tags",
            "smoke,login",
            "--headless",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.browser, BrowserKind::Firefox);
        assert_eq!(args.tags, vec!["smoke", "login"]);
        assert!(args.headless);
        assert!(args.verbose);
        assert!(args.webdriver_url.is_none());
    }

    #[test]
    fn test_defaults_and_required_suite() {
        let args = Args::try_parse_from(["grapple", "-s", "suite.yaml"]).unwrap();
        assert_eq!(args.browser, BrowserKind::Chrome);
        assert!(args.tags.is_empty());
        assert!(Args::try_parse_from(["grapple"]).is_err());
        assert!(Args::try_parse_from(["grapple", "-s", "x.yaml", "-b", "safari"]).is_err());
    }
}
