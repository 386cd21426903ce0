//! WebDriver backend integration tests
//!
//! These tests launch a real browser through its WebDriver server (chromedriver by
//! default, or `GRAPPLE_WEBDRIVER_URL` when set). Tests run sequentially via `#[serial]`.
//! Run with: cargo test -p grapple-wd -- --ignored

use grapple_engine::SessionContext;
use grapple_engine::backend::{Backend, BackendError};
use grapple_engine::config::{EngineConfig, SessionConfig};
use grapple_engine::locator::{LocatorCandidate, LocatorChain};
use grapple_engine::protocol::Technique;
use grapple_engine::resolution::VisibilityFilter;
use grapple_wd::{BrowserKind, WebDriverBackend};
use serial_test::serial;

const PAGE: &str = "data:text/html,<html><body>\
<header style='position:fixed;top:0;left:0;width:100%;height:80px;background:#333;z-index:10'>Top</header>\
<button id='covered' style='position:fixed;top:20px;left:20px' onclick='this.textContent=\"done\"'>Save</button>\
<input id='name' value='stale'>\
</body></html>";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn backend() -> WebDriverBackend {
    match std::env::var("GRAPPLE_WEBDRIVER_URL") {
        Ok(url) => WebDriverBackend::with_url(url, BrowserKind::Chrome, SessionConfig::default()),
        Err(_) => WebDriverBackend::new(BrowserKind::Chrome, SessionConfig::default()),
    }
}

#[tokio::test]
#[serial]
#[ignore] // Requires chromedriver and Chrome
async fn test_webdriver_lifecycle() {
    init_tracing();
    let mut backend = backend();

    backend.launch().await.expect("Failed to launch backend");
    assert!(backend.is_ready().await);

    let nav = backend.navigate(PAGE).await;
    assert!(nav.is_ok(), "Navigation failed: {:?}", nav.err());

    let found = backend
        .find_elements(&LocatorCandidate::id("covered"))
        .await
        .expect("find_elements failed");
    assert_eq!(found.len(), 1);

    let state = backend.inspect(&found[0]).await.expect("inspect failed");
    assert!(state.visible);

    // A reload invalidates every handle issued before it.
    backend.refresh().await.expect("Refresh failed");
    let err = backend.click(&found[0]).await.unwrap_err();
    assert_eq!(err, BackendError::ElementStale { id: found[0].id });

    let shot = backend.screenshot().await.expect("Screenshot failed");
    assert!(!shot.is_empty());

    let close_res = backend.close().await;
    assert!(close_res.is_ok(), "Close failed: {:?}", close_res.err());
}

#[tokio::test]
#[serial]
#[ignore] // Requires chromedriver and Chrome
async fn test_header_occluded_click_escalates() {
    init_tracing();
    let mut session = SessionContext::new(backend(), EngineConfig::default()).unwrap();
    session.launch().await.expect("Failed to launch");
    session.navigate(PAGE).await.expect("Navigation failed");

    let chain = LocatorChain::parse("save", &["id=covered", "text=Save"]).unwrap();
    let outcome = session.click(&chain).await.expect("Click failed");
    assert!(outcome.succeeded);
    assert_ne!(outcome.technique_used, Some(Technique::Native));

    let field = LocatorChain::parse("name", &["id=name"]).unwrap();
    session.clear(&field).await.expect("Clear failed");
    assert_eq!(session.read_value(&field).await.unwrap(), "");

    let element = session
        .resolve(&field, VisibilityFilter::default())
        .await
        .expect("Resolve failed");
    assert_eq!(element.matched_candidate_index, 0);

    session.teardown().await.expect("Teardown failed");
}
