mod common;

use common::{FakeBackend, FakeDom, test_config};
use grapple_engine::EngineError;
use grapple_engine::SessionContext;
use grapple_engine::locator::LocatorChain;
use grapple_engine::prober::{
    CandidateValueProber, ClearMethod, InvalidIndicator, ProbeResultExt, Validate, ValidateFn,
};
use grapple_engine::resolution::VisibilityFilter;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

struct Page {
    session: SessionContext<FakeBackend>,
    dom: Arc<Mutex<FakeDom>>,
    field: u64,
    indicator: u64,
    field_chain: LocatorChain,
    invalid: InvalidIndicator,
}

/// An autocomplete field that only accepts `accepted`; an inline error shows otherwise.
async fn page(accepted: &[&str]) -> Page {
    let mut dom = FakeDom::new();
    let field = dom.add(&["css=input.supervisor"]);
    let indicator = dom.add_text(&["css=.field-error"], "Invalid");
    dom.el(indicator).visible = false;
    dom.el(field).validation = Some((indicator, accepted.iter().map(|s| s.to_string()).collect()));
    let (backend, dom) = dom.into_backend();

    let mut session = SessionContext::new(backend, test_config()).unwrap();
    session.launch().await.unwrap();
    Page {
        session,
        dom,
        field,
        indicator,
        field_chain: LocatorChain::parse("supervisor", &["css=input.supervisor"]).unwrap(),
        invalid: InvalidIndicator::new(
            LocatorChain::parse("supervisor error", &["css=.field-error"]).unwrap(),
            Duration::ZERO,
        ),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stops_at_first_accepted_value() {
    let mut page = page(&["B"]).await;

    let result = page
        .session
        .probe_values(&page.field_chain, &["A", "B", "C"], &mut page.invalid)
        .await
        .unwrap();

    assert_eq!(result.accepted_value.as_deref(), Some("B"));
    assert_eq!(result.rejected_values, vec!["A".to_string()]);
    assert!(!result.exhausted);

    let dom = page.dom.lock().unwrap();
    assert!(dom.called("typed A"));
    assert!(dom.called("typed B"));
    assert!(!dom.called("typed C"));
    assert_eq!(dom.get(page.field).value, "B");
}

#[tokio::test(start_paused = true)]
async fn test_all_rejected_is_exhausted_not_an_error() {
    let mut page = page(&["Z"]).await;

    let result = page
        .session
        .probe_values(&page.field_chain, &["A", "B", "C"], &mut page.invalid)
        .await
        .unwrap();

    assert!(result.exhausted);
    assert_eq!(result.accepted_value, None);
    assert_eq!(result.rejected_values, vec!["A", "B", "C"]);

    let err = result.into_accepted("supervisor").unwrap_err();
    assert_eq!(err.code(), "PROBE_EXHAUSTED");
    assert_eq!(
        err.to_string(),
        "No candidate value accepted by 'supervisor' (rejected: A, B, C)"
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_candidate_list_enters_nothing() {
    let mut page = page(&["B"]).await;
    let none: [&str; 0] = [];

    let result = page
        .session
        .probe_values(&page.field_chain, &none, &mut page.invalid)
        .await
        .unwrap();

    assert!(result.exhausted);
    assert!(result.rejected_values.is_empty());
    let dom = page.dom.lock().unwrap();
    assert_eq!(dom.count_calls("typed"), 0);
    assert_eq!(dom.count_calls("send_keys"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_each_value_replaces_the_previous_one() {
    let mut page = page(&[]).await;
    let mut seen = Vec::new();
    let mut validate = ValidateFn(|value: &str| {
        seen.push(value.to_string());
        false
    });

    page.session
        .probe_values(&page.field_chain, &["Linda", "Peter"], &mut validate)
        .await
        .unwrap();
    drop(validate);

    assert_eq!(seen, vec!["Linda", "Peter"]);
    assert_eq!(page.dom.lock().unwrap().get(page.field).value, "Peter");
}

#[tokio::test(start_paused = true)]
async fn test_clear_falls_back_to_script_reset() {
    let mut page = page(&[]).await;
    {
        let mut dom = page.dom.lock().unwrap();
        dom.el(page.field).value = "stale".into();
        dom.ignore(page.field, "select_all_delete");
        dom.ignore(page.field, "clear");
    }

    let element = page
        .session
        .resolve(&page.field_chain, VisibilityFilter::default())
        .await
        .unwrap();
    let method = CandidateValueProber::from_config(&test_config())
        .clear(&mut page.session, &element)
        .await
        .unwrap();

    assert_eq!(method, ClearMethod::ScriptReset);
    let dom = page.dom.lock().unwrap();
    assert_eq!(dom.get(page.field).value, "");
    assert!(dom.called(&format!("select_all_delete #{}", page.field)));
    assert!(dom.called(&format!("clear #{}", page.field)));
    assert!(dom.called(&format!("set_value #{}", page.field)));
}

#[tokio::test(start_paused = true)]
async fn test_field_that_cannot_be_emptied_fails_the_clear() {
    let mut page = page(&[]).await;
    {
        let mut dom = page.dom.lock().unwrap();
        dom.el(page.field).value = "stale".into();
        for op in ["select_all_delete", "clear", "set_value"] {
            dom.ignore(page.field, op);
        }
    }

    let err = page
        .session
        .probe_values(&page.field_chain, &["A"], &mut page.invalid)
        .await
        .unwrap_err();

    match err {
        EngineError::ClearFailed {
            target,
            remaining,
            attempts,
        } => {
            assert_eq!(target, "supervisor");
            assert_eq!(remaining, "stale");
            assert_eq!(attempts.len(), ClearMethod::CHAIN.len());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!page.dom.lock().unwrap().called("typed A"));
}

#[tokio::test(start_paused = true)]
async fn test_brief_indicator_within_settle_rejects_early() {
    let mut page = page(&[]).await;
    let start = Instant::now();
    {
        let mut dom = page.dom.lock().unwrap();
        let indicator = dom.el(page.indicator);
        indicator.visible = true;
        indicator.visible_at = Some(start + Duration::from_millis(200));
        indicator.gone_at = Some(start + Duration::from_millis(500));
    }
    let mut invalid = InvalidIndicator::new(page.invalid.indicator.clone(), Duration::from_secs(1));

    let accepted = invalid.is_accepted(&mut page.session, "A").await.unwrap();

    assert!(!accepted);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_no_indicator_accepts_after_settle() {
    let mut page = page(&[]).await;
    let start = Instant::now();
    let mut invalid = InvalidIndicator::new(page.invalid.indicator.clone(), Duration::from_millis(600));

    let accepted = invalid.is_accepted(&mut page.session, "A").await.unwrap();

    assert!(accepted);
    assert!(start.elapsed() >= Duration::from_millis(600));
}
