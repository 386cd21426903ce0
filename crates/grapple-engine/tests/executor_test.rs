mod common;

use common::{FakeDom, ms};
use grapple_engine::backend::{Backend, BackendError};
use grapple_engine::executor::{ActionExecutor, ActionOptions, OutcomeExt};
use grapple_engine::locator::{LocatorCandidate, LocatorChain};
use grapple_engine::protocol::{Action, Technique};
use grapple_engine::resolution::{ElementResolver, ResolvedElement, VisibilityFilter};
use grapple_engine::technique::{HoverThenClick, SyntheticEventDispatch};
use grapple_engine::EngineError;

async fn resolve(backend: &mut dyn Backend, spec: &str) -> ResolvedElement {
    let chain = LocatorChain::parse("button", &[spec]).unwrap();
    ElementResolver::new(ms(100), ms(50))
        .resolve(backend, &chain, ms(500), VisibilityFilter::default(), 0)
        .await
        .unwrap()
}

fn executor() -> ActionExecutor {
    ActionExecutor::new(vec![LocatorCandidate::css("header")])
}

fn intercepted(id: u64) -> BackendError {
    BackendError::ClickIntercepted {
        id,
        reason: "overlay".into(),
    }
}

#[tokio::test]
async fn test_native_success_stops_the_ladder() {
    let mut dom = FakeDom::new();
    let button = dom.add(&["id=save"]);
    let (mut backend, dom) = dom.into_backend();

    let element = resolve(&mut backend, "id=save").await;
    let outcome = executor()
        .act(&mut backend, &element, &Action::Click, &ActionOptions::default())
        .await
        .unwrap();

    assert!(outcome.succeeded);
    assert_eq!(outcome.technique_used, Some(Technique::Native));
    assert_eq!(outcome.attempts, 1);
    let dom = dom.lock().unwrap();
    assert_eq!(dom.get(button).clicks, 1);
    assert_eq!(dom.count_calls("script_click"), 0);
    assert_eq!(dom.count_calls("scroll"), 0);
}

#[tokio::test]
async fn test_no_technique_runs_after_a_success() {
    let mut dom = FakeDom::new();
    let button = dom.add(&["id=save"]);
    dom.fail(button, "click", intercepted(button));
    let (mut backend, dom) = dom.into_backend();

    let element = resolve(&mut backend, "id=save").await;
    let outcome = executor()
        .act(&mut backend, &element, &Action::Click, &ActionOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.technique_used, Some(Technique::ScriptClick));
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.failures[0].technique, Technique::Native);
    assert_eq!(outcome.failures[0].error.code, "CLICK_INTERCEPTED");
    let dom = dom.lock().unwrap();
    assert_eq!(dom.get(button).clicks, 1);
    assert_eq!(dom.count_calls("scroll"), 0);
    assert_eq!(dom.count_calls("hover_click"), 0);
    assert_eq!(dom.count_calls("dispatch_event"), 0);
}

#[tokio::test]
async fn test_header_occluded_button_uses_occluder_suppression() {
    let mut dom = FakeDom::new();
    let header = dom.add(&["css=header"]);
    let button = dom.add(&["id=save"]);
    dom.el(button).covered_by = Some(header);
    dom.fail(button, "script_click", BackendError::ScriptError("blocked by CSP".into()));
    let (mut backend, dom) = dom.into_backend();

    let element = resolve(&mut backend, "id=save").await;
    let outcome = executor()
        .act(&mut backend, &element, &Action::Click, &ActionOptions::default())
        .await
        .unwrap();

    assert!(outcome.succeeded);
    assert_eq!(outcome.technique_used, Some(Technique::HideOccluderThenClick));
    assert_eq!(outcome.attempts, 4);
    let dom = dom.lock().unwrap();
    assert_eq!(dom.get(button).clicks, 1);
    assert!(dom.called(&format!("hide #{}", header)));
    assert!(dom.called(&format!("restore #{}", header)));
    assert!(!dom.get(header).hidden);
}

#[tokio::test]
async fn test_occluder_restored_when_retry_fails() {
    let mut dom = FakeDom::new();
    let header = dom.add(&["css=header"]);
    let button = dom.add(&["id=save"]);
    dom.el(button).covered_by = Some(header);
    dom.fail(
        button,
        "click",
        BackendError::ElementNotInteractable {
            id: button,
            reason: "zero size".into(),
        },
    );
    dom.fail(button, "script_click", BackendError::ScriptError("blocked".into()));
    let (mut backend, dom) = dom.into_backend();

    let element = resolve(&mut backend, "id=save").await;
    let outcome = executor()
        .act(
            &mut backend,
            &element,
            &Action::Click,
            &ActionOptions::up_to(Technique::HideOccluderThenClick),
        )
        .await
        .unwrap();

    assert!(!outcome.succeeded);
    assert_eq!(outcome.attempts, 4);
    let dom = dom.lock().unwrap();
    let hide = dom
        .calls
        .iter()
        .position(|c| *c == format!("hide #{}", header))
        .unwrap();
    let restore = dom
        .calls
        .iter()
        .position(|c| *c == format!("restore #{}", header))
        .unwrap();
    assert!(hide < restore);
    assert!(!dom.get(header).hidden);
}

#[tokio::test]
async fn test_missing_occluder_fails_that_technique() {
    let mut dom = FakeDom::new();
    let button = dom.add(&["id=save"]);
    for op in ["click", "script_click", "hover_click"] {
        dom.fail(button, op, intercepted(button));
    }
    let (mut backend, _dom) = dom.into_backend();

    let element = resolve(&mut backend, "id=save").await;
    let outcome = executor()
        .act(&mut backend, &element, &Action::Click, &ActionOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.technique_used, Some(Technique::SyntheticEvent));
    let occluder_failure = outcome
        .failures
        .iter()
        .find(|f| f.technique == Technique::HideOccluderThenClick)
        .unwrap();
    assert!(occluder_failure.error.message.contains("no occluder present"));
}

#[tokio::test]
async fn test_exhausted_ladder_escalates() {
    let mut dom = FakeDom::new();
    let button = dom.add(&["id=save"]);
    for op in ["click", "script_click", "scroll", "hover_click", "dispatch_event"] {
        dom.fail(button, op, intercepted(button));
    }
    let (mut backend, _dom) = dom.into_backend();

    let element = resolve(&mut backend, "id=save").await;
    let outcome = executor()
        .act(&mut backend, &element, &Action::Click, &ActionOptions::default())
        .await
        .unwrap();

    assert!(!outcome.succeeded);
    assert_eq!(outcome.attempts, 6);
    let tried: Vec<Technique> = outcome.failures.iter().map(|f| f.technique).collect();
    assert_eq!(tried, Technique::LADDER.to_vec());

    let err = outcome.into_result("button", &Action::Click).unwrap_err();
    match err {
        EngineError::InteractionExhausted {
            target,
            action,
            failures,
        } => {
            assert_eq!(target, "button");
            assert_eq!(action, "click");
            assert_eq!(failures.len(), 6);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_stale_element_aborts_without_retry() {
    let mut dom = FakeDom::new();
    dom.add(&["id=save"]);
    let (mut backend, dom) = dom.into_backend();

    let element = resolve(&mut backend, "id=save").await;
    backend.refresh().await.unwrap();

    let err = executor()
        .act(&mut backend, &element, &Action::Click, &ActionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StaleReference { ref target } if target == "button"));
    let dom = dom.lock().unwrap();
    assert_eq!(dom.count_calls("script_click"), 0);
}

#[tokio::test]
async fn test_typing_falls_back_to_scripted_value() {
    let mut dom = FakeDom::new();
    let field = dom.add(&["id=name"]);
    dom.fail(
        field,
        "send_keys",
        BackendError::ElementNotInteractable {
            id: field,
            reason: "readonly overlay".into(),
        },
    );
    let (mut backend, dom) = dom.into_backend();

    let element = resolve(&mut backend, "id=name").await;
    let outcome = executor()
        .act(
            &mut backend,
            &element,
            &Action::Type("Linda".into()),
            &ActionOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.technique_used, Some(Technique::ScriptClick));
    assert_eq!(dom.lock().unwrap().get(field).value, "Linda");
}

#[tokio::test]
async fn test_session_fatal_error_propagates() {
    let mut dom = FakeDom::new();
    let button = dom.add(&["id=save"]);
    dom.fail(button, "click", BackendError::ConnectionLost);
    let (mut backend, _dom) = dom.into_backend();

    let element = resolve(&mut backend, "id=save").await;
    let err = executor()
        .act(&mut backend, &element, &Action::Click, &ActionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONNECTION_LOST");
}

#[tokio::test]
async fn test_synthetic_typing_fires_each_event_once() {
    let mut dom = FakeDom::new();
    let field = dom.add(&["id=name"]);
    let (mut backend, dom) = dom.into_backend();

    let element = resolve(&mut backend, "id=name").await;
    let outcome = ActionExecutor::with_techniques(vec![Box::new(SyntheticEventDispatch)], vec![])
        .act(
            &mut backend,
            &element,
            &Action::Type("Linda".into()),
            &ActionOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.technique_used, Some(Technique::SyntheticEvent));
    let dom = dom.lock().unwrap();
    assert_eq!(dom.get(field).value, "Linda");
    assert_eq!(dom.count_calls(&format!("set_value #{}", field)), 1);
    assert_eq!(dom.count_calls("event focus"), 1);
    assert_eq!(dom.count_calls("event blur"), 1);
    assert_eq!(dom.count_calls("event input"), 0);
    assert_eq!(dom.count_calls("event change"), 0);
}

#[tokio::test]
async fn test_pointer_technique_leaves_fields_untouched() {
    let mut dom = FakeDom::new();
    let field = dom.add(&["id=name"]);
    let (mut backend, dom) = dom.into_backend();
    let hover_only = ActionExecutor::with_techniques(vec![Box::new(HoverThenClick)], vec![]);

    let element = resolve(&mut backend, "id=name").await;
    let outcome = hover_only
        .act(
            &mut backend,
            &element,
            &Action::Type("Linda".into()),
            &ActionOptions::default(),
        )
        .await
        .unwrap();

    assert!(!outcome.succeeded);
    assert_eq!(outcome.failures[0].error.code, "NOT_SUPPORTED");
    {
        let dom = dom.lock().unwrap();
        assert_eq!(dom.count_calls("hover_click"), 0);
        assert_eq!(dom.get(field).clicks, 0);
        assert_eq!(dom.get(field).value, "");
    }

    let clicked = hover_only
        .act(&mut backend, &element, &Action::Click, &ActionOptions::default())
        .await
        .unwrap();
    assert_eq!(clicked.technique_used, Some(Technique::HoverThenClick));
    assert_eq!(dom.lock().unwrap().get(field).clicks, 1);
}
