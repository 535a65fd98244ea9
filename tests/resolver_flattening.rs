//! Integration tests for RUN_AFTER_TEST resolution

use pretty_assertions::assert_eq;
use std::sync::Arc;

use crusher_replay::{Action, ActionType, InMemoryGateway, ResolveError, Resolver, TestId};
use crusher_replay::runner::ErrorKind;

fn types(actions: &[Action]) -> Vec<ActionType> {
    actions.iter().map(|a| a.action_type).collect()
}

fn selectors(actions: &[Action]) -> Vec<String> {
    actions.iter().filter_map(|a| a.payload.selector.clone()).collect()
}

#[tokio::test]
async fn test_reference_is_inlined_in_place() {
    let gateway = InMemoryGateway::new().with_test("2", vec![Action::click("#c"), Action::click("#d")]);
    let resolver = Resolver::new(Arc::new(gateway));

    let device = Action::set_device("GoogleChromeLargeScreen");
    let actions = vec![device.clone(), Action::run_after_test("2"), Action::click("#b")];
    let flat = resolver.resolve(&actions, true).await.unwrap();

    assert_eq!(
        flat,
        vec![device, Action::click("#c"), Action::click("#d"), Action::click("#b")]
    );
}

#[tokio::test]
async fn test_browser_actions_precede_main_actions() {
    let resolver = Resolver::new(Arc::new(InMemoryGateway::new()));
    let actions = vec![
        Action::navigate("https://shop.test"),
        Action::set_device("Pixel5"),
        Action::click("#a"),
        Action::set_device("iPhone12"),
        Action::click("#b"),
    ];
    let flat = resolver.resolve(&actions, true).await.unwrap();

    assert_eq!(
        types(&flat),
        vec![
            ActionType::SetDevice,
            ActionType::SetDevice,
            ActionType::NavigateUrl,
            ActionType::Click,
            ActionType::Click
        ]
    );
    assert_eq!(flat[0].meta_str("value"), Some("Pixel5"));
    assert_eq!(flat[1].meta_str("value"), Some("iPhone12"));
}

#[tokio::test]
async fn test_sub_test_browser_actions_are_dropped() {
    let gateway = InMemoryGateway::new().with_test(
        "login",
        vec![
            Action::set_device("iPhone12"),
            Action::navigate("https://shop.test/login"),
            Action::input("#email", "a@b.c"),
        ],
    );
    let resolver = Resolver::new(Arc::new(gateway));
    let actions = vec![
        Action::set_device("GoogleChromeLargeScreen"),
        Action::run_after_test("login"),
        Action::click("#checkout"),
    ];
    let flat = resolver.resolve(&actions, true).await.unwrap();

    assert_eq!(
        types(&flat),
        vec![
            ActionType::SetDevice,
            ActionType::NavigateUrl,
            ActionType::Input,
            ActionType::Click
        ]
    );
    assert_eq!(flat[0].meta_str("value"), Some("GoogleChromeLargeScreen"));
}

#[tokio::test]
async fn test_nested_references_resolve_depth_first() {
    let gateway = InMemoryGateway::new()
        .with_test("1", vec![Action::run_after_test("2"), Action::click("#one")])
        .with_test("2", vec![Action::run_after_test("3"), Action::click("#two")])
        .with_test("3", vec![Action::click("#three")]);
    let gateway = Arc::new(gateway);
    let resolver = Resolver::new(gateway.clone());

    let flat = resolver.resolve_test(&TestId::from(1)).await.unwrap();
    assert_eq!(selectors(&flat), vec!["#three", "#two", "#one"]);
    assert_eq!(gateway.fetch_count(), 3);
}

#[tokio::test]
async fn test_flat_recording_is_unchanged_and_resolution_is_idempotent() {
    let resolver = Resolver::new(Arc::new(InMemoryGateway::new()));
    let recording = vec![
        Action::set_device("GoogleChromeLargeScreen"),
        Action::navigate("https://shop.test"),
        Action::click("#a"),
        Action::input("#q", "shoes"),
    ];

    let once = resolver.resolve(&recording, true).await.unwrap();
    assert_eq!(once, recording);

    let twice = resolver.resolve(&once, true).await.unwrap();
    assert_eq!(twice, once);
}

#[tokio::test]
async fn test_self_reference_is_a_cycle() {
    let gateway = InMemoryGateway::new().with_test("7", vec![Action::run_after_test("7"), Action::click("#x")]);
    let resolver = Resolver::new(Arc::new(gateway));

    let err = resolver.resolve_test(&TestId::from(7)).await.unwrap_err();
    assert!(matches!(err, ResolveError::CyclicReference { .. }));
    assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
}

#[tokio::test]
async fn test_missing_sub_test_is_fetch_failure() {
    let resolver = Resolver::new(Arc::new(InMemoryGateway::new()));
    let actions = vec![Action::run_after_test("404"), Action::click("#a")];

    let err = resolver.resolve(&actions, true).await.unwrap_err();
    match err {
        ResolveError::FetchFailed { test_id, .. } => assert_eq!(test_id, TestId::from(404)),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_numeric_reference_from_recorder_json() {
    let gateway = InMemoryGateway::new().with_test("12", vec![Action::click("#sub")]);
    let resolver = Resolver::new(Arc::new(gateway));
    let actions: Vec<Action> = serde_json::from_value(serde_json::json!([
        { "type": "BROWSER_RUN_AFTER_TEST", "payload": { "meta": { "value": 12 } } },
        { "type": "ELEMENT_CLICK", "payload": { "selector": "#main" } }
    ]))
    .unwrap();

    let flat = resolver.resolve(&actions, true).await.unwrap();
    assert_eq!(selectors(&flat), vec!["#sub", "#main"]);
}
