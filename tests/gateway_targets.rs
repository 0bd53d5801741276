//! External collaborator requests: target resolution, state tags and holds.
//!
//! Requests are built from their JSON wire form where the shape matters, so
//! these tests also pin down what collaborators actually send.

mod common;

use common::{WINDOW, engine_with_tree, quiet_config};
use std::collections::BTreeMap;
use tabtree::host::{HostEvent, HostTab};
use tabtree::{Engine, Reply, gateway};
use tabtree_protocol::{
    ExternalResponse, InternalMessage, InternalResponse, TreeNotification,
};
use tokio::time::Instant;

const OTHER_WINDOW: u64 = 2;

/// Window 1: 1 > 2, 3. Window 2: 4.
fn two_windows() -> Engine {
    let mut engine = engine_with_tree(quiet_config(), &[(1, None), (2, Some(1)), (3, None)]);
    engine.handle_event(
        HostEvent::Opened {
            tab: HostTab::new(4, OTHER_WINDOW, 0, "https://example.org/"),
        },
        Instant::now(),
    );
    engine
}

fn external(engine: &mut Engine, sender: &str, json: &str) -> (ExternalResponse, Vec<TreeNotification>) {
    let request = gateway::parse_request(json).unwrap();
    let (id, out) = engine.handle_external(sender, request, Instant::now());
    let response = match out.reply_for(id) {
        Some(Reply::External(response)) => response.clone(),
        other => panic!("no external reply for {json}: {other:?}"),
    };
    (response, out.notifications)
}

fn tab_ids(response: &ExternalResponse) -> Vec<u64> {
    match response {
        ExternalResponse::Tabs(tabs) => tabs.iter().map(|tab| tab.id).collect(),
        ExternalResponse::Tab(tab) => vec![tab.id],
        other => panic!("expected tabs, got {other:?}"),
    }
}

fn scroll_locks(engine: &mut Engine) -> BTreeMap<String, bool> {
    let (id, out) = engine.handle_internal(InternalMessage::RequestScrollLockState {}, Instant::now());
    match out.reply_for(id) {
        Some(Reply::Internal(InternalResponse::ScrollLocks(locks))) => locks.clone(),
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn test_window_target_returns_roots_with_nested_children() {
    let mut engine = two_windows();
    let (response, _) = external(&mut engine, "ext@example", r#"{"type":"get-tree","window":1}"#);

    assert_eq!(tab_ids(&response), vec![1, 3]);
    let ExternalResponse::Tabs(tabs) = response else {
        unreachable!()
    };
    assert_eq!(tabs[0].children.len(), 1);
    assert_eq!(tabs[0].children[0].id, 2);
    assert_eq!(tabs[0].children[0].indent, 1);
    assert_eq!(tabs[0].children[0].ancestor_tab_ids, vec![1]);
}

#[test]
fn test_window_tab_wildcard_returns_every_tab() {
    let mut engine = two_windows();
    let (response, _) = external(
        &mut engine,
        "ext@example",
        r#"{"type":"get-tree","window":1,"tab":"*"}"#,
    );
    assert_eq!(tab_ids(&response), vec![1, 2, 3]);
}

#[test]
fn test_window_tabs_wildcard_returns_roots() {
    let mut engine = two_windows();
    let (response, _) = external(
        &mut engine,
        "ext@example",
        r#"{"type":"get-tree","window":1,"tabs":"*"}"#,
    );
    assert_eq!(tab_ids(&response), vec![1, 3]);
}

#[test]
fn test_bare_wildcard_uses_last_focused_window() {
    let mut engine = two_windows();
    engine.handle_event(
        HostEvent::Activated {
            tab: 4,
            window: OTHER_WINDOW,
        },
        Instant::now(),
    );

    let (response, _) = external(&mut engine, "ext@example", r#"{"type":"get-tree","tab":"*"}"#);
    assert_eq!(tab_ids(&response), vec![4]);

    engine.handle_event(
        HostEvent::Activated {
            tab: 3,
            window: WINDOW,
        },
        Instant::now(),
    );
    let (response, _) = external(&mut engine, "ext@example", r#"{"type":"get-tree","tabs":"*"}"#);
    assert_eq!(tab_ids(&response), vec![1, 2, 3]);
}

#[test]
fn test_explicit_ids_keep_request_order_across_windows() {
    let mut engine = two_windows();
    let (response, _) = external(
        &mut engine,
        "ext@example",
        r#"{"type":"get-tree","tabs":[4,2]}"#,
    );
    assert_eq!(tab_ids(&response), vec![4, 2]);
}

#[test]
fn test_single_tab_target_answers_with_one_tab() {
    let mut engine = two_windows();
    let (response, _) = external(&mut engine, "ext@example", r#"{"type":"get-tree","tab":2}"#);
    match response {
        ExternalResponse::Tab(tab) => {
            assert_eq!(tab.id, 2);
            assert_eq!(tab.window_id, WINDOW);
            assert!(!tab.hidden);
        }
        other => panic!("expected a single tab, got {other:?}"),
    }
}

#[test]
fn test_add_and_remove_tab_state() {
    let mut engine = two_windows();
    let (response, notifications) = external(
        &mut engine,
        "ext@example",
        r#"{"type":"add-tab-state","tabs":[1,3],"state":"marked"}"#,
    );
    assert_eq!(response, ExternalResponse::Ack(true));
    assert!(notifications.contains(&TreeNotification::TabStateChanged {
        tabs: vec![1, 3],
        added: vec!["marked".to_string()],
        removed: Vec::new(),
    }));
    assert!(engine.registry().get(3).unwrap().states.contains("marked"));

    let (response, _) = external(
        &mut engine,
        "ext@example",
        r#"{"type":"remove-tab-state","tab":3,"states":["marked"]}"#,
    );
    assert_eq!(response, ExternalResponse::Ack(true));
    assert!(!engine.registry().get(3).unwrap().states.contains("marked"));
    assert!(engine.registry().get(1).unwrap().states.contains("marked"));
}

#[test]
fn test_collapse_tree_hides_children() {
    let mut engine = two_windows();
    let (response, _) = external(&mut engine, "ext@example", r#"{"type":"collapse-tree","tab":1}"#);
    assert_eq!(response, ExternalResponse::Ack(true));

    let (response, _) = external(&mut engine, "ext@example", r#"{"type":"get-tree","tab":2}"#);
    let ExternalResponse::Tab(tab) = response else {
        panic!("expected a single tab");
    };
    assert!(tab.hidden);
}

#[test]
fn test_scroll_locks_are_dropped_on_unregister() {
    let mut engine = two_windows();
    external(&mut engine, "a@example", r#"{"type":"register-self","name":"A"}"#);
    external(&mut engine, "b@example", r#"{"type":"register-self"}"#);
    let (response, _) = external(&mut engine, "a@example", r#"{"type":"scroll-lock"}"#);
    assert_eq!(response, ExternalResponse::Ack(true));

    let locks = scroll_locks(&mut engine);
    assert_eq!(locks.get("a@example"), Some(&true));
    assert_eq!(locks.get("b@example"), Some(&false));
    assert!(engine.gateway().scroll_locked());

    let (response, _) = external(&mut engine, "b@example", r#"{"type":"scroll-unlock"}"#);
    assert_eq!(response, ExternalResponse::Ack(false));

    let (response, _) = external(&mut engine, "a@example", r#"{"type":"unregister-self"}"#);
    assert_eq!(response, ExternalResponse::Ack(true));
    assert!(!engine.gateway().scroll_locked());
    assert_eq!(scroll_locks(&mut engine).len(), 1);
}

#[test]
fn test_unregister_unknown_sender_is_refused() {
    let mut engine = two_windows();
    let (response, _) = external(&mut engine, "nobody@example", r#"{"type":"unregister-self"}"#);
    assert_eq!(response, ExternalResponse::Ack(false));
}

#[test]
fn test_listeners_follow_listening_types() {
    let mut engine = two_windows();
    external(
        &mut engine,
        "picky@example",
        r#"{"type":"register-self","listeningTypes":["attached"]}"#,
    );
    external(&mut engine, "all@example", r#"{"type":"register-self"}"#);

    assert_eq!(
        engine.listeners("attached"),
        vec!["all@example".to_string(), "picky@example".to_string()]
    );
    assert_eq!(engine.listeners("detached"), vec!["all@example".to_string()]);
}

#[test]
fn test_attach_request_moves_child_under_parent() {
    let mut engine = two_windows();
    let (response, notifications) = external(
        &mut engine,
        "ext@example",
        r#"{"type":"attach","child":3,"parent":2}"#,
    );
    assert_eq!(response, ExternalResponse::Ack(true));
    assert_eq!(engine.registry().get(3).unwrap().parent(), Some(2));
    assert!(notifications.iter().any(|note| matches!(
        note,
        TreeNotification::Attached { tab: 3, parent: 2, .. }
    )));
}

#[test]
fn test_malformed_request_is_rejected_before_dispatch() {
    assert!(matches!(
        gateway::parse_request(r#"{"type":"get-tree","tabs":"some"}"#),
        Err(tabtree::GatewayError::InvalidRequest(_))
    ));
    assert!(gateway::parse_request(r#"{"type":"no-such-request"}"#).is_err());
}

#[test]
fn test_responses_encode_as_bare_values() {
    assert_eq!(
        gateway::encode_response(&ExternalResponse::Ack(true)).unwrap(),
        "true"
    );
    assert_eq!(
        gateway::encode_response(&ExternalResponse::Missing).unwrap(),
        "null"
    );
}
