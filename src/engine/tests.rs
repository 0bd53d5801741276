use super::*;
use crate::cache::MemoryCache;
use crate::host::{HostEvent, HostTab};
use std::sync::Arc;
use std::time::Duration;
use tabtree_protocol::{CollapseCause, ExternalRequest, InternalMessage, TargetSpec};
use uuid::Uuid;

const WINDOW: WindowId = 1;

fn open_tab(engine: &mut Engine, tab: HostTab, now: Instant) -> Output {
    engine.handle_event(HostEvent::Opened { tab }, now)
}

fn open(engine: &mut Engine, id: TabId, index: usize, opener: Option<TabId>, now: Instant) -> Output {
    let mut tab = HostTab::new(id, WINDOW, index, format!("https://example.com/{id}"));
    tab.opener = opener;
    open_tab(engine, tab, now)
}

fn parent(engine: &Engine, id: TabId) -> Option<TabId> {
    engine.registry().get(id).and_then(|node| node.parent())
}

fn order(engine: &Engine) -> Vec<TabId> {
    engine.registry().tabs_in_window(WINDOW)
}

fn quiet_config() -> Config {
    Config {
        auto_group_new_tabs: false,
        ..Config::default()
    }
}

#[test]
fn test_tab_opened_from_opener_becomes_child() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    open(&mut engine, 1, 0, None, now);
    let out = open(&mut engine, 2, 1, Some(1), now);

    assert_eq!(parent(&engine, 2), Some(1));
    assert!(out.notifications.contains(&TreeNotification::Attached {
        tab: 2,
        parent: 1,
        window: WINDOW,
    }));
    assert!(out.commands.is_empty());
}

#[test]
fn test_attach_move_echo_is_not_reclassified() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    open(&mut engine, 1, 0, None, now);
    open(&mut engine, 2, 1, None, now);
    // Host puts the child between 1 and 2; it belongs after its opener 2
    let out = open(&mut engine, 3, 1, Some(2), now);

    assert_eq!(order(&engine), vec![1, 2, 3]);
    let move_id = out
        .commands
        .iter()
        .find(|issued| matches!(&issued.command, HostCommand::Move { tabs, .. } if tabs == &vec![3]))
        .map(|issued| issued.id)
        .unwrap();

    let echo = engine.handle_event(
        HostEvent::Moved {
            tab: 3,
            window: WINDOW,
            from_index: 1,
            to_index: 2,
        },
        now,
    );
    assert!(echo.commands.is_empty());
    assert_eq!(parent(&engine, 3), Some(2));

    engine.handle_completion(move_id, Ok(CommandOutcome::Done), now);
    assert_eq!(engine.pending_commands(), 0);
    assert_eq!(engine.registry().window(WINDOW).unwrap().internal_moving_count, 0);
}

#[test]
fn test_failed_move_rolls_back_counter() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    open(&mut engine, 1, 0, None, now);
    open(&mut engine, 2, 1, None, now);
    let out = open(&mut engine, 3, 1, Some(2), now);
    let issued = &out.commands[0];
    assert_eq!(engine.registry().window(WINDOW).unwrap().internal_moving_count, 1);

    engine.handle_completion(issued.id, Err(HostError::TabMissing(3)), now);
    assert_eq!(engine.registry().window(WINDOW).unwrap().internal_moving_count, 0);
}

#[test]
fn test_foreign_move_before_child_attaches() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    open(&mut engine, 1, 0, None, now);
    open(&mut engine, 2, 1, Some(1), now);
    open(&mut engine, 3, 2, None, now);

    engine.handle_event(
        HostEvent::Moved {
            tab: 3,
            window: WINDOW,
            from_index: 2,
            to_index: 1,
        },
        now,
    );
    assert_eq!(order(&engine), vec![1, 3, 2]);
    assert_eq!(parent(&engine, 3), Some(1));
    assert_eq!(engine.registry().get(1).unwrap().children(), &[3, 2]);
}

#[test]
fn test_close_parent_promotes_first_child() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    open(&mut engine, 1, 0, None, now);
    open(&mut engine, 2, 1, Some(1), now);
    open(&mut engine, 3, 2, Some(1), now);

    engine.handle_event(
        HostEvent::Closed {
            tab: 1,
            window: WINDOW,
            window_closing: false,
        },
        now,
    );
    assert!(!engine.registry().contains(1));
    assert_eq!(parent(&engine, 2), None);
    assert_eq!(parent(&engine, 3), Some(2));
}

#[test]
fn test_close_collapsed_parent_closes_subtree() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    open(&mut engine, 1, 0, None, now);
    open(&mut engine, 2, 1, Some(1), now);
    open(&mut engine, 3, 2, Some(1), now);
    engine.handle_internal(
        InternalMessage::ChangeSubtreeCollapsedState {
            tab: 1,
            collapsed: true,
            cause: CollapseCause::Manual,
        },
        now,
    );

    let out = engine.handle_event(
        HostEvent::Closed {
            tab: 1,
            window: WINDOW,
            window_closing: false,
        },
        now,
    );
    let mut closed: Vec<TabId> = out
        .commands
        .iter()
        .filter_map(|issued| match issued.command {
            HostCommand::Close { tab } => Some(tab),
            _ => None,
        })
        .collect();
    closed.sort();
    assert_eq!(closed, vec![2, 3]);
}

#[test]
fn test_pinning_promotes_children() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    open(&mut engine, 1, 0, None, now);
    open(&mut engine, 2, 1, Some(1), now);

    engine.handle_event(HostEvent::Pinned { tab: 1 }, now);
    assert!(engine.registry().get(1).unwrap().pinned);
    assert_eq!(parent(&engine, 2), None);
    assert!(!engine.registry().get(1).unwrap().has_children());
}

#[test]
fn test_focus_on_hidden_child_redirects_to_parent() {
    let now = Instant::now();
    let mut engine = Engine::new(Config {
        auto_expand_on_collapsed_child_focused: false,
        ..quiet_config()
    });
    open(&mut engine, 1, 0, None, now);
    open(&mut engine, 2, 1, Some(1), now);
    engine.handle_internal(
        InternalMessage::ChangeSubtreeCollapsedState {
            tab: 1,
            collapsed: true,
            cause: CollapseCause::Manual,
        },
        now,
    );

    let out = engine.handle_event(HostEvent::Activated { tab: 2, window: WINDOW }, now);
    assert!(out
        .notifications
        .contains(&TreeNotification::FocusRedirected { from: 2, to: 1 }));
    assert!(out
        .commands
        .iter()
        .any(|issued| issued.command == HostCommand::Activate { tab: 1 }));
}

#[test]
fn test_burst_of_orphans_is_grouped() {
    let now = Instant::now();
    let mut engine = Engine::new(Config::default());
    for id in 1..=3 {
        open(&mut engine, id, (id - 1) as usize, None, now);
    }
    assert!(engine.next_deadline().is_some());

    let out = engine.tick(now + Duration::from_millis(200));
    let request = out
        .commands
        .iter()
        .find_map(|issued| match &issued.command {
            HostCommand::Open(request) => Some(request.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(request.placement, Some(Placement::Before(1)));

    let mut group = HostTab::new(4, WINDOW, 0, request.url);
    group.active = false;
    open_tab(&mut engine, group, now);
    let node = engine.registry().get(4).unwrap();
    assert!(node.is_temporary_group());
    assert_eq!(node.children(), &[1, 2, 3]);
}

#[test]
fn test_blocked_grouping_skips_burst() {
    let now = Instant::now();
    let mut engine = Engine::new(Config::default());
    let (id, out) = engine.handle_external("ext@example", ExternalRequest::BlockGrouping {}, now);
    assert_eq!(
        out.reply_for(id),
        Some(&Reply::External(ExternalResponse::Ack(true)))
    );
    for id in 1..=3 {
        open(&mut engine, id, (id - 1) as usize, None, now);
    }
    let out = engine.tick(now + Duration::from_millis(200));
    assert!(out.commands.is_empty());
}

#[test]
fn test_request_waits_for_registration() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    let (id, out) = engine.handle_external(
        "ext@example",
        ExternalRequest::GetTree {
            target: TargetSpec::tab(5),
        },
        now,
    );
    assert!(out.reply_for(id).is_none());
    assert_eq!(engine.gateway().parked_len(), 1);

    let out = open(&mut engine, 5, 0, None, now);
    assert!(matches!(
        out.reply_for(id),
        Some(Reply::External(ExternalResponse::Tab(tab))) if tab.id == 5
    ));
}

#[test]
fn test_parked_request_expires() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    let (id, _) = engine.handle_external(
        "ext@example",
        ExternalRequest::GetTree {
            target: TargetSpec::tab(99),
        },
        now,
    );
    let out = engine.tick(now + Duration::from_secs(2));
    assert_eq!(
        out.reply_for(id),
        Some(&Reply::External(ExternalResponse::Missing))
    );
}

#[test]
fn test_new_tabs_reply_after_all_opens() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    open(&mut engine, 1, 0, None, now);

    let (request, out) = engine.handle_internal(
        InternalMessage::NewTabs {
            urls: vec!["https://a.example/".into(), "https://b.example/".into()],
            window: None,
            parent: Some(1),
            insert_before: None,
            insert_after: None,
            partition: None,
        },
        now,
    );
    assert!(out.reply_for(request).is_none());
    let ids: Vec<CommandId> = out.commands.iter().map(|issued| issued.id).collect();
    assert_eq!(ids.len(), 2);

    open_tab(&mut engine, HostTab::new(10, WINDOW, 1, "https://a.example/"), now);
    open_tab(&mut engine, HostTab::new(11, WINDOW, 2, "https://b.example/"), now);
    assert_eq!(parent(&engine, 10), Some(1));
    assert_eq!(parent(&engine, 11), Some(1));

    let first = engine.handle_completion(ids[0], Ok(CommandOutcome::Opened(10)), now);
    assert!(first.reply_for(request).is_none());
    let second = engine.handle_completion(ids[1], Ok(CommandOutcome::Opened(11)), now);
    assert_eq!(
        second.reply_for(request),
        Some(&Reply::Internal(InternalResponse::Tabs(vec![10, 11])))
    );
}

#[test]
fn test_open_completion_before_event_runs_continuation() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    open(&mut engine, 1, 0, None, now);
    let (_, out) = engine.handle_internal(
        InternalMessage::NewTabs {
            urls: vec!["https://a.example/".into()],
            window: Some(WINDOW),
            parent: Some(1),
            insert_before: None,
            insert_after: None,
            partition: None,
        },
        now,
    );
    let id = out.commands[0].id;
    engine.handle_completion(id, Ok(CommandOutcome::Opened(10)), now);
    // The host rewrote the URL, so only the completion identifies the tab
    open_tab(&mut engine, HostTab::new(10, WINDOW, 1, "https://a.example/landing"), now);
    assert_eq!(parent(&engine, 10), Some(1));
    assert!(engine.registry().get(10).unwrap().origin.internal);
}

#[test]
fn test_reopened_tab_regains_parent() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    open(&mut engine, 1, 0, None, now);
    open(&mut engine, 2, 1, Some(1), now);
    let pid = engine.registry().get(2).unwrap().persistent_id;
    engine.handle_event(
        HostEvent::Closed {
            tab: 2,
            window: WINDOW,
            window_closing: false,
        },
        now,
    );

    let mut reopened = HostTab::new(3, WINDOW, 1, "https://example.com/2");
    reopened.restored = true;
    reopened.persistent_id = Some(pid);
    open_tab(&mut engine, reopened, now);
    assert_eq!(parent(&engine, 3), Some(1));
}

#[test]
fn test_cached_tree_restores_window() {
    let now = Instant::now();
    let cache = Arc::new(MemoryCache::new());
    let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());

    let mut engine = Engine::new(quiet_config()).with_cache(cache.clone());
    let mut root = HostTab::new(1, WINDOW, 0, "https://example.com/1");
    root.persistent_id = Some(p1);
    let mut child = HostTab::new(2, WINDOW, 1, "https://example.com/2");
    child.persistent_id = Some(p2);
    child.opener = Some(1);
    open_tab(&mut engine, root, now);
    open_tab(&mut engine, child, now);
    engine.tick(now + Duration::from_secs(1));
    assert_eq!(cache.len(), 1);

    // A later session restores the same tabs under new ids
    let mut engine = Engine::new(quiet_config()).with_cache(cache);
    for (id, index, pid) in [(7, 0, p1), (8, 1, p2)] {
        let mut tab = HostTab::new(id, WINDOW, index, format!("https://example.com/{index}"));
        tab.restored = true;
        tab.persistent_id = Some(pid);
        open_tab(&mut engine, tab, now);
    }
    assert!(engine.registry().window(WINDOW).unwrap().restoring);
    assert_eq!(parent(&engine, 8), None);

    engine.handle_event(HostEvent::WindowRestored { window: WINDOW }, now);
    assert_eq!(parent(&engine, 8), Some(7));
    assert!(!engine.registry().window(WINDOW).unwrap().restoring);
}

#[test]
fn test_attach_request_rejects_self_parent() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    open(&mut engine, 1, 0, None, now);
    let (id, out) = engine.handle_external(
        "ext@example",
        ExternalRequest::Attach {
            child: 1,
            parent: 1,
            insert_before: None,
            insert_after: None,
        },
        now,
    );
    assert_eq!(
        out.reply_for(id),
        Some(&Reply::External(ExternalResponse::Ack(false)))
    );
}

#[test]
fn test_stale_message_is_refused() {
    let now = Instant::now();
    let mut engine = Engine::new(quiet_config());
    let (id, out) = engine.handle_internal(InternalMessage::DetachTab { tab: 42 }, now);
    assert_eq!(
        out.reply_for(id),
        Some(&Reply::Internal(InternalResponse::Ack(false)))
    );
}
