//! Host moves the engine did not cause, and what they do to the tree.
//!
//! Each scenario builds a window through `opened` events, reports one
//! foreign `moved` event and checks the resulting parent links.

mod common;

use common::{WINDOW, children, engine_with_tree, moved, order, parent, quiet_config};
use tabtree::Config;
use tabtree::host::{HostCommand, HostEvent};
use tabtree::tab::Placement;
use tabtree_config::TreeBehaviorScope;
use tokio::time::Instant;

#[test]
fn test_drag_to_top_detaches() {
    // 1, 2 > 3
    let mut engine = engine_with_tree(quiet_config(), &[(1, None), (2, None), (3, Some(2))]);
    assert_eq!(parent(&engine, 3), Some(2));

    moved(&mut engine, 3, 2, 0);
    assert_eq!(order(&engine), vec![3, 1, 2]);
    assert_eq!(parent(&engine, 3), None);
    assert!(children(&engine, 2).is_empty());
}

#[test]
fn test_drop_between_siblings_adopts_their_parent() {
    // 1 > {2, 3}, 4
    let mut engine = engine_with_tree(
        quiet_config(),
        &[(1, None), (2, Some(1)), (3, Some(1)), (4, None)],
    );

    moved(&mut engine, 4, 3, 2);
    assert_eq!(parent(&engine, 4), Some(1));
    assert_eq!(children(&engine, 1), vec![2, 4, 3]);
}

#[test]
fn test_swapping_siblings_only_reorders_children() {
    // 1 > {2, 3}: drag 3 directly before 2
    let mut engine = engine_with_tree(quiet_config(), &[(1, None), (2, Some(1)), (3, Some(1))]);

    moved(&mut engine, 3, 2, 1);
    assert_eq!(order(&engine), vec![1, 3, 2]);
    assert_eq!(parent(&engine, 3), Some(1));
    assert_eq!(parent(&engine, 2), Some(1));
    assert_eq!(children(&engine, 1), vec![3, 2]);
}

#[test]
fn test_drop_into_own_subtree_is_undone() {
    // 1 > 2 > 3
    let mut engine = engine_with_tree(quiet_config(), &[(1, None), (2, Some(1)), (3, Some(2))]);

    let out = moved(&mut engine, 1, 0, 1);
    assert_eq!(order(&engine), vec![1, 2, 3]);
    assert_eq!(parent(&engine, 1), None);
    assert_eq!(parent(&engine, 2), Some(1));
    assert!(out.commands.iter().any(|issued| issued.command
        == HostCommand::Move {
            tabs: vec![1],
            window: WINDOW,
            placement: Placement::Before(2),
        }));
}

#[test]
fn test_drop_at_end_leaves_unrelated_tree() {
    // 1 > 2, 3: dragging 2 to the very end leaves the tree of 1
    let mut engine = engine_with_tree(quiet_config(), &[(1, None), (2, Some(1)), (3, None)]);

    moved(&mut engine, 2, 1, 2);
    assert_eq!(order(&engine), vec![1, 3, 2]);
    assert_eq!(parent(&engine, 2), None);
}

#[test]
fn test_moved_subtree_follows_its_root() {
    // 1, 2 > 3, 4: drag 2 to the top; its child comes along
    let mut engine = engine_with_tree(
        quiet_config(),
        &[(1, None), (2, None), (3, Some(2)), (4, None)],
    );

    let out = moved(&mut engine, 2, 1, 0);
    assert_eq!(order(&engine), vec![2, 3, 1, 4]);
    assert_eq!(parent(&engine, 3), Some(2));
    assert!(out.commands.iter().any(|issued| matches!(
        &issued.command,
        HostCommand::Move { tabs, .. } if tabs == &vec![3]
    )));
}

#[test]
fn test_stale_move_is_ignored() {
    let mut engine = engine_with_tree(quiet_config(), &[(1, None), (2, None)]);
    let out = moved(&mut engine, 42, 0, 1);
    assert!(out.is_empty());
    assert_eq!(order(&engine), vec![1, 2]);
}

#[test]
fn test_pinned_tab_moves_do_not_touch_tree() {
    let mut engine = engine_with_tree(quiet_config(), &[(1, None), (2, None), (3, Some(2))]);
    engine.handle_event(HostEvent::Pinned { tab: 1 }, Instant::now());

    moved(&mut engine, 1, 0, 1);
    assert_eq!(parent(&engine, 3), Some(2));
    assert!(engine.registry().get(1).unwrap().parent().is_none());
}

#[test]
fn test_outside_tree_view_scope_only_loosens() {
    // 1 > 2 > 3, tree behavior limited to tree view operations
    let config = Config {
        parent_tab_behavior_for_changes: TreeBehaviorScope::OnlyOnTreeView,
        ..quiet_config()
    };
    let mut engine = engine_with_tree(config, &[(1, None), (2, Some(1)), (3, Some(2))]);

    moved(&mut engine, 2, 1, 2);
    assert_eq!(order(&engine), vec![1, 3, 2]);
    assert_eq!(parent(&engine, 2), None);
    assert_eq!(parent(&engine, 3), Some(1));
}
