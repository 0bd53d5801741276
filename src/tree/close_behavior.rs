//! Choosing what happens to a parent's children.
//!
//! Pure decision functions; `detach_all_children` executes the result.

use crate::tab::TabNode;
use tabtree_config::{CloseParentBehavior, Config, TreeBehaviorScope};

/// Circumstances of the close (or pin, or window move) being handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseContext {
    /// The caller wants the children kept alive no matter what
    pub keep_children: bool,
    /// A tree view is visible in the tab's window
    pub tree_view_visible: bool,
    /// The change was made from the tree view itself
    pub by_internal_operation: bool,
}

/// Whether subtree semantics apply to a change, per the configured scope
pub fn should_apply_tree_behavior(
    scope: TreeBehaviorScope,
    tree_view_visible: bool,
    by_internal_operation: bool,
) -> bool {
    match scope {
        TreeBehaviorScope::Always => true,
        TreeBehaviorScope::OnlyWhenVisible => tree_view_visible,
        TreeBehaviorScope::OnlyOnTreeView => by_internal_operation,
    }
}

/// Resolve the behavior for a tab about to lose its place.
///
/// `parent_child_count` is the number of children of the tab's own parent
/// (0 when the tab is a root).
pub fn resolve_close_parent_behavior(
    tab: &TabNode,
    parent_child_count: usize,
    config: &Config,
    context: CloseContext,
) -> CloseParentBehavior {
    let apply_tree = should_apply_tree_behavior(
        config.parent_tab_behavior_for_changes,
        context.tree_view_visible,
        context.by_internal_operation,
    );
    let keep_children = context.keep_children || !apply_tree;

    if !keep_children && tab.collapsed() && tab.has_children() {
        return CloseParentBehavior::CloseAllChildren;
    }

    let mut behavior = config.close_parent_behavior;
    if keep_children
        && !matches!(
            behavior,
            CloseParentBehavior::PromoteFirstChild
                | CloseParentBehavior::PromoteAllChildren
                | CloseParentBehavior::DetachAllChildren
        )
    {
        behavior = CloseParentBehavior::PromoteFirstChild;
    }

    if behavior == CloseParentBehavior::PromoteFirstChild
        && parent_child_count == 1
        && config.promote_all_children_when_closed_parent_is_last_child
    {
        behavior = CloseParentBehavior::PromoteAllChildren;
    }
    behavior
}
