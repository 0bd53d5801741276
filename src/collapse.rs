//! Collapse/expand propagation and focus handling.

use crate::tab::TabRegistry;
use crate::tree::{self, TreeEffects, refresh_subtree_collapsed};
use std::collections::HashSet;
use tabtree_config::{Config, TabId};
use tabtree_protocol::{CollapseCause, TreeNotification};

/// Set the own collapsed flag of `tab` and recompute its descendants'
/// derived status. Descendants' own flags are left untouched.
///
/// Returns false when the tab is unknown or already in that state.
pub fn set_collapsed(
    registry: &mut TabRegistry,
    tab: TabId,
    collapsed: bool,
    cause: CollapseCause,
    effects: &mut TreeEffects,
) -> bool {
    let Some(node) = registry.get(tab) else {
        log::debug!("set_collapsed {}: stale tab", tab);
        return false;
    };
    if node.collapsed() == collapsed {
        return false;
    }
    let window = node.window;
    let descendants = tree::descendants(registry, tab);
    let hidden_before: HashSet<TabId> = descendants
        .iter()
        .copied()
        .filter(|&t| tree::is_hidden(registry, t))
        .collect();

    if let Some(node) = registry.get_mut(tab) {
        node.collapsed = collapsed;
    }
    refresh_subtree_collapsed(registry, tab);

    let mut hidden = Vec::new();
    let mut shown = Vec::new();
    for id in descendants {
        match (hidden_before.contains(&id), tree::is_hidden(registry, id)) {
            (false, true) => hidden.push(id),
            (true, false) => shown.push(id),
            _ => {}
        }
    }
    log::debug!(
        "Tab {} {} ({:?}): {} hidden, {} shown",
        tab,
        if collapsed { "collapsed" } else { "expanded" },
        cause,
        hidden.len(),
        shown.len()
    );
    effects.notifications.push(TreeNotification::CollapsedStateChanged {
        tab,
        collapsed,
        cause,
    });
    effects.notifications.push(TreeNotification::CollapseExpandDone {
        tab,
        collapsed,
        hidden,
        shown,
    });
    effects.structure_changed(window);
    true
}

/// Expand `tab` and its ancestors; with `auto_expand_intelligently`, also
/// collapse every other expanded subtree that is not on the way to `tab`.
pub fn intelligent_expand(
    registry: &mut TabRegistry,
    tab: TabId,
    config: &Config,
    effects: &mut TreeEffects,
) {
    let Some(window) = registry.get(tab).map(|node| node.window) else {
        return;
    };
    let ancestors = tree::ancestors(registry, tab);

    if config.auto_expand_intelligently {
        let mut keep: HashSet<TabId> = HashSet::new();
        keep.insert(tab);
        keep.extend(ancestors.iter().copied());
        keep.extend(tree::descendants(registry, tab));

        let candidates: Vec<TabId> = registry
            .normal_tabs(window)
            .into_iter()
            .filter(|id| !keep.contains(id))
            .filter(|&id| {
                registry
                    .get(id)
                    .is_some_and(|node| node.has_children() && !node.collapsed())
            })
            .collect();
        for candidate in candidates {
            let collapse = match registry.get(candidate).and_then(|node| node.parent()) {
                None => true,
                Some(parent) => {
                    let parent_expanded = registry.get(parent).is_some_and(|p| !p.collapsed());
                    parent_expanded
                        && tree::ancestors(registry, candidate)
                            .iter()
                            .any(|ancestor| keep.contains(ancestor))
                }
            };
            if collapse {
                set_collapsed(registry, candidate, true, CollapseCause::Automatic, effects);
            }
        }
    }

    for &ancestor in ancestors.iter().rev() {
        set_collapsed(registry, ancestor, false, CollapseCause::Automatic, effects);
    }
    set_collapsed(registry, tab, false, CollapseCause::Automatic, effects);
}

/// React to a tab becoming active while `auto_collapse_expand_subtree_on_select` is on
pub fn handle_new_active_tab(
    registry: &mut TabRegistry,
    tab: TabId,
    config: &Config,
    effects: &mut TreeEffects,
) {
    if !config.auto_collapse_expand_subtree_on_select {
        return;
    }
    if config.auto_expand_intelligently {
        intelligent_expand(registry, tab, config, effects);
    } else {
        set_collapsed(registry, tab, false, CollapseCause::Automatic, effects);
    }
}

/// Outcome of a focus change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusOutcome {
    Accepted,
    /// Focus must move to another tab
    Redirect(TabId),
}

/// Context of a focus change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusContext {
    /// A rapid tab-switch gesture is in progress
    pub switching: bool,
    /// The engine itself activated the tab
    pub by_internal_operation: bool,
}

/// Handle `tab` gaining focus.
pub fn on_activated(
    registry: &mut TabRegistry,
    tab: TabId,
    context: FocusContext,
    config: &Config,
    effects: &mut TreeEffects,
) -> FocusOutcome {
    let Some(window) = registry.get(tab).map(|node| node.window) else {
        return FocusOutcome::Accepted;
    };
    let skip_collapsed = !context.by_internal_operation
        && context.switching
        && config.skip_collapsed_tabs_for_tab_switching_shortcuts;

    if tree::is_hidden(registry, tab) {
        if config.auto_expand_on_collapsed_child_focused && !skip_collapsed {
            for ancestor in tree::ancestors(registry, tab).into_iter().rev() {
                set_collapsed(registry, ancestor, false, CollapseCause::Automatic, effects);
            }
            handle_new_active_tab(registry, tab, config, effects);
        } else {
            let Some(mut target) = tree::ancestors(registry, tab)
                .into_iter()
                .find(|&ancestor| !tree::is_hidden(registry, ancestor))
            else {
                return FocusOutcome::Accepted;
            };
            let last_focused = registry.window(window).and_then(|w| w.last_focused_tab);
            if skip_collapsed && last_focused == Some(target) {
                target = next_visible(registry, target)
                    .or_else(|| first_visible(registry, window))
                    .unwrap_or(target);
            }
            if let Some(w) = registry.window_mut(window) {
                w.last_focused_tab = Some(target);
            }
            log::debug!("Focus on hidden tab {} redirected to {}", tab, target);
            return FocusOutcome::Redirect(target);
        }
    } else if registry
        .get(tab)
        .is_some_and(|node| node.has_children() && node.collapsed())
        && !skip_collapsed
    {
        handle_new_active_tab(registry, tab, config, effects);
    }

    if let Some(w) = registry.window_mut(window) {
        w.last_focused_tab = Some(tab);
    }
    FocusOutcome::Accepted
}

fn next_visible(registry: &TabRegistry, tab: TabId) -> Option<TabId> {
    let window = registry.get(tab)?.window;
    let order = registry.normal_tabs(window);
    let position = order.iter().position(|&t| t == tab)?;
    order[position + 1..]
        .iter()
        .copied()
        .find(|&t| !tree::is_hidden(registry, t))
}

fn first_visible(registry: &TabRegistry, window: tabtree_config::WindowId) -> Option<TabId> {
    registry
        .normal_tabs(window)
        .into_iter()
        .find(|&t| !tree::is_hidden(registry, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostTab;
    use crate::tab::TabNode;
    use crate::tree::AttachOptions;
    use uuid::Uuid;

    /// 1 > {2 > 3}, 4 > 5
    fn forest() -> TabRegistry {
        let mut registry = TabRegistry::new();
        for id in 1..=5u64 {
            let host = HostTab::new(id, 1, id as usize - 1, "https://example.com/");
            registry.insert(
                TabNode::from_host(&host, Uuid::new_v4(), "about:treestyletab-group"),
                usize::MAX,
            );
        }
        for (child, parent) in [(2, 1), (3, 2), (5, 4)] {
            tree::attach(
                &mut registry,
                child,
                parent,
                AttachOptions::default(),
                &mut TreeEffects::default(),
            );
        }
        registry
    }

    #[test]
    fn test_collapse_reports_hidden_descendants() {
        let mut reg = forest();
        let mut effects = TreeEffects::default();
        assert!(set_collapsed(&mut reg, 1, true, CollapseCause::Manual, &mut effects));
        assert!(matches!(
            effects.notifications.last(),
            Some(TreeNotification::CollapseExpandDone { hidden, .. }) if hidden == &vec![2, 3]
        ));
        assert!(!set_collapsed(&mut reg, 1, true, CollapseCause::Manual, &mut effects));
        assert!(!reg.get(2).unwrap().collapsed());
    }

    #[test]
    fn test_nested_collapse_keeps_inner_state() {
        let mut reg = forest();
        let mut effects = TreeEffects::default();
        set_collapsed(&mut reg, 2, true, CollapseCause::Manual, &mut effects);
        set_collapsed(&mut reg, 1, true, CollapseCause::Manual, &mut effects);
        set_collapsed(&mut reg, 1, false, CollapseCause::Manual, &mut effects);
        assert!(!tree::is_hidden(&reg, 2));
        assert!(tree::is_hidden(&reg, 3));
    }

    #[test]
    fn test_intelligent_expand_collapses_other_trees() {
        let mut reg = forest();
        set_collapsed(&mut reg, 1, true, CollapseCause::Manual, &mut TreeEffects::default());
        let mut effects = TreeEffects::default();
        intelligent_expand(&mut reg, 1, &Config::default(), &mut effects);
        assert!(!reg.get(1).unwrap().collapsed());
        assert!(reg.get(4).unwrap().collapsed());
    }

    #[test]
    fn test_focus_on_hidden_tab_expands_ancestors() {
        let mut reg = forest();
        set_collapsed(&mut reg, 1, true, CollapseCause::Manual, &mut TreeEffects::default());
        let outcome = on_activated(
            &mut reg,
            3,
            FocusContext::default(),
            &Config::default(),
            &mut TreeEffects::default(),
        );
        assert_eq!(outcome, FocusOutcome::Accepted);
        assert!(!tree::is_hidden(&reg, 3));
        assert_eq!(reg.window(1).unwrap().last_focused_tab, Some(3));
    }

    #[test]
    fn test_focus_on_hidden_tab_redirects() {
        let mut reg = forest();
        set_collapsed(&mut reg, 1, true, CollapseCause::Manual, &mut TreeEffects::default());
        let config = Config {
            auto_expand_on_collapsed_child_focused: false,
            ..Config::default()
        };
        let outcome = on_activated(
            &mut reg,
            3,
            FocusContext::default(),
            &config,
            &mut TreeEffects::default(),
        );
        assert_eq!(outcome, FocusOutcome::Redirect(1));
        assert!(tree::is_hidden(&reg, 3));
    }
}
