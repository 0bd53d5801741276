//! Position-change classifier.
//!
//! Decides what a flat move the engine did not cause means for the tree,
//! from the tab's new neighbours and the tree as it was before the move.

use crate::tab::{Neighbors, TabRegistry};
use crate::tree;
use std::collections::HashMap;
use tabtree_config::{Config, TabId, WindowId};

/// One tab as seen by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTab {
    pub id: TabId,
    pub index: usize,
    pub parent: Option<TabId>,
    pub previous: Option<TabId>,
    pub next: Option<TabId>,
    pub level: usize,
    pub partition: String,
    pub url: String,
    pub collapsed: bool,
    pub active: bool,
}

/// Immutable copy of a window's tree, taken before the engine reacts to an event.
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    pub window: WindowId,
    tabs: HashMap<TabId, SnapshotTab>,
}

impl TreeSnapshot {
    /// Capture every normal tab of `window`
    pub fn capture(registry: &TabRegistry, window: WindowId) -> Self {
        let order = registry.normal_tabs(window);
        let mut tabs = HashMap::with_capacity(order.len());
        for (index, &id) in order.iter().enumerate() {
            let Some(node) = registry.get(id) else {
                continue;
            };
            tabs.insert(
                id,
                SnapshotTab {
                    id,
                    index,
                    parent: node.parent(),
                    previous: index.checked_sub(1).map(|i| order[i]),
                    next: order.get(index + 1).copied(),
                    level: tree::level(registry, id),
                    partition: node.partition.clone(),
                    url: node.url.clone(),
                    collapsed: node.collapsed(),
                    active: node.active,
                },
            );
        }
        Self { window, tabs }
    }

    pub fn get(&self, id: TabId) -> Option<&SnapshotTab> {
        self.tabs.get(&id)
    }

    fn parent_of(&self, id: TabId) -> Option<TabId> {
        self.tabs.get(&id).and_then(|tab| tab.parent)
    }

    /// Ancestors of `id` in the snapshot, nearest first
    fn ancestors(&self, id: TabId) -> Vec<TabId> {
        let mut chain = Vec::new();
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = self.parent_of(parent);
        }
        chain
    }
}

/// A move to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabMove {
    pub tab: TabId,
    pub from_index: usize,
    pub to_index: usize,
    /// Neighbours before the move, used to put the tab back
    pub old_neighbors: Neighbors,
}

/// What the move means for the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabAction {
    NoOp,
    /// The move would create a cycle; undo it
    MoveBack,
    Attach {
        parent: TabId,
        insert_before: Option<TabId>,
        insert_after: Option<TabId>,
    },
    Detach,
}

/// Classify a move. `snapshot` must carry the new neighbours and the old parents.
pub fn classify(snapshot: &TreeSnapshot, mv: &TabMove, config: &Config) -> TabAction {
    let Some(tab) = snapshot.get(mv.tab) else {
        return TabAction::NoOp;
    };
    if mv.from_index == mv.to_index {
        crate::debug_log!("CLASSIFY", "tab {}: same index", mv.tab);
        return TabAction::NoOp;
    }

    let previous = tab.previous.and_then(|id| snapshot.get(id));
    let next = tab.next.and_then(|id| snapshot.get(id));
    let previous_parent = previous.and_then(|p| p.parent);
    let next_parent = next.and_then(|n| n.parent);
    let old_parent = tab.parent;

    let new_parent = if let Some(previous) = previous
        && previous.partition != tab.partition
        && previous.url == tab.url
    {
        crate::debug_log!("CLASSIFY", "tab {}: duplicate of {}", mv.tab, previous.id);
        previous_parent
    } else if old_parent.is_some() && old_parent == tab.previous {
        crate::debug_log!("CLASSIFY", "tab {}: still right after its parent", mv.tab);
        old_parent
    } else if previous.is_none() {
        crate::debug_log!("CLASSIFY", "tab {}: moved to the top", mv.tab);
        None
    } else if next.is_none() {
        let related = old_parent
            .into_iter()
            .chain(old_parent.map(|p| snapshot.ancestors(p)).unwrap_or_default())
            .any(|ancestor| Some(ancestor) == previous_parent);
        crate::debug_log!(
            "CLASSIFY",
            "tab {}: moved to the end (related tree: {})",
            mv.tab,
            related
        );
        if related { previous_parent } else { None }
    } else if previous_parent == next_parent {
        previous_parent
    } else if let (Some(previous), Some(next)) = (previous, next)
        && previous.level > next.level
    {
        let delta = mv.to_index.abs_diff(mv.from_index);
        let mut candidate = if !tab.active || delta < config.drag_reparent_delta_threshold {
            previous_parent
        } else {
            old_parent.or(next_parent)
        };
        while let Some(id) = candidate
            && snapshot.get(id).is_some_and(|t| t.collapsed)
        {
            candidate = snapshot.parent_of(id);
        }
        crate::debug_log!(
            "CLASSIFY",
            "tab {}: end of a deeper tree (delta {}) -> {:?}",
            mv.tab,
            delta,
            candidate
        );
        candidate
    } else if let (Some(previous), Some(next)) = (previous, next)
        && previous.level < next.level
    {
        Some(previous.id)
    } else {
        None
    };

    if let Some(parent) = new_parent
        && (parent == mv.tab || snapshot.ancestors(parent).contains(&mv.tab))
    {
        crate::debug_info!("CLASSIFY", "tab {}: would nest under itself", mv.tab);
        return TabAction::MoveBack;
    }

    match new_parent {
        Some(parent) if new_parent != old_parent => TabAction::Attach {
            parent,
            insert_before: tab.next,
            insert_after: tab.previous,
        },
        None if old_parent.is_some() => TabAction::Detach,
        _ => TabAction::NoOp,
    }
}
