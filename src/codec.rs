//! Tree-structure codec: capture a tree keyed by persistent ids and
//! re-apply it to live tabs.

use crate::collapse;
use crate::tab::{PersistentId, TabRegistry};
use crate::tree::{self, AttachOptions, DetachOptions, TreeEffects};
use std::collections::{HashMap, HashSet};
use tabtree_config::{InsertPosition, TabId};
use tabtree_protocol::{CollapseCause, TreeStructure, TreeStructureEntry};

/// How a structure was matched against live tabs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub matched_by_id: usize,
    pub matched_by_order: usize,
    /// Entries with no live tab left to pair with
    pub unmatched: usize,
    /// Parent links created
    pub attached: usize,
}

/// Capture the structure of `tabs`, entries in flat order.
///
/// Parents outside the set are dropped, so the result describes a
/// self-contained forest.
pub fn serialize(registry: &TabRegistry, tabs: &[TabId]) -> TreeStructure {
    let mut ordered: Vec<TabId> = tabs
        .iter()
        .copied()
        .filter(|&id| registry.contains(id))
        .collect();
    ordered.sort_by_key(|&id| {
        (
            registry.get(id).map(|node| node.window),
            registry.index_of(id),
        )
    });
    ordered.dedup();
    let members: HashSet<TabId> = ordered.iter().copied().collect();
    let pid = |id: TabId| registry.get(id).map(|node| node.persistent_id);

    let entries = ordered
        .iter()
        .filter_map(|&id| {
            let node = registry.get(id)?;
            Some(TreeStructureEntry {
                id: node.persistent_id,
                parent: node
                    .parent()
                    .filter(|parent| members.contains(parent))
                    .and_then(pid),
                children: node
                    .children()
                    .iter()
                    .copied()
                    .filter(|child| members.contains(child))
                    .filter_map(pid)
                    .collect(),
                collapsed: node.collapsed(),
            })
        })
        .collect();
    TreeStructure::new(entries)
}

/// Pair structure entries with live tabs: by persistent id first, then by
/// flat order for whatever is left.
fn pair(
    registry: &TabRegistry,
    structure: &TreeStructure,
    live_tabs: &[TabId],
    report: &mut RestoreReport,
) -> HashMap<PersistentId, TabId> {
    let mut live: Vec<TabId> = live_tabs
        .iter()
        .copied()
        .filter(|&id| registry.get(id).is_some_and(|node| !node.removing))
        .collect();
    live.sort_by_key(|&id| registry.index_of(id));

    let mut pairs = HashMap::new();
    let mut used = HashSet::new();
    for entry in &structure.entries {
        if let Some(&tab) = live
            .iter()
            .find(|&&id| registry.get(id).is_some_and(|node| node.persistent_id == entry.id))
            && used.insert(tab)
        {
            pairs.insert(entry.id, tab);
            report.matched_by_id += 1;
        }
    }

    let mut remaining = live.into_iter().filter(|id| !used.contains(id));
    for entry in &structure.entries {
        if pairs.contains_key(&entry.id) {
            continue;
        }
        match remaining.next() {
            Some(tab) => {
                pairs.insert(entry.id, tab);
                report.matched_by_order += 1;
            }
            None => report.unmatched += 1,
        }
    }
    pairs
}

/// Re-apply `structure` to `live_tabs` without moving any tab.
///
/// Running it twice with the same inputs changes nothing the second time.
pub fn restore(
    registry: &mut TabRegistry,
    structure: &TreeStructure,
    live_tabs: &[TabId],
    effects: &mut TreeEffects,
) -> RestoreReport {
    let mut report = RestoreReport::default();
    let pairs = pair(registry, structure, live_tabs, &mut report);

    // Order-matched tabs adopt the stored persistent id unless another live tab holds it.
    for (pid, &tab) in &pairs {
        if registry.by_persistent_id(pid).is_none()
            && let Some(node) = registry.get_mut(tab)
        {
            node.persistent_id = *pid;
        }
    }

    let desired_parent = |entry: &TreeStructureEntry| entry.parent.and_then(|p| pairs.get(&p).copied());

    for entry in &structure.entries {
        let Some(&tab) = pairs.get(&entry.id) else {
            continue;
        };
        let current = registry.get(tab).and_then(|node| node.parent());
        if current.is_some() && current != desired_parent(entry) {
            tree::detach(registry, tab, DetachOptions::default(), effects);
        }
    }

    for entry in &structure.entries {
        let (Some(&tab), Some(parent)) = (pairs.get(&entry.id), desired_parent(entry)) else {
            continue;
        };
        if registry.get(tab).and_then(|node| node.parent()) == Some(parent) {
            continue;
        }
        let attached = tree::attach(
            registry,
            tab,
            parent,
            AttachOptions {
                insert_at: InsertPosition::End,
                ..AttachOptions::default()
            },
            effects,
        );
        if attached {
            report.attached += 1;
        }
    }

    for entry in &structure.entries {
        let Some(&tab) = pairs.get(&entry.id) else {
            continue;
        };
        let wanted: Vec<TabId> = entry
            .children
            .iter()
            .filter_map(|pid| pairs.get(pid).copied())
            .collect();
        if let Some(node) = registry.get_mut(tab) {
            let mut ordered: Vec<TabId> = wanted
                .iter()
                .copied()
                .filter(|child| node.children.contains(child))
                .collect();
            ordered.extend(node.children.iter().copied().filter(|c| !wanted.contains(c)));
            node.children = ordered;
        }
    }

    for entry in &structure.entries {
        if let Some(&tab) = pairs.get(&entry.id) {
            collapse::set_collapsed(registry, tab, entry.collapsed, CollapseCause::Automatic, effects);
        }
    }

    log::info!(
        "Restored tree structure: {} by id, {} by order, {} unmatched, {} attached",
        report.matched_by_id,
        report.matched_by_order,
        report.unmatched,
        report.attached
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostTab;
    use crate::tab::TabNode;
    use uuid::Uuid;

    fn registry(count: u64) -> TabRegistry {
        let mut registry = TabRegistry::new();
        for id in 1..=count {
            let host = HostTab::new(id, 1, id as usize - 1, "https://example.com/");
            registry.insert(
                TabNode::from_host(&host, Uuid::new_v4(), "about:treestyletab-group"),
                usize::MAX,
            );
        }
        registry
    }

    fn link(registry: &mut TabRegistry, child: TabId, parent: TabId) {
        tree::attach(
            registry,
            child,
            parent,
            AttachOptions::default(),
            &mut TreeEffects::default(),
        );
    }

    #[test]
    fn test_serialize_drops_outside_parents() {
        let mut reg = registry(3);
        link(&mut reg, 2, 1);
        link(&mut reg, 3, 2);
        let structure = serialize(&reg, &[3, 2]);
        assert_eq!(structure.len(), 2);
        assert_eq!(structure.entries[0].id, reg.get(2).unwrap().persistent_id);
        assert_eq!(structure.entries[0].parent, None);
        assert_eq!(structure.entries[1].parent, Some(reg.get(2).unwrap().persistent_id));
    }

    #[test]
    fn test_restore_by_order_into_fresh_tabs() {
        let mut source = registry(3);
        link(&mut source, 2, 1);
        link(&mut source, 3, 1);
        collapse::set_collapsed(&mut source, 1, true, CollapseCause::Manual, &mut TreeEffects::default());
        let structure = serialize(&source, &[1, 2, 3]);

        let mut target = registry(3);
        let mut effects = TreeEffects::default();
        let report = restore(&mut target, &structure, &[1, 2, 3], &mut effects);
        assert_eq!(report.matched_by_order, 3);
        assert_eq!(report.attached, 2);
        assert_eq!(target.get(1).unwrap().children(), &[2, 3]);
        assert!(target.get(1).unwrap().collapsed());
        assert_eq!(serialize(&target, &[1, 2, 3]), structure);
    }

    #[test]
    fn test_restore_is_idempotent() {
        let mut reg = registry(4);
        link(&mut reg, 2, 1);
        link(&mut reg, 4, 3);
        let structure = serialize(&reg, &[1, 2, 3, 4]);
        let report = restore(&mut reg, &structure, &[1, 2, 3, 4], &mut TreeEffects::default());
        assert_eq!(report.matched_by_id, 4);
        assert_eq!(report.attached, 0);
        let mut effects = TreeEffects::default();
        restore(&mut reg, &structure, &[1, 2, 3, 4], &mut effects);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_unmatched_entries_are_counted() {
        let mut source = registry(3);
        link(&mut source, 2, 1);
        let structure = serialize(&source, &[1, 2, 3]);
        let mut target = registry(2);
        let report = restore(&mut target, &structure, &[1, 2], &mut TreeEffects::default());
        assert_eq!(report.unmatched, 1);
        assert_eq!(target.get(2).unwrap().parent(), Some(1));
    }
}
