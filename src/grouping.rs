//! Burst grouping: tabs opened in quick succession are collected per window
//! and, once the burst settles, grouped under a synthetic group tab.

use crate::group_tab::{self, GroupTabUrl};
use crate::tab::{PersistentId, Placement, TabRegistry};
use crate::tree::{self, AttachOptions, GroupOpen, TreeEffects};
use std::collections::{BTreeSet, HashMap};
use tabtree_config::{Config, InsertPosition, PinnedInsertPosition, TabId, WindowId};
use tokio::time::Instant;

/// A tab waiting for its burst to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTab {
    pub tab: TabId,
    /// Opener at the time the tab opened (it may be cleared later)
    pub opener: Option<TabId>,
}

#[derive(Debug, Default)]
struct PendingBurst {
    tabs: Vec<PendingTab>,
    deadline: Option<Instant>,
}

/// Per-window pending lists with a single debounce deadline each.
#[derive(Debug, Default)]
pub struct BurstGrouping {
    windows: HashMap<WindowId, PendingBurst>,
}

impl BurstGrouping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a tab and push the window's deadline back
    pub fn push(&mut self, window: WindowId, tab: PendingTab, deadline: Instant) {
        let burst = self.windows.entry(window).or_default();
        if !burst.tabs.iter().any(|pending| pending.tab == tab.tab) {
            burst.tabs.push(tab);
        }
        burst.deadline = Some(deadline);
    }

    /// Another tab is on its way; keep the burst open longer
    pub fn extend(&mut self, window: WindowId, deadline: Instant) {
        if let Some(burst) = self.windows.get_mut(&window)
            && !burst.tabs.is_empty()
        {
            burst.deadline = Some(deadline);
        }
    }

    pub fn pending(&self, window: WindowId) -> &[PendingTab] {
        self.windows
            .get(&window)
            .map(|burst| burst.tabs.as_slice())
            .unwrap_or(&[])
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.windows.values().filter_map(|burst| burst.deadline).min()
    }

    /// Take every burst whose deadline has passed
    pub fn take_due(&mut self, now: Instant) -> Vec<(WindowId, Vec<PendingTab>)> {
        let due: Vec<WindowId> = self
            .windows
            .iter()
            .filter(|(_, burst)| burst.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(&window, _)| window)
            .collect();
        due.into_iter()
            .filter_map(|window| {
                self.windows
                    .remove(&window)
                    .map(|burst| (window, burst.tabs))
            })
            .collect()
    }

    pub fn forget_window(&mut self, window: WindowId) {
        self.windows.remove(&window);
    }
}

/// Collaborators currently blocking burst grouping.
#[derive(Debug, Default, Clone)]
pub struct GroupingBlocks {
    holders: BTreeSet<String>,
}

impl GroupingBlocks {
    pub fn block(&mut self, holder: &str) {
        self.holders.insert(holder.to_string());
    }

    pub fn unblock(&mut self, holder: &str) {
        self.holders.remove(holder);
    }

    pub fn is_blocked(&self) -> bool {
        !self.holders.is_empty()
    }

    pub fn holders(&self) -> impl Iterator<Item = &str> {
        self.holders.iter().map(String::as_str)
    }
}

/// Existing group tab collecting children of the pinned tab `opener`
pub fn group_for_opener(
    registry: &TabRegistry,
    window: WindowId,
    opener: PersistentId,
) -> Option<TabId> {
    registry.normal_tabs(window).into_iter().find(|&id| {
        registry
            .get(id)
            .and_then(|node| node.group.as_ref())
            .is_some_and(|group| group.opener == Some(opener))
    })
}

/// Group a settled burst. Moves are applied to the registry and recorded in
/// `effects`; new group tabs are requested through `effects.group_opens`.
pub fn flush_burst(
    registry: &mut TabRegistry,
    window: WindowId,
    pending: Vec<PendingTab>,
    config: &Config,
    effects: &mut TreeEffects,
) {
    let mut tabs: Vec<PendingTab> = pending
        .into_iter()
        .filter(|pending| {
            registry.get(pending.tab).is_some_and(|node| {
                node.window == window && !node.removing && node.is_genuinely_new()
            })
        })
        .collect();
    tabs.sort_by_key(|pending| registry.index_of(pending.tab).unwrap_or(usize::MAX));

    let roots: Vec<PendingTab> = tabs
        .into_iter()
        .filter(|pending| {
            registry
                .get(pending.tab)
                .is_some_and(|node| node.parent().is_none() && !node.is_group())
        })
        .collect();
    if roots.is_empty() {
        return;
    }

    let is_pinned_opener = |pending: &PendingTab| {
        pending
            .opener
            .and_then(|opener| registry.get(opener))
            .is_some_and(|opener| opener.pinned && opener.window == window)
    };
    let (from_pinned, others): (Vec<PendingTab>, Vec<PendingTab>) =
        roots.into_iter().partition(|pending| is_pinned_opener(pending));

    crate::debug_info!(
        "GROUPING",
        "window {}: {} from pinned, {} orphan",
        window,
        from_pinned.len(),
        others.len()
    );

    if !from_pinned.is_empty() {
        group_from_pinned(registry, window, &from_pinned, config, effects);
    }
    if others.len() > 1 && config.auto_group_new_tabs {
        let first_title = registry
            .get(others[0].tab)
            .map(|node| node.title.as_str())
            .unwrap_or_default();
        effects.group_opens.push(GroupOpen {
            window,
            placement: Placement::Before(others[0].tab),
            group: GroupTabUrl::temporary(group_tab::group_label(first_title)),
            parent: None,
            insert_before: None,
            children: others.iter().map(|pending| pending.tab).collect(),
        });
    }
}

fn opener_pid(registry: &TabRegistry, pending: &PendingTab) -> Option<PersistentId> {
    pending
        .opener
        .and_then(|opener| registry.get(opener))
        .map(|opener| opener.persistent_id)
}

fn group_from_pinned(
    registry: &mut TabRegistry,
    window: WindowId,
    roots: &[PendingTab],
    config: &Config,
    effects: &mut TreeEffects,
) {
    let has_group = |registry: &TabRegistry, pending: &PendingTab| {
        opener_pid(registry, pending)
            .and_then(|pid| group_for_opener(registry, window, pid))
            .is_some()
    };

    match config.insert_new_tab_from_pinned_tab_at {
        PinnedInsertPosition::First => {
            for pending in roots.iter().rev() {
                if has_group(registry, pending) {
                    continue;
                }
                let Some(last_pinned) = registry.pinned_tabs(window).last().copied() else {
                    continue;
                };
                move_subtree(registry, window, pending.tab, Placement::After(last_pinned), effects);
            }
        }
        PinnedInsertPosition::End => {
            for pending in roots {
                if has_group(registry, pending) {
                    continue;
                }
                let block = tree::subtree(registry, pending.tab);
                let last = registry
                    .normal_tabs(window)
                    .into_iter()
                    .rev()
                    .find(|id| !block.contains(id));
                if let Some(last) = last {
                    move_subtree(registry, window, pending.tab, Placement::After(last), effects);
                }
            }
        }
        PinnedInsertPosition::NoControl => {}
    }

    if !config.auto_group_new_tabs_from_pinned {
        return;
    }

    let Some(first) = roots.first().map(|pending| pending.tab) else {
        return;
    };
    let mut new_groups: Vec<(TabId, GroupOpen)> = Vec::new();
    for pending in roots {
        let Some(opener) = pending.opener else {
            continue;
        };
        let Some((opener_pid, opener_title)) = registry
            .get(opener)
            .map(|node| (node.persistent_id, node.title.clone()))
        else {
            continue;
        };
        if let Some(group) = group_for_opener(registry, window, opener_pid) {
            tree::attach(
                registry,
                pending.tab,
                group,
                AttachOptions {
                    force_expand: true,
                    move_now: true,
                    insert_at: InsertPosition::End,
                    ..AttachOptions::default()
                },
                effects,
            );
            continue;
        }
        match new_groups.iter_mut().find(|(id, _)| *id == opener) {
            Some((_, open)) => open.children.push(pending.tab),
            None => new_groups.push((
                opener,
                GroupOpen {
                    window,
                    placement: Placement::Before(first),
                    group: GroupTabUrl::for_opener(
                        group_tab::pinned_group_label(&opener_title),
                        opener_pid,
                    ),
                    parent: None,
                    insert_before: None,
                    children: vec![pending.tab],
                },
            )),
        }
    }
    effects
        .group_opens
        .extend(new_groups.into_iter().map(|(_, open)| open));
}

fn move_subtree(
    registry: &mut TabRegistry,
    window: WindowId,
    tab: TabId,
    placement: Placement,
    effects: &mut TreeEffects,
) {
    let block = tree::subtree(registry, tab);
    if block.contains(&placement.anchor()) {
        return;
    }
    let anchor_index = registry.index_of(placement.anchor());
    let start = registry.index_of(tab);
    if let (Some(anchor_index), Some(start), Placement::After(_)) = (anchor_index, start, placement)
        && start == anchor_index + 1
    {
        return;
    }
    if registry.move_block(&block, placement) {
        effects.push_move(block, window, placement);
        effects.structure_changed(window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostTab;
    use crate::tab::TabNode;
    use std::time::Duration;
    use uuid::Uuid;

    fn registry(count: u64) -> TabRegistry {
        let mut registry = TabRegistry::new();
        for id in 1..=count {
            let host = HostTab::new(id, 1, id as usize - 1, format!("https://example.com/{id}"));
            registry.insert(
                TabNode::from_host(&host, Uuid::new_v4(), "about:treestyletab-group"),
                usize::MAX,
            );
        }
        registry
    }

    fn pending(tab: TabId, opener: Option<TabId>) -> PendingTab {
        PendingTab { tab, opener }
    }

    #[test]
    fn test_deadline_is_debounced() {
        let mut bursts = BurstGrouping::new();
        let start = Instant::now();
        bursts.push(1, pending(2, None), start + Duration::from_millis(100));
        bursts.push(1, pending(3, None), start + Duration::from_millis(150));
        assert_eq!(bursts.next_deadline(), Some(start + Duration::from_millis(150)));
        assert!(bursts.take_due(start + Duration::from_millis(120)).is_empty());
        let due = bursts.take_due(start + Duration::from_millis(150));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1.len(), 2);
        assert_eq!(bursts.next_deadline(), None);
    }

    #[test]
    fn test_orphan_burst_requests_one_group() {
        let mut reg = registry(4);
        let mut effects = TreeEffects::default();
        flush_burst(
            &mut reg,
            1,
            vec![pending(4, None), pending(2, None), pending(3, None)],
            &Config::default(),
            &mut effects,
        );
        assert_eq!(effects.group_opens.len(), 1);
        assert_eq!(effects.group_opens[0].children, vec![2, 3, 4]);
        assert_eq!(effects.group_opens[0].placement, Placement::Before(2));
        assert!(effects.moves.is_empty());
    }

    #[test]
    fn test_orphan_group_is_named_after_first_tab() {
        let mut reg = registry(3);
        reg.get_mut(2).unwrap().title = "Release notes".to_string();
        reg.get_mut(3).unwrap().title = "Changelog".to_string();
        let mut effects = TreeEffects::default();
        flush_burst(
            &mut reg,
            1,
            vec![pending(3, None), pending(2, None)],
            &Config::default(),
            &mut effects,
        );
        assert_eq!(effects.group_opens[0].group.title, "Release notes and more");
    }

    #[test]
    fn test_untitled_orphans_get_default_group_title() {
        let mut reg = registry(3);
        let mut effects = TreeEffects::default();
        flush_burst(
            &mut reg,
            1,
            vec![pending(2, None), pending(3, None)],
            &Config::default(),
            &mut effects,
        );
        assert_eq!(effects.group_opens[0].group.title, group_tab::DEFAULT_GROUP_TITLE);
    }

    #[test]
    fn test_single_orphan_is_not_grouped() {
        let mut reg = registry(2);
        let mut effects = TreeEffects::default();
        flush_burst(&mut reg, 1, vec![pending(2, None)], &Config::default(), &mut effects);
        assert!(effects.group_opens.is_empty());
    }

    #[test]
    fn test_pinned_opener_tabs_move_to_end_and_group() {
        let mut reg = registry(5);
        reg.get_mut(1).unwrap().pinned = true;
        reg.move_to_index(4, 1);
        reg.move_to_index(5, 2);
        // order: 1(pinned), 4, 5, 2, 3
        let mut effects = TreeEffects::default();
        flush_burst(
            &mut reg,
            1,
            vec![pending(4, Some(1)), pending(5, Some(1))],
            &Config::default(),
            &mut effects,
        );
        assert_eq!(reg.tabs_in_window(1), vec![1, 2, 3, 4, 5]);
        assert_eq!(effects.group_opens.len(), 1);
        let open = &effects.group_opens[0];
        assert_eq!(open.children, vec![4, 5]);
        assert_eq!(open.group.opener, Some(reg.get(1).unwrap().persistent_id));
        assert!(open.group.title.starts_with("Tabs from"));
    }

    #[test]
    fn test_blocks_track_holders() {
        let mut blocks = GroupingBlocks::default();
        blocks.block("a");
        blocks.block("b");
        blocks.unblock("a");
        assert!(blocks.is_blocked());
        blocks.unblock("b");
        assert!(!blocks.is_blocked());
    }
}
