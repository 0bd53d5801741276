//! Tab registry: id lookup plus per-window flat order mirrored from the host

use super::{PersistentId, Placement, TabNode};
use std::collections::{BTreeMap, HashMap};
use tabtree_config::{TabId, WindowId};

/// Closest normal (not removing) tabs on either side of a tab in flat order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Neighbors {
    pub previous: Option<TabId>,
    pub next: Option<TabId>,
}

/// One host window: its flat order and the counters used to tell
/// self-caused changes from external ones
#[derive(Debug, Clone)]
pub struct WindowTabs {
    pub id: WindowId,
    /// Flat order, mirrored from the host
    order: Vec<TabId>,
    /// Tabs in flight in engine-issued moves
    pub internal_moving_count: usize,
    /// Engine-issued opens not yet matched to an `opened` event
    pub opening_count: usize,
    pub last_focused_tab: Option<TabId>,
    /// Whether a tree view is currently shown for this window
    pub tree_view_visible: bool,
    /// Session restore is re-creating this window's tabs
    pub restoring: bool,
}

impl WindowTabs {
    fn new(id: WindowId) -> Self {
        Self {
            id,
            order: Vec::new(),
            internal_moving_count: 0,
            opening_count: 0,
            last_focused_tab: None,
            tree_view_visible: true,
            restoring: false,
        }
    }

    /// Tab ids in flat order (including tabs being removed)
    pub fn order(&self) -> &[TabId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// All known tabs, indexed by id, with per-window flat order
#[derive(Debug, Default)]
pub struct TabRegistry {
    tabs: HashMap<TabId, TabNode>,
    windows: BTreeMap<WindowId, WindowTabs>,
    last_focused_window: Option<WindowId>,
}

impl TabRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a tab by ID
    pub fn get(&self, id: TabId) -> Option<&TabNode> {
        self.tabs.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TabId) -> Option<&mut TabNode> {
        self.tabs.get_mut(&id)
    }

    pub fn contains(&self, id: TabId) -> bool {
        self.tabs.contains_key(&id)
    }

    /// Number of registered tabs across all windows
    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn window(&self, id: WindowId) -> Option<&WindowTabs> {
        self.windows.get(&id)
    }

    pub(crate) fn window_mut(&mut self, id: WindowId) -> Option<&mut WindowTabs> {
        self.windows.get_mut(&id)
    }

    pub(crate) fn ensure_window(&mut self, id: WindowId) -> &mut WindowTabs {
        self.windows.entry(id).or_insert_with(|| WindowTabs::new(id))
    }

    pub fn windows(&self) -> impl Iterator<Item = &WindowTabs> {
        self.windows.values()
    }

    pub(crate) fn remove_window(&mut self, id: WindowId) -> Option<WindowTabs> {
        let window = self.windows.remove(&id)?;
        for tab in &window.order {
            self.tabs.remove(tab);
        }
        if self.last_focused_window == Some(id) {
            self.last_focused_window = None;
        }
        Some(window)
    }

    pub fn last_focused_window(&self) -> Option<WindowId> {
        self.last_focused_window
            .filter(|id| self.windows.contains_key(id))
            .or_else(|| self.windows.keys().next().copied())
    }

    /// Flat index of a tab within its window
    pub fn index_of(&self, id: TabId) -> Option<usize> {
        let node = self.tabs.get(&id)?;
        self.windows
            .get(&node.window)?
            .order
            .iter()
            .position(|&t| t == id)
    }

    /// All tabs of a window in flat order, including tabs being removed
    pub fn tabs_in_window(&self, window: WindowId) -> Vec<TabId> {
        self.windows
            .get(&window)
            .map(|w| w.order.clone())
            .unwrap_or_default()
    }

    /// Tabs of a window in flat order, skipping tabs being removed
    pub fn normal_tabs(&self, window: WindowId) -> Vec<TabId> {
        self.windows
            .get(&window)
            .map(|w| {
                w.order
                    .iter()
                    .copied()
                    .filter(|&id| self.is_normal(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_normal(&self, id: TabId) -> bool {
        self.tabs.get(&id).is_some_and(|node| !node.removing)
    }

    /// Previous and next normal tabs around `id`
    pub fn neighbors(&self, id: TabId) -> Neighbors {
        let Some(node) = self.tabs.get(&id) else {
            return Neighbors::default();
        };
        let Some(window) = self.windows.get(&node.window) else {
            return Neighbors::default();
        };
        let Some(index) = window.order.iter().position(|&t| t == id) else {
            return Neighbors::default();
        };
        Neighbors {
            previous: window.order[..index]
                .iter()
                .rev()
                .copied()
                .find(|&t| self.is_normal(t)),
            next: window.order[index + 1..]
                .iter()
                .copied()
                .find(|&t| self.is_normal(t)),
        }
    }

    /// Tabs without a parent, in flat order
    pub fn root_tabs(&self, window: WindowId) -> Vec<TabId> {
        self.normal_tabs(window)
            .into_iter()
            .filter(|&id| self.tabs.get(&id).is_some_and(|n| n.parent.is_none()))
            .collect()
    }

    pub fn pinned_tabs(&self, window: WindowId) -> Vec<TabId> {
        self.normal_tabs(window)
            .into_iter()
            .filter(|&id| self.tabs.get(&id).is_some_and(|n| n.pinned))
            .collect()
    }

    /// Last normal tab of a window
    pub fn last_tab(&self, window: WindowId) -> Option<TabId> {
        self.normal_tabs(window).last().copied()
    }

    pub fn active_tab(&self, window: WindowId) -> Option<TabId> {
        self.normal_tabs(window)
            .into_iter()
            .find(|&id| self.tabs.get(&id).is_some_and(|n| n.active))
    }

    /// Find a live tab by persistent id
    pub fn by_persistent_id(&self, pid: &PersistentId) -> Option<TabId> {
        self.tabs
            .values()
            .find(|node| &node.persistent_id == pid && !node.removing)
            .map(|node| node.id)
    }

    /// Insert a tab at a flat index (clamped) in its window
    pub(crate) fn insert(&mut self, node: TabNode, index: usize) {
        let id = node.id;
        let window_id = node.window;
        let window = self.ensure_window(window_id);
        let clamped = index.min(window.order.len());
        window.order.insert(clamped, id);
        self.tabs.insert(id, node);
        log::debug!(
            "Registered tab {} in window {} at index {}",
            id,
            window_id,
            clamped
        );
    }

    /// Forget a tab completely
    pub(crate) fn remove(&mut self, id: TabId) -> Option<TabNode> {
        let node = self.tabs.remove(&id)?;
        if let Some(window) = self.windows.get_mut(&node.window) {
            window.order.retain(|&t| t != id);
            if window.last_focused_tab == Some(id) {
                window.last_focused_tab = None;
            }
        }
        log::debug!("Removed tab {} from window {}", id, node.window);
        Some(node)
    }

    /// Move a tab to a specific index within its window.
    /// Returns true if the tab was actually moved.
    pub(crate) fn move_to_index(&mut self, id: TabId, target_index: usize) -> bool {
        let Some(window_id) = self.tabs.get(&id).map(|n| n.window) else {
            return false;
        };
        let Some(window) = self.windows.get_mut(&window_id) else {
            return false;
        };
        let Some(current) = window.order.iter().position(|&t| t == id) else {
            return false;
        };
        let clamped = target_index.min(window.order.len().saturating_sub(1));
        if clamped == current {
            return false;
        }
        window.order.remove(current);
        window.order.insert(clamped, id);
        log::debug!("Moved tab {} from index {} to {}", id, current, clamped);
        true
    }

    /// Move a block of tabs (kept in the given order) next to an anchor,
    /// transferring them into the anchor's window if needed.
    /// Returns false when the anchor is unknown or part of the block.
    pub(crate) fn move_block(&mut self, tabs: &[TabId], placement: Placement) -> bool {
        let anchor = placement.anchor();
        if tabs.contains(&anchor) {
            return false;
        }
        let Some(target_window) = self.tabs.get(&anchor).map(|n| n.window) else {
            return false;
        };
        let block: Vec<TabId> = tabs
            .iter()
            .copied()
            .filter(|id| self.tabs.contains_key(id))
            .collect();
        for &id in &block {
            self.detach_from_order(id);
            if let Some(node) = self.tabs.get_mut(&id) {
                node.window = target_window;
            }
        }
        let window = self.ensure_window(target_window);
        let Some(anchor_index) = window.order.iter().position(|&t| t == anchor) else {
            return false;
        };
        let at = match placement {
            Placement::Before(_) => anchor_index,
            Placement::After(_) => anchor_index + 1,
        };
        for (offset, id) in block.into_iter().enumerate() {
            window.order.insert(at + offset, id);
        }
        true
    }

    /// Drop a tab from its window's order without forgetting it
    /// (the tab is travelling to another window)
    pub(crate) fn detach_from_order(&mut self, id: TabId) {
        if let Some(window_id) = self.tabs.get(&id).map(|n| n.window)
            && let Some(window) = self.windows.get_mut(&window_id)
        {
            window.order.retain(|&t| t != id);
            if window.last_focused_tab == Some(id) {
                window.last_focused_tab = None;
            }
        }
    }

    /// Put a travelling tab into a window at a flat index
    pub(crate) fn transfer_to_window(&mut self, id: TabId, window_id: WindowId, index: usize) {
        if !self.tabs.contains_key(&id) {
            return;
        }
        self.detach_from_order(id);
        if let Some(node) = self.tabs.get_mut(&id) {
            node.window = window_id;
        }
        let window = self.ensure_window(window_id);
        let clamped = index.min(window.order.len());
        window.order.insert(clamped, id);
    }

    /// Mark `id` as the active tab of its window
    pub(crate) fn set_active(&mut self, id: TabId) {
        let Some(window_id) = self.tabs.get(&id).map(|n| n.window) else {
            return;
        };
        let order = self.tabs_in_window(window_id);
        for tab in order {
            if let Some(node) = self.tabs.get_mut(&tab) {
                node.active = tab == id;
            }
        }
        self.last_focused_window = Some(window_id);
    }
}
