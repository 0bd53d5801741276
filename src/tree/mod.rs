//! Tree store: parent/child links over the tab registry.
//!
//! Attach and detach are the only operations that change the tree shape.
//! Every mutator records what it did in a [`TreeEffects`] buffer: flat
//! moves it already applied to the registry (and that the host still has to
//! perform), tabs to close, group tabs to open, and notifications.

mod close_behavior;

pub use close_behavior::{CloseContext, resolve_close_parent_behavior, should_apply_tree_behavior};

use crate::group_tab::{self, GroupTabUrl};
use crate::tab::{Placement, TabRegistry};
use tabtree_config::{CloseParentBehavior, InsertPosition, TabId, WindowId};
use tabtree_protocol::{CollapseCause, TreeNotification};

/// A flat move already applied locally, to be mirrored by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatMove {
    pub tabs: Vec<TabId>,
    pub window: WindowId,
    pub placement: Placement,
}

/// A group tab to open, and the tabs it adopts once it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOpen {
    pub window: WindowId,
    pub placement: Placement,
    pub group: GroupTabUrl,
    /// Parent of the group tab itself
    pub parent: Option<TabId>,
    /// Sibling the group tab goes before under `parent`
    pub insert_before: Option<TabId>,
    pub children: Vec<TabId>,
}

/// Side effects accumulated by tree mutations.
#[derive(Debug, Default)]
pub struct TreeEffects {
    pub notifications: Vec<TreeNotification>,
    pub moves: Vec<FlatMove>,
    /// Tabs to close, in order
    pub closes: Vec<TabId>,
    pub group_opens: Vec<GroupOpen>,
    /// Parents that lost a child (temporary group cleanup candidates)
    pub orphaned_parents: Vec<TabId>,
    /// Windows whose structure changed
    pub changed_windows: Vec<WindowId>,
}

impl TreeEffects {
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
            && self.moves.is_empty()
            && self.closes.is_empty()
            && self.group_opens.is_empty()
    }

    pub(crate) fn structure_changed(&mut self, window: WindowId) {
        if !self.changed_windows.contains(&window) {
            self.changed_windows.push(window);
        }
    }

    pub(crate) fn push_move(&mut self, tabs: Vec<TabId>, window: WindowId, placement: Placement) {
        self.moves.push(FlatMove {
            tabs,
            window,
            placement,
        });
    }

    /// Append everything from another buffer
    pub fn extend(&mut self, other: TreeEffects) {
        self.notifications.extend(other.notifications);
        self.moves.extend(other.moves);
        self.closes.extend(other.closes);
        self.group_opens.extend(other.group_opens);
        self.orphaned_parents.extend(other.orphaned_parents);
        for window in other.changed_windows {
            self.structure_changed(window);
        }
    }
}

/// Options for [`attach`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachOptions {
    /// Sibling to insert before (explicit neighbour wins over `insert_at`)
    pub insert_before: Option<TabId>,
    /// Tab to insert after; may be the parent itself or a sibling's descendant
    pub insert_after: Option<TabId>,
    pub insert_at: InsertPosition,
    /// Expand the parent
    pub force_expand: bool,
    /// Also move the child's subtree to its new logical flat position
    pub move_now: bool,
}

/// Options for [`detach`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetachOptions {
    /// The tab is about to disappear; keep its indentation in the view
    pub preserve_indent: bool,
}

/// Options for [`detach_all_children`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetachAllOptions {
    /// Detached children go to the end of the window
    pub move_to_bottom: bool,
}

// ============================================================================
// Queries
// ============================================================================

/// Ancestors of `id`, nearest first
pub fn ancestors(registry: &TabRegistry, id: TabId) -> Vec<TabId> {
    let mut chain = Vec::new();
    let mut current = registry.get(id).and_then(|node| node.parent());
    while let Some(parent) = current {
        if chain.contains(&parent) || chain.len() > registry.len() {
            log::warn!("Parent cycle detected above tab {}", id);
            break;
        }
        chain.push(parent);
        current = registry.get(parent).and_then(|node| node.parent());
    }
    chain
}

/// Depth of a tab (0 for roots)
pub fn level(registry: &TabRegistry, id: TabId) -> usize {
    ancestors(registry, id).len()
}

/// Top-most ancestor (the tab itself for roots)
pub fn root_of(registry: &TabRegistry, id: TabId) -> TabId {
    ancestors(registry, id).last().copied().unwrap_or(id)
}

/// Whether `ancestor` is a strict ancestor of `id`
pub fn is_ancestor(registry: &TabRegistry, ancestor: TabId, id: TabId) -> bool {
    ancestors(registry, id).contains(&ancestor)
}

/// Descendants in pre-order
pub fn descendants(registry: &TabRegistry, id: TabId) -> Vec<TabId> {
    let mut result = Vec::new();
    let mut stack: Vec<TabId> = registry
        .get(id)
        .map(|node| node.children().iter().rev().copied().collect())
        .unwrap_or_default();
    while let Some(current) = stack.pop() {
        if result.contains(&current) {
            continue;
        }
        result.push(current);
        if let Some(node) = registry.get(current) {
            stack.extend(node.children().iter().rev().copied());
        }
    }
    result
}

/// A tab followed by its descendants
pub fn subtree(registry: &TabRegistry, id: TabId) -> Vec<TabId> {
    let mut tabs = vec![id];
    tabs.extend(descendants(registry, id));
    tabs
}

/// Last tab of a subtree in pre-order
pub fn last_descendant(registry: &TabRegistry, id: TabId) -> Option<TabId> {
    descendants(registry, id).last().copied()
}

/// Siblings of `id` including itself: its parent's children, or the window's roots
pub fn siblings(registry: &TabRegistry, id: TabId) -> Vec<TabId> {
    let Some(node) = registry.get(id) else {
        return Vec::new();
    };
    match node.parent().and_then(|parent| registry.get(parent)) {
        Some(parent) => parent.children().to_vec(),
        None => registry.root_tabs(node.window),
    }
}

pub fn next_sibling(registry: &TabRegistry, id: TabId) -> Option<TabId> {
    let siblings = siblings(registry, id);
    let position = siblings.iter().position(|&t| t == id)?;
    siblings.get(position + 1).copied()
}

pub fn previous_sibling(registry: &TabRegistry, id: TabId) -> Option<TabId> {
    let siblings = siblings(registry, id);
    let position = siblings.iter().position(|&t| t == id)?;
    position.checked_sub(1).and_then(|p| siblings.get(p).copied())
}

/// Hidden because some ancestor is collapsed
pub fn is_hidden(registry: &TabRegistry, id: TabId) -> bool {
    registry
        .get(id)
        .and_then(|node| node.parent())
        .and_then(|parent| registry.get(parent))
        .is_some_and(|parent| parent.subtree_collapsed())
}

/// Recompute the derived collapsed status of `id` and its descendants
pub(crate) fn refresh_subtree_collapsed(registry: &mut TabRegistry, id: TabId) {
    let inherited = registry
        .get(id)
        .and_then(|node| node.parent())
        .and_then(|parent| registry.get(parent))
        .is_some_and(|parent| parent.subtree_collapsed());
    let mut stack = vec![(id, inherited)];
    let mut seen = Vec::new();
    while let Some((current, parent_collapsed)) = stack.pop() {
        if seen.contains(&current) {
            continue;
        }
        seen.push(current);
        let Some(node) = registry.get_mut(current) else {
            continue;
        };
        node.subtree_collapsed = node.collapsed || parent_collapsed;
        let state = node.subtree_collapsed;
        stack.extend(node.children.iter().map(|&child| (child, state)));
    }
}

/// Whether `block` is contiguous in flat order and already sits at `placement`
fn in_place(registry: &TabRegistry, block: &[TabId], placement: Placement) -> bool {
    let (Some(first), Some(last)) = (block.first(), block.last()) else {
        return true;
    };
    let (Some(start), Some(anchor)) = (registry.index_of(*first), registry.index_of(placement.anchor()))
    else {
        return false;
    };
    let Some(window) = registry.get(*first).map(|node| node.window) else {
        return false;
    };
    let contiguous = registry
        .tabs_in_window(window)
        .get(start..start + block.len())
        .is_some_and(|slice| slice == block);
    contiguous
        && match placement {
            Placement::After(_) => start == anchor + 1,
            Placement::Before(_) => registry.index_of(*last).is_some_and(|end| end + 1 == anchor),
        }
}

// ============================================================================
// Mutators
// ============================================================================

/// Attach `child` under `parent`.
///
/// Returns false (and does nothing) when either tab is unknown, pinned or
/// being removed, the tabs live in different windows, or `parent` is the
/// child or one of its descendants.
pub fn attach(
    registry: &mut TabRegistry,
    child: TabId,
    parent: TabId,
    options: AttachOptions,
    effects: &mut TreeEffects,
) -> bool {
    let (Some(child_node), Some(parent_node)) = (registry.get(child), registry.get(parent)) else {
        log::debug!("attach {} -> {}: stale tab", child, parent);
        return false;
    };
    if child == parent
        || child_node.window != parent_node.window
        || child_node.pinned
        || parent_node.pinned
        || child_node.removing
        || parent_node.removing
        || is_ancestor(registry, child, parent)
    {
        log::debug!("attach {} -> {}: invalid relation, ignored", child, parent);
        return false;
    }
    let window = child_node.window;
    let previous_parent = child_node.parent();

    if previous_parent == Some(parent)
        && options.insert_before.is_none()
        && options.insert_after.is_none()
    {
        if options.force_expand {
            expand_for_attach(registry, parent, effects);
        }
        return false;
    }

    if let Some(old) = previous_parent
        && let Some(old_node) = registry.get_mut(old)
    {
        old_node.children.retain(|&t| t != child);
        if old != parent {
            effects.orphaned_parents.push(old);
        }
    }

    let siblings = registry
        .get(parent)
        .map(|node| node.children().to_vec())
        .unwrap_or_default();
    let explicit = resolve_explicit_index(registry, &siblings, parent, options);
    let index = explicit.unwrap_or_else(|| match options.insert_at {
        InsertPosition::First => 0,
        InsertPosition::End | InsertPosition::NoControl => siblings.len(),
        InsertPosition::Nearest => {
            let child_index = registry.index_of(child).unwrap_or(usize::MAX);
            siblings
                .iter()
                .filter(|&&s| registry.index_of(s).is_some_and(|i| i < child_index))
                .count()
        }
    });

    if let Some(parent_node) = registry.get_mut(parent) {
        let clamped = index.min(parent_node.children.len());
        parent_node.children.insert(clamped, child);
    }
    if let Some(child_node) = registry.get_mut(child) {
        child_node.parent = Some(parent);
    }
    refresh_subtree_collapsed(registry, child);

    if options.force_expand {
        expand_for_attach(registry, parent, effects);
    }

    log::debug!(
        "Attached tab {} to {} (previous parent {:?})",
        child,
        parent,
        previous_parent
    );
    effects.notifications.push(TreeNotification::Attached {
        tab: child,
        parent,
        window,
    });
    effects.structure_changed(window);

    let may_move = explicit.is_some() || options.insert_at != InsertPosition::NoControl;
    if options.move_now && may_move {
        place_subtree(registry, child, parent, window, effects);
    }
    true
}

fn resolve_explicit_index(
    registry: &TabRegistry,
    siblings: &[TabId],
    parent: TabId,
    options: AttachOptions,
) -> Option<usize> {
    if let Some(before) = options.insert_before
        && let Some(position) = siblings.iter().position(|&s| s == before)
    {
        return Some(position);
    }
    let after = options.insert_after?;
    if after == parent {
        return Some(0);
    }
    if let Some(position) = siblings.iter().position(|&s| s == after) {
        return Some(position + 1);
    }
    siblings
        .iter()
        .position(|&s| is_ancestor(registry, s, after))
        .map(|position| position + 1)
}

/// Move the subtree of `child` right after its previous sibling's subtree
/// (or right after `parent` when it is the first child).
fn place_subtree(
    registry: &mut TabRegistry,
    child: TabId,
    parent: TabId,
    window: WindowId,
    effects: &mut TreeEffects,
) {
    let anchor = match previous_sibling(registry, child) {
        Some(previous) => last_descendant(registry, previous).unwrap_or(previous),
        None => parent,
    };
    let block = subtree(registry, child);
    if in_place(registry, &block, Placement::After(anchor)) {
        return;
    }
    let placement = Placement::After(anchor);
    if registry.move_block(&block, placement) {
        effects.push_move(block, window, placement);
    }
}

fn expand_for_attach(registry: &mut TabRegistry, parent: TabId, effects: &mut TreeEffects) {
    let Some(node) = registry.get_mut(parent) else {
        return;
    };
    if !node.collapsed {
        return;
    }
    node.collapsed = false;
    let shown_before: Vec<TabId> = descendants(registry, parent);
    refresh_subtree_collapsed(registry, parent);
    effects.notifications.push(TreeNotification::CollapsedStateChanged {
        tab: parent,
        collapsed: false,
        cause: CollapseCause::Automatic,
    });
    let shown = shown_before
        .into_iter()
        .filter(|&t| !is_hidden(registry, t))
        .collect();
    effects.notifications.push(TreeNotification::CollapseExpandDone {
        tab: parent,
        collapsed: false,
        hidden: Vec::new(),
        shown,
    });
}

/// Detach `child` from its parent; the detached subtree stays intact.
pub fn detach(
    registry: &mut TabRegistry,
    child: TabId,
    options: DetachOptions,
    effects: &mut TreeEffects,
) -> bool {
    let Some(node) = registry.get(child) else {
        log::debug!("detach {}: stale tab", child);
        return false;
    };
    let Some(parent) = node.parent() else {
        return false;
    };
    let window = node.window;
    if let Some(parent_node) = registry.get_mut(parent) {
        parent_node.children.retain(|&t| t != child);
    }
    if let Some(node) = registry.get_mut(child) {
        node.parent = None;
    }
    refresh_subtree_collapsed(registry, child);

    log::debug!("Detached tab {} from {}", child, parent);
    effects.orphaned_parents.push(parent);
    effects.notifications.push(TreeNotification::Detached {
        tab: child,
        former_parent: parent,
        preserve_indent: options.preserve_indent,
    });
    effects.structure_changed(window);
    true
}

/// Re-home the children of `parent` (which is closing, being pinned, or
/// leaving its window) according to `behavior`.
pub fn detach_all_children(
    registry: &mut TabRegistry,
    parent: TabId,
    behavior: CloseParentBehavior,
    options: DetachAllOptions,
    effects: &mut TreeEffects,
) {
    let Some(node) = registry.get(parent) else {
        return;
    };
    let children = node.children().to_vec();
    if children.is_empty() {
        return;
    }
    let window = node.window;
    let grandparent = node.parent();
    log::debug!(
        "Re-homing {} children of tab {} ({:?})",
        children.len(),
        parent,
        behavior
    );

    match behavior {
        CloseParentBehavior::CloseAllChildren => {
            let doomed = descendants(registry, parent);
            for &child in &children {
                detach(registry, child, DetachOptions { preserve_indent: true }, effects);
            }
            effects.closes.extend(doomed.into_iter().rev());
        }
        CloseParentBehavior::PromoteFirstChild => {
            promote_first_child(registry, parent, &children, grandparent, effects);
        }
        CloseParentBehavior::ReplaceWithGroupTab if children.len() > 1 => {
            let first = children[0];
            let label = registry
                .get(first)
                .map(|node| group_tab::group_label(&node.title))
                .unwrap_or_else(|| group_tab::DEFAULT_GROUP_TITLE.to_string());
            promote_first_child(registry, parent, &children, grandparent, effects);
            effects.group_opens.push(GroupOpen {
                window,
                placement: Placement::Before(first),
                group: GroupTabUrl::temporary(label),
                parent: grandparent,
                insert_before: Some(first),
                children,
            });
        }
        CloseParentBehavior::ReplaceWithGroupTab => {
            promote_first_child(registry, parent, &children, grandparent, effects);
        }
        CloseParentBehavior::PromoteAllChildren => {
            for &child in &children {
                detach(registry, child, DetachOptions::default(), effects);
                if let Some(grandparent) = grandparent {
                    attach(
                        registry,
                        child,
                        grandparent,
                        AttachOptions {
                            insert_before: Some(parent),
                            ..AttachOptions::default()
                        },
                        effects,
                    );
                }
            }
        }
        CloseParentBehavior::DetachAllChildren => {
            let next_root = grandparent
                .and_then(|_| next_sibling(registry, root_of(registry, parent)));
            let mut block = Vec::new();
            for &child in &children {
                detach(registry, child, DetachOptions::default(), effects);
                block.extend(subtree(registry, child));
            }
            let placement = if options.move_to_bottom {
                last_outside(registry, window, &block, parent).map(Placement::After)
            } else if grandparent.is_some() {
                match next_root {
                    Some(next_root) => Some(Placement::Before(next_root)),
                    None => last_outside(registry, window, &block, parent).map(Placement::After),
                }
            } else {
                None
            };
            if let Some(placement) = placement
                && !in_place(registry, &block, placement)
                && registry.move_block(&block, placement)
            {
                effects.push_move(block, window, placement);
            }
        }
    }
}

/// Last tab of a window that is neither in `block` nor `excluded`
fn last_outside(
    registry: &TabRegistry,
    window: WindowId,
    block: &[TabId],
    excluded: TabId,
) -> Option<TabId> {
    registry
        .normal_tabs(window)
        .into_iter()
        .rev()
        .find(|t| *t != excluded && !block.contains(t))
}

fn promote_first_child(
    registry: &mut TabRegistry,
    parent: TabId,
    children: &[TabId],
    grandparent: Option<TabId>,
    effects: &mut TreeEffects,
) {
    let Some((&first, rest)) = children.split_first() else {
        return;
    };
    detach(registry, first, DetachOptions::default(), effects);
    if let Some(grandparent) = grandparent {
        attach(
            registry,
            first,
            grandparent,
            AttachOptions {
                insert_before: Some(parent),
                ..AttachOptions::default()
            },
            effects,
        );
    }
    for &child in rest {
        attach(
            registry,
            child,
            first,
            AttachOptions {
                insert_at: InsertPosition::End,
                ..AttachOptions::default()
            },
            effects,
        );
    }
}

/// Move `nodes` with their subtrees next to `anchor`, keeping their
/// relative order, in both flat order and (for siblings of the anchor)
/// sibling order.
pub fn reorder_among(
    registry: &mut TabRegistry,
    nodes: &[TabId],
    placement: Placement,
    effects: &mut TreeEffects,
) -> bool {
    let anchor = placement.anchor();
    let Some(window) = registry.get(anchor).map(|node| node.window) else {
        return false;
    };
    let tops: Vec<TabId> = nodes
        .iter()
        .copied()
        .filter(|&id| registry.contains(id))
        .filter(|&id| !nodes.iter().any(|&other| is_ancestor(registry, other, id)))
        .collect();
    let mut block = Vec::new();
    for &top in &tops {
        for id in subtree(registry, top) {
            if !block.contains(&id) {
                block.push(id);
            }
        }
    }
    if block.is_empty() || block.contains(&anchor) {
        return false;
    }

    let anchor_parent = registry.get(anchor).and_then(|node| node.parent());
    if let Some(parent) = anchor_parent
        && let Some(parent_node) = registry.get_mut(parent)
    {
        let moving: Vec<TabId> = tops
            .iter()
            .copied()
            .filter(|id| parent_node.children.contains(id))
            .collect();
        if !moving.is_empty() {
            parent_node.children.retain(|id| !moving.contains(id));
            let position = parent_node
                .children
                .iter()
                .position(|&t| t == anchor)
                .map(|p| match placement {
                    Placement::Before(_) => p,
                    Placement::After(_) => p + 1,
                })
                .unwrap_or(parent_node.children.len());
            for (offset, id) in moving.into_iter().enumerate() {
                parent_node.children.insert(position + offset, id);
            }
        }
    }

    // Anchor may be inside a subtree: After(anchor) lands right after the anchor itself.
    let placement = match placement {
        Placement::After(anchor) => {
            Placement::After(last_descendant(registry, anchor).unwrap_or(anchor))
        }
        before => before,
    };
    effects.structure_changed(window);
    if in_place(registry, &block, placement) {
        return true;
    }
    if !registry.move_block(&block, placement) {
        return false;
    }
    effects.push_move(block, window, placement);
    true
}

/// Sort the children of `parent` by their flat index
pub(crate) fn sync_children_order(registry: &mut TabRegistry, parent: TabId) {
    let Some(children) = registry.get(parent).map(|node| node.children().to_vec()) else {
        return;
    };
    let mut sorted = children.clone();
    sorted.sort_by_key(|&id| registry.index_of(id).unwrap_or(usize::MAX));
    if sorted != children
        && let Some(node) = registry.get_mut(parent)
    {
        node.children = sorted;
    }
}

/// Make a subtree contiguous behind its root after the root moved
pub(crate) fn follow_descendants(
    registry: &mut TabRegistry,
    tab: TabId,
    effects: &mut TreeEffects,
) {
    let descendants = descendants(registry, tab);
    if descendants.is_empty() || in_place(registry, &descendants, Placement::After(tab)) {
        return;
    }
    let Some(window) = registry.get(tab).map(|node| node.window) else {
        return;
    };
    let placement = Placement::After(tab);
    if registry.move_block(&descendants, placement) {
        effects.push_move(descendants, window, placement);
    }
}
