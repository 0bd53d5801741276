//! Host event handling.

use super::{Continuation, Engine, Output, PendingOpen};
use crate::auto_attach::{self, AutoAttachDecision, OpenKind};
use crate::classifier::{self, TabAction, TabMove, TreeSnapshot};
use crate::collapse::{self, FocusContext, FocusOutcome};
use crate::group_tab::GroupTabUrl;
use crate::grouping::PendingTab;
use crate::host::{HostCommand, HostEvent, HostTab, OpenTabRequest, TabChange};
use crate::tab::{Neighbors, Placement, TabNode};
use crate::tree::{
    self, AttachOptions, CloseContext, DetachAllOptions, DetachOptions, TreeEffects,
    resolve_close_parent_behavior, should_apply_tree_behavior,
};
use tabtree_config::{
    CloseParentBehavior, InsertPosition, PinnedInsertPosition, TabId, WindowId,
};
use tabtree_protocol::{CollapseCause, TreeNotification};
use tokio::time::Instant;
use uuid::Uuid;

impl Engine {
    /// Apply one host event
    pub fn handle_event(&mut self, event: HostEvent, now: Instant) -> Output {
        crate::debug_log!("EVENT", "{:?}", event);
        let mut out = Output::default();
        let mut effects = TreeEffects::default();

        match event {
            HostEvent::Opening { window } => {
                self.bursts
                    .extend(window, now + self.config.burst_timeout());
            }
            HostEvent::Opened { tab } => self.on_opened(tab, now, &mut effects, &mut out),
            HostEvent::Closed {
                tab,
                window,
                window_closing,
            } => self.on_closed(tab, window, window_closing, &mut effects),
            HostEvent::Moving { tab, window, .. } => self.on_moving(tab, window),
            HostEvent::Moved {
                tab,
                window,
                from_index,
                to_index,
            } => self.on_moved(tab, window, from_index, to_index, &mut effects),
            HostEvent::AttachedToWindow { tab, window, index } => {
                self.on_attached_to_window(tab, window, index, &mut effects)
            }
            HostEvent::DetachedFromWindow { tab, window } => {
                self.on_detached_from_window(tab, window, &mut effects)
            }
            HostEvent::Pinned { tab } => self.on_pinned(tab, &mut effects),
            HostEvent::Unpinned { tab } => {
                if let Some(node) = self.registry.get_mut(tab) {
                    node.pinned = false;
                }
            }
            HostEvent::Updated { tab, change } => self.on_updated(tab, change, &mut effects),
            HostEvent::Activated { tab, window } => {
                self.on_activated(tab, window, &mut effects, &mut out)
            }
            HostEvent::WindowRestored { window } => {
                if let Some(w) = self.registry.window_mut(window) {
                    w.restoring = false;
                }
                self.restore_window(window, &mut effects);
            }
        }

        self.flush(effects, now, &mut out);
        self.release_parked(now, &mut out);
        out
    }

    fn on_opened(&mut self, tab: HostTab, now: Instant, effects: &mut TreeEffects, out: &mut Output) {
        if self.registry.contains(tab.id) {
            log::debug!("Tab {} opened twice, ignored", tab.id);
            return;
        }
        let window = tab.window;
        let window_was_empty = self.registry.window(window).is_none_or(|w| w.is_empty());
        let previous_active = self.registry.active_tab(window);
        let persistent_id = match tab.persistent_id {
            Some(pid)
                if tab.duplicated_from.is_none() && self.registry.by_persistent_id(&pid).is_none() =>
            {
                pid
            }
            _ => Uuid::new_v4(),
        };

        let internal = self.claim_internal_open(tab.id, window, &tab.url);
        let mut node = TabNode::from_host(&tab, persistent_id, &self.config.group_tab_url_prefix);
        node.origin.internal = internal.is_some();
        self.registry.insert(node, tab.index);
        if tab.restored
            && window_was_empty
            && let Some(w) = self.registry.window_mut(window)
        {
            w.restoring = true;
        }
        if tab.active {
            self.registry.set_active(tab.id);
        }

        if let Some(continuation) = internal {
            if let Some(continuation) = continuation {
                self.run_continuation(tab.id, continuation, effects);
            }
            return;
        }
        if tab.pinned {
            return;
        }
        if tab.restored {
            if !self.registry.window(window).is_some_and(|w| w.restoring) {
                self.restore_closed_links(tab.id, effects);
            }
            return;
        }

        if let Some(original) = tab.duplicated_from
            && self.registry.contains(original)
        {
            let decision = auto_attach::decide(
                &self.registry,
                tab.id,
                original,
                OpenKind::Duplicated,
                &self.config,
            );
            self.apply_decision(tab.id, decision, now, effects, out);
            return;
        }

        let opener = tab
            .opener
            .filter(|&opener| self.registry.get(opener).is_some_and(|node| node.window == window));
        match opener {
            Some(opener) => {
                let pinned_opener = self.registry.get(opener).is_some_and(|node| node.pinned);
                if pinned_opener {
                    if self.config.auto_group_new_tabs_from_pinned
                        || self.config.insert_new_tab_from_pinned_tab_at
                            != PinnedInsertPosition::NoControl
                    {
                        self.queue_burst(window, tab.id, Some(opener), now);
                    }
                } else if self.config.auto_attach {
                    let decision = auto_attach::decide(
                        &self.registry,
                        tab.id,
                        opener,
                        OpenKind::WithOpener,
                        &self.config,
                    );
                    self.apply_decision(tab.id, decision, now, effects, out);
                }
            }
            None => {
                let base = previous_active.filter(|&base| base != tab.id);
                if self.config.auto_attach
                    && self.config.is_new_tab_url(&tab.url)
                    && let Some(base) = base
                {
                    let decision = auto_attach::decide(
                        &self.registry,
                        tab.id,
                        base,
                        OpenKind::NewTabCommand,
                        &self.config,
                    );
                    self.apply_decision(tab.id, decision, now, effects, out);
                } else if self.inserted_mid_strip(tab.id) {
                    self.fixup_inserted(tab.id, window, effects);
                }
                if self.config.auto_group_new_tabs {
                    self.queue_burst(window, tab.id, None, now);
                }
            }
        }
    }

    fn queue_burst(&mut self, window: WindowId, tab: TabId, opener: Option<TabId>, now: Instant) {
        self.bursts.push(
            window,
            PendingTab { tab, opener },
            now + self.config.burst_timeout(),
        );
    }

    fn apply_decision(
        &mut self,
        tab: TabId,
        decision: AutoAttachDecision,
        now: Instant,
        effects: &mut TreeEffects,
        out: &mut Output,
    ) {
        match decision {
            AutoAttachDecision::Keep => {}
            AutoAttachDecision::Attach {
                parent,
                insert_before,
                insert_after,
                insert_at,
            } => {
                let active = self.registry.get(tab).is_some_and(|node| node.active);
                let attached = tree::attach(
                    &mut self.registry,
                    tab,
                    parent,
                    AttachOptions {
                        insert_before,
                        insert_after,
                        insert_at,
                        force_expand: active,
                        move_now: true,
                    },
                    effects,
                );
                if attached && active && self.config.auto_collapse_expand_subtree_on_attach {
                    collapse::intelligent_expand(&mut self.registry, parent, &self.config, effects);
                }
            }
            AutoAttachDecision::Root { placement } => {
                if let Some(placement) = placement {
                    tree::reorder_among(&mut self.registry, &[tab], placement, effects);
                }
            }
            AutoAttachDecision::DeferToPinnedOpener { opener } => {
                let Some(window) = self.registry.get(tab).map(|node| node.window) else {
                    return;
                };
                self.queue_burst(window, tab, Some(opener), now);
            }
            AutoAttachDecision::ReopenInPartition { parent, partition } => {
                let Some(node) = self.registry.get(tab) else {
                    return;
                };
                let window = node.window;
                let url = node.url.clone();
                let active = node.active;
                log::info!(
                    "Reopening tab {} in partition {:?} under {}",
                    tab,
                    partition,
                    parent
                );
                self.issue(
                    HostCommand::Open(OpenTabRequest {
                        window,
                        url: url.clone(),
                        placement: Some(Placement::Before(tab)),
                        opener: Some(parent),
                        partition: Some(partition),
                        active,
                    }),
                    Some(PendingOpen::new(
                        window,
                        url,
                        Some(Continuation::ReplaceProxy { proxy: tab, parent }),
                    )),
                    out,
                );
            }
        }
    }

    /// Opened somewhere other than the end of the strip
    fn inserted_mid_strip(&self, tab: TabId) -> bool {
        self.registry.neighbors(tab).next.is_some()
    }

    /// Treat a tab inserted mid-strip as a tab moved there from the end
    fn fixup_inserted(&mut self, tab: TabId, window: WindowId, effects: &mut TreeEffects) {
        let (Some(to_index), Some(len)) = (
            self.registry.index_of(tab),
            self.registry.window(window).map(|w| w.len()),
        ) else {
            return;
        };
        let from_index = len.saturating_sub(1);
        let previous = self
            .registry
            .normal_tabs(window)
            .into_iter()
            .rev()
            .find(|&id| id != tab);
        let snapshot = TreeSnapshot::capture(&self.registry, window);
        let mv = TabMove {
            tab,
            from_index,
            to_index,
            old_neighbors: Neighbors {
                previous,
                next: None,
            },
        };
        self.apply_classification(&snapshot, mv, effects);
    }

    fn on_closed(
        &mut self,
        tab: TabId,
        window: WindowId,
        window_closing: bool,
        effects: &mut TreeEffects,
    ) {
        let by_internal_operation = self.internal_closes.remove(&tab);
        self.revert_moves.remove(&tab);
        self.internal_activations.remove(&tab);
        let Some(node) = self.registry.get(tab) else {
            log::debug!("Closed tab {} was not registered", tab);
            return;
        };

        if window_closing {
            if self.cache_deadlines.remove(&window).is_some() {
                self.save_cache(window);
            }
            self.registry.remove(tab);
            if self.registry.window(window).is_some_and(|w| w.is_empty()) {
                self.registry.remove_window(window);
                self.bursts.forget_window(window);
                self.open_queues.remove(&window);
                log::info!("Window {} closed", window);
            }
            return;
        }

        let tree_view_visible = self
            .registry
            .window(window)
            .is_none_or(|w| w.tree_view_visible);
        let parent_child_count = node
            .parent()
            .and_then(|parent| self.registry.get(parent))
            .map(|parent| parent.children().len())
            .unwrap_or(0);
        let behavior = resolve_close_parent_behavior(
            node,
            parent_child_count,
            &self.config,
            CloseContext {
                keep_children: false,
                tree_view_visible,
                by_internal_operation,
            },
        );
        let collapsed = node.collapsed();
        self.remember_closed_links(tab);

        if !tree_view_visible && behavior != CloseParentBehavior::CloseAllChildren && collapsed {
            collapse::set_collapsed(&mut self.registry, tab, false, CollapseCause::Automatic, effects);
        }
        if let Some(node) = self.registry.get_mut(tab) {
            node.removing = true;
        }
        tree::detach_all_children(
            &mut self.registry,
            tab,
            behavior,
            DetachAllOptions {
                move_to_bottom: self.config.move_tabs_to_bottom_when_detached_from_closed_parent,
            },
            effects,
        );
        tree::detach(
            &mut self.registry,
            tab,
            DetachOptions {
                preserve_indent: true,
            },
            effects,
        );
        self.registry.remove(tab);
        effects.structure_changed(window);
    }

    fn on_moving(&mut self, tab: TabId, window: WindowId) {
        let opening = self
            .registry
            .window(window)
            .is_some_and(|w| w.opening_count > 0);
        let in_flight = self
            .pending
            .values()
            .any(|pending| pending.unechoed.contains(&tab));
        if !opening || in_flight || self.config.insert_new_child_at == InsertPosition::NoControl {
            return;
        }
        if self.registry.get(tab).is_some_and(|node| node.opener.is_some()) {
            log::debug!("Foreign move of freshly opened tab {} will be reverted", tab);
            self.revert_moves.insert(tab);
        }
    }

    fn on_moved(
        &mut self,
        tab: TabId,
        window: WindowId,
        from_index: usize,
        to_index: usize,
        effects: &mut TreeEffects,
    ) {
        if self.consume_move_echo(tab) {
            return;
        }
        let Some(node) = self.registry.get(tab) else {
            log::debug!("Moved tab {} is not registered", tab);
            return;
        };
        if node.window != window {
            log::debug!("Moved tab {} reported in window {}, ignored", tab, window);
            return;
        }
        if from_index != to_index && self.registry.index_of(tab) == Some(to_index) {
            // Late echo of a move the engine already applied
            return;
        }
        let pinned = node.pinned;
        let old_neighbors = self.registry.neighbors(tab);
        self.registry.move_to_index(tab, to_index);
        effects.structure_changed(window);
        if pinned {
            return;
        }
        if self.revert_moves.remove(&tab) {
            self.move_back(tab, old_neighbors, effects);
            return;
        }

        let tree_view_visible = self
            .registry
            .window(window)
            .is_none_or(|w| w.tree_view_visible);
        if !should_apply_tree_behavior(
            self.config.parent_tab_behavior_for_changes,
            tree_view_visible,
            false,
        ) {
            self.loosen(tab, tree_view_visible, effects);
            return;
        }

        let snapshot = TreeSnapshot::capture(&self.registry, window);
        self.apply_classification(
            &snapshot,
            TabMove {
                tab,
                from_index,
                to_index,
                old_neighbors,
            },
            effects,
        );
    }

    /// Hand the children on and detach the tab itself
    fn loosen(&mut self, tab: TabId, tree_view_visible: bool, effects: &mut TreeEffects) {
        let Some(node) = self.registry.get(tab) else {
            return;
        };
        let parent_child_count = node
            .parent()
            .and_then(|parent| self.registry.get(parent))
            .map(|parent| parent.children().len())
            .unwrap_or(0);
        let behavior = resolve_close_parent_behavior(
            node,
            parent_child_count,
            &self.config,
            CloseContext {
                keep_children: true,
                tree_view_visible,
                by_internal_operation: false,
            },
        );
        tree::detach_all_children(
            &mut self.registry,
            tab,
            behavior,
            DetachAllOptions::default(),
            effects,
        );
        tree::detach(&mut self.registry, tab, DetachOptions::default(), effects);
    }

    fn apply_classification(&mut self, snapshot: &TreeSnapshot, mv: TabMove, effects: &mut TreeEffects) {
        let old_parent = self.registry.get(mv.tab).and_then(|node| node.parent());
        let action = classifier::classify(snapshot, &mv, &self.config);
        crate::debug_info!("CLASSIFY", "tab {} {} -> {}: {:?}", mv.tab, mv.from_index, mv.to_index, action);
        match action {
            TabAction::NoOp => {}
            TabAction::MoveBack => {
                self.move_back(mv.tab, mv.old_neighbors, effects);
                return;
            }
            TabAction::Attach {
                parent,
                insert_before,
                insert_after,
            } => {
                tree::attach(
                    &mut self.registry,
                    mv.tab,
                    parent,
                    AttachOptions {
                        insert_before,
                        insert_after,
                        insert_at: self.config.insert_new_child_at,
                        ..AttachOptions::default()
                    },
                    effects,
                );
            }
            TabAction::Detach => {
                tree::detach(&mut self.registry, mv.tab, DetachOptions::default(), effects);
            }
        }
        let new_parent = self.registry.get(mv.tab).and_then(|node| node.parent());
        for parent in [old_parent, new_parent].into_iter().flatten() {
            tree::sync_children_order(&mut self.registry, parent);
        }
        tree::follow_descendants(&mut self.registry, mv.tab, effects);
    }

    /// Put a tab back between its old neighbours
    fn move_back(&mut self, tab: TabId, old: Neighbors, effects: &mut TreeEffects) {
        let valid = |id: &TabId| *id != tab && self.registry.get(*id).is_some_and(|n| !n.removing);
        let placement = old
            .previous
            .filter(valid)
            .map(Placement::After)
            .or_else(|| old.next.filter(valid).map(Placement::Before));
        let (Some(placement), Some(window)) =
            (placement, self.registry.get(tab).map(|node| node.window))
        else {
            return;
        };
        log::debug!("Moving tab {} back ({:?})", tab, placement);
        if self.registry.move_block(&[tab], placement) {
            effects.push_move(vec![tab], window, placement);
        }
    }

    fn on_attached_to_window(
        &mut self,
        tab: TabId,
        window: WindowId,
        index: usize,
        effects: &mut TreeEffects,
    ) {
        if self.transfers.remove(&tab) {
            self.consume_move_echo(tab);
            return;
        }
        if !self.registry.contains(tab) {
            log::debug!("Tab {} attached to window {} is not registered", tab, window);
            return;
        }
        self.registry.transfer_to_window(tab, window, index);
        effects.structure_changed(window);

        let tree_view_visible = self
            .registry
            .window(window)
            .is_none_or(|w| w.tree_view_visible);
        if !should_apply_tree_behavior(
            self.config.parent_tab_behavior_for_changes,
            tree_view_visible,
            false,
        ) {
            return;
        }
        let descendants = tree::descendants(&self.registry, tab);
        if descendants.is_empty() {
            return;
        }
        for &descendant in &descendants {
            if self
                .registry
                .get(descendant)
                .is_some_and(|node| node.window != window)
            {
                self.transfers.insert(descendant);
            }
        }
        log::info!(
            "Tab {} moved to window {}; {} descendants follow",
            tab,
            window,
            descendants.len()
        );
        let placement = Placement::After(tab);
        if self.registry.move_block(&descendants, placement) {
            effects.push_move(descendants.clone(), window, placement);
        }
        for descendant in descendants {
            let orphan = self.registry.get(descendant).is_some_and(|node| {
                node.parent()
                    .and_then(|parent| self.registry.get(parent))
                    .is_none_or(|parent| parent.removing || parent.window != window)
            });
            if orphan {
                tree::attach(
                    &mut self.registry,
                    descendant,
                    tab,
                    AttachOptions {
                        insert_at: InsertPosition::End,
                        ..AttachOptions::default()
                    },
                    effects,
                );
            }
        }
    }

    fn on_detached_from_window(&mut self, tab: TabId, window: WindowId, effects: &mut TreeEffects) {
        if self.transfers.contains(&tab) {
            return;
        }
        let Some(node) = self.registry.get(tab) else {
            log::debug!("Tab {} detached from window {} is not registered", tab, window);
            return;
        };
        let tree_view_visible = self
            .registry
            .window(window)
            .is_none_or(|w| w.tree_view_visible);
        if !should_apply_tree_behavior(
            self.config.parent_tab_behavior_for_changes,
            tree_view_visible,
            false,
        ) {
            let parent_child_count = node
                .parent()
                .and_then(|parent| self.registry.get(parent))
                .map(|parent| parent.children().len())
                .unwrap_or(0);
            let behavior = match resolve_close_parent_behavior(
                node,
                parent_child_count,
                &self.config,
                CloseContext {
                    keep_children: false,
                    tree_view_visible,
                    by_internal_operation: false,
                },
            ) {
                CloseParentBehavior::CloseAllChildren => CloseParentBehavior::PromoteFirstChild,
                other => other,
            };
            tree::detach_all_children(
                &mut self.registry,
                tab,
                behavior,
                DetachAllOptions::default(),
                effects,
            );
        }
        tree::detach(&mut self.registry, tab, DetachOptions::default(), effects);
        self.registry.detach_from_order(tab);
        effects.structure_changed(window);
    }

    fn on_pinned(&mut self, tab: TabId, effects: &mut TreeEffects) {
        let Some(node) = self.registry.get_mut(tab) else {
            return;
        };
        node.pinned = true;
        let window = node.window;
        collapse::set_collapsed(&mut self.registry, tab, false, CollapseCause::Automatic, effects);
        let tree_view_visible = self
            .registry
            .window(window)
            .is_none_or(|w| w.tree_view_visible);
        self.loosen(tab, tree_view_visible, effects);
        effects.structure_changed(window);
    }

    fn on_updated(&mut self, tab: TabId, change: TabChange, effects: &mut TreeEffects) {
        let prefix = self.config.group_tab_url_prefix.clone();
        let Some(node) = self.registry.get_mut(tab) else {
            log::debug!("Updated tab {} is not registered", tab);
            return;
        };
        if let Some(url) = change.url {
            node.group = GroupTabUrl::parse(&prefix, &url);
            node.url = url;
        }
        if let Some(title) = change.title {
            node.title = title;
        }
        if let Some(partition) = change.partition {
            node.partition = partition;
        }
        let Some(opener) = change.opener else {
            return;
        };
        if node.opener == opener {
            return;
        }
        node.opener = opener;
        let (window, parent, active) = (node.window, node.parent(), node.active);

        let Some(opener) = opener else {
            return;
        };
        if !self.config.sync_parent_tab_and_opener_tab || Some(opener) == parent {
            return;
        }
        let eligible = self
            .registry
            .get(opener)
            .is_some_and(|node| node.window == window && !node.pinned);
        if eligible {
            tree::attach(
                &mut self.registry,
                tab,
                opener,
                AttachOptions {
                    insert_at: InsertPosition::Nearest,
                    force_expand: active,
                    move_now: true,
                    ..AttachOptions::default()
                },
                effects,
            );
        }
    }

    fn on_activated(
        &mut self,
        tab: TabId,
        window: WindowId,
        effects: &mut TreeEffects,
        out: &mut Output,
    ) {
        if !self.registry.contains(tab) {
            log::debug!("Activated tab {} in window {} is not registered", tab, window);
            return;
        }
        self.registry.set_active(tab);
        let context = FocusContext {
            switching: self.tab_switching,
            by_internal_operation: self.internal_activations.remove(&tab),
        };
        match collapse::on_activated(&mut self.registry, tab, context, &self.config, effects) {
            FocusOutcome::Accepted => {}
            FocusOutcome::Redirect(target) => {
                effects
                    .notifications
                    .push(TreeNotification::FocusRedirected { from: tab, to: target });
                self.issue(HostCommand::Activate { tab: target }, None, out);
            }
        }
    }
}
