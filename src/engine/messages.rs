//! Messages from the presentation layer.

use super::{Continuation, Engine, NewTabsProgress, Output, PendingOpen, Reply};
use crate::codec;
use crate::collapse;
use crate::gateway::RequestId;
use crate::host::{HostCommand, OpenTabRequest};
use crate::tab::Placement;
use crate::tree::{self, AttachOptions, DetachOptions, TreeEffects};
use tabtree_config::{TabId, WindowId};
use tabtree_protocol::{CollapseCause, InternalMessage, InternalResponse};
use tokio::time::Instant;

impl Engine {
    /// Handle a presentation-layer message.
    ///
    /// The reply usually comes back in the returned [`Output`]; `new-tabs`
    /// answers later, from the completion of its last open.
    pub fn handle_internal(&mut self, message: InternalMessage, now: Instant) -> (RequestId, Output) {
        let id = self.next_request_id();
        crate::debug_log!("MESSAGE", "#{} {:?}", id, message);
        let mut out = Output::default();
        let mut effects = TreeEffects::default();

        let stale = message
            .referenced_ids()
            .into_iter()
            .any(|tab| !self.registry.contains(tab));
        let response = if stale {
            log::debug!("Message #{} references unknown tabs", id);
            Some(InternalResponse::Ack(false))
        } else {
            self.run_internal(id, message, &mut effects, &mut out)
        };
        if let Some(response) = response {
            out.replies.push((id, Reply::Internal(response)));
        }

        self.flush(effects, now, &mut out);
        self.release_parked(now, &mut out);
        (id, out)
    }

    fn run_internal(
        &mut self,
        id: RequestId,
        message: InternalMessage,
        effects: &mut TreeEffects,
        out: &mut Output,
    ) -> Option<InternalResponse> {
        let response = match message {
            InternalMessage::PullTreeStructure { window } => {
                let tabs = self.registry.normal_tabs(window);
                InternalResponse::Structure {
                    structure: codec::serialize(&self.registry, &tabs),
                }
            }
            InternalMessage::ChangeSubtreeCollapsedState {
                tab,
                collapsed,
                cause,
            } => {
                let intelligent = !collapsed
                    && cause == CollapseCause::Automatic
                    && self.config.auto_expand_intelligently;
                if intelligent {
                    collapse::intelligent_expand(&mut self.registry, tab, &self.config, effects);
                } else {
                    collapse::set_collapsed(&mut self.registry, tab, collapsed, cause, effects);
                }
                InternalResponse::Ack(true)
            }
            InternalMessage::MoveTabs {
                tabs,
                insert_before,
                insert_after,
            } => {
                let placement = insert_before
                    .map(Placement::Before)
                    .or(insert_after.map(Placement::After));
                match placement {
                    Some(placement) => self.move_tabs(tabs, placement, effects),
                    None => InternalResponse::Ack(false),
                }
            }
            InternalMessage::MoveTabsBefore { tabs, next_tab } => {
                self.move_tabs(tabs, Placement::Before(next_tab), effects)
            }
            InternalMessage::MoveTabsAfter { tabs, previous_tab } => {
                self.move_tabs(tabs, Placement::After(previous_tab), effects)
            }
            InternalMessage::AttachTabTo {
                child,
                parent,
                insert_before,
                insert_after,
                force_expand,
            } => {
                let new_tree = self
                    .registry
                    .get(parent)
                    .is_some_and(|node| !node.has_children());
                let attached = tree::attach(
                    &mut self.registry,
                    child,
                    parent,
                    AttachOptions {
                        insert_before,
                        insert_after,
                        insert_at: self.config.insert_new_child_at,
                        force_expand,
                        move_now: true,
                    },
                    effects,
                );
                if attached
                    && (new_tree || force_expand)
                    && self.config.auto_collapse_expand_subtree_on_attach
                {
                    collapse::intelligent_expand(&mut self.registry, parent, &self.config, effects);
                }
                InternalResponse::Ack(attached)
            }
            InternalMessage::DetachTab { tab } => InternalResponse::Ack(tree::detach(
                &mut self.registry,
                tab,
                DetachOptions::default(),
                effects,
            )),
            InternalMessage::NotifyStartTabSwitch {} => {
                self.tab_switching = true;
                InternalResponse::Empty
            }
            InternalMessage::NotifyEndTabSwitch { window } => {
                let was_switching = std::mem::replace(&mut self.tab_switching, false);
                if was_switching && self.config.skip_collapsed_tabs_for_tab_switching_shortcuts {
                    self.expand_after_switch(window, effects);
                }
                InternalResponse::Empty
            }
            InternalMessage::NewTabs {
                urls,
                window,
                parent,
                insert_before,
                insert_after,
                partition,
            } => {
                return self.open_new_tabs(
                    id,
                    urls,
                    window,
                    parent,
                    insert_before,
                    insert_after,
                    partition,
                    out,
                );
            }
            InternalMessage::RequestRegisteredCollaborators {} => {
                InternalResponse::Collaborators(self.gateway.collaborators().clone())
            }
            InternalMessage::ReplaceRegisteredCollaborators { collaborators } => {
                self.gateway.replace_collaborators(collaborators);
                InternalResponse::Ack(true)
            }
            InternalMessage::RequestScrollLockState {} => {
                InternalResponse::ScrollLocks(self.gateway.scroll_lock_states())
            }
            InternalMessage::TreeViewVisibility { window, visible } => {
                self.registry.ensure_window(window).tree_view_visible = visible;
                InternalResponse::Empty
            }
        };
        Some(response)
    }

    /// Move tabs with their subtrees next to an anchor, possibly across windows
    fn move_tabs(
        &mut self,
        tabs: Vec<TabId>,
        placement: Placement,
        effects: &mut TreeEffects,
    ) -> InternalResponse {
        let Some(target_window) = self.registry.get(placement.anchor()).map(|node| node.window)
        else {
            return InternalResponse::Ack(false);
        };
        for &tab in &tabs {
            let Some(window) = self.registry.get(tab).map(|node| node.window) else {
                continue;
            };
            if window == target_window {
                continue;
            }
            log::info!("Moving tab {} from window {} to {}", tab, window, target_window);
            tree::detach(&mut self.registry, tab, DetachOptions::default(), effects);
            effects.structure_changed(window);
            for moving in tree::subtree(&self.registry, tab) {
                self.transfers.insert(moving);
            }
        }
        if !tree::reorder_among(&mut self.registry, &tabs, placement, effects) {
            return InternalResponse::Ack(false);
        }
        InternalResponse::Tabs(
            tabs.into_iter()
                .filter(|&tab| self.registry.contains(tab))
                .collect(),
        )
    }

    fn expand_after_switch(&mut self, window: Option<WindowId>, effects: &mut TreeEffects) {
        let Some(window) = window.or(self.registry.last_focused_window()) else {
            return;
        };
        let Some(tab) = self.registry.active_tab(window) else {
            return;
        };
        let collapsed_parent = self
            .registry
            .get(tab)
            .is_some_and(|node| node.has_children() && node.collapsed());
        if collapsed_parent {
            collapse::handle_new_active_tab(&mut self.registry, tab, &self.config, effects);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn open_new_tabs(
        &mut self,
        id: RequestId,
        urls: Vec<String>,
        window: Option<WindowId>,
        parent: Option<TabId>,
        insert_before: Option<TabId>,
        insert_after: Option<TabId>,
        partition: Option<String>,
        out: &mut Output,
    ) -> Option<InternalResponse> {
        let window = window
            .or_else(|| parent.and_then(|p| self.registry.get(p)).map(|node| node.window))
            .or(self.registry.last_focused_window());
        let Some(window) = window else {
            log::warn!("new-tabs #{}: no window to open in", id);
            return Some(InternalResponse::Tabs(Vec::new()));
        };
        if urls.is_empty() {
            return Some(InternalResponse::Tabs(Vec::new()));
        }

        let placement = match (insert_before, insert_after) {
            (Some(before), _) => Some(Placement::Before(before)),
            (None, Some(after)) => {
                let last = tree::last_descendant(&self.registry, after).unwrap_or(after);
                // Nothing after the anchor: the host appends in order
                self.registry.neighbors(last).next.map(Placement::Before)
            }
            (None, None) => None,
        };

        self.new_tab_requests.insert(
            id,
            NewTabsProgress {
                remaining: urls.len(),
                opened: vec![None; urls.len()],
            },
        );
        let count = urls.len();
        for (slot, url) in urls.into_iter().enumerate() {
            let continuation = parent.map(|parent| Continuation::AttachOpened {
                parent,
                insert_before,
            });
            let mut open = PendingOpen::new(window, url.clone(), continuation);
            open.request = Some((id, slot));
            self.issue(
                HostCommand::Open(OpenTabRequest {
                    window,
                    url,
                    placement,
                    opener: parent,
                    partition: partition.clone(),
                    active: false,
                }),
                Some(open),
                out,
            );
        }
        log::info!("new-tabs #{}: opening {} tabs in window {}", id, count, window);
        None
    }
}
