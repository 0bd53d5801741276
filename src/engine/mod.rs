//! The synchronous reconciliation engine.
//!
//! The engine owns the registry and every piece of in-flight bookkeeping.
//! Inputs are host events, host-call completions, internal messages,
//! external requests and timer ticks; each produces an [`Output`] listing
//! host commands to run, notifications for the presentation layer and
//! replies to requests. The engine never waits: multi-step work is split
//! into a command plus a continuation that runs when the host reports the
//! result, and every continuation re-validates the tabs it touches.

mod events;
mod messages;
mod requests;

use crate::cache::{TreeCache, WindowTreeCache, window_key};
use crate::codec;
use crate::gateway::{Gateway, RequestId};
use crate::grouping::BurstGrouping;
use crate::host::{CommandOutcome, HostCommand, HostError, OpenTabRequest};
use crate::tab::{PersistentId, Placement, TabRegistry};
use crate::tree::{self, AttachOptions, DetachAllOptions, DetachOptions, TreeEffects};
use std::collections::{HashMap, HashSet, VecDeque};
use tabtree_config::{CloseParentBehavior, Config, InsertPosition, TabId, WindowId};
use tabtree_protocol::{ExternalResponse, InternalResponse, TreeNotification};
use tokio::time::Instant;

/// Identifier of an issued host command
pub type CommandId = u64;

/// How many closed tabs keep their tree links for undo-close
const CLOSED_LINKS_CAPACITY: usize = 64;

/// A host command the caller must execute, then report back with
/// [`Engine::handle_completion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCommand {
    pub id: CommandId,
    pub command: HostCommand,
}

/// Answer to a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    External(ExternalResponse),
    Internal(InternalResponse),
}

/// Everything one engine input produced.
#[derive(Debug, Default)]
pub struct Output {
    pub commands: Vec<IssuedCommand>,
    pub notifications: Vec<TreeNotification>,
    pub replies: Vec<(RequestId, Reply)>,
}

impl Output {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.notifications.is_empty() && self.replies.is_empty()
    }

    /// Reply addressed to `request`, if produced
    pub fn reply_for(&self, request: RequestId) -> Option<&Reply> {
        self.replies
            .iter()
            .find(|(id, _)| *id == request)
            .map(|(_, reply)| reply)
    }
}

/// Work to do once an engine-opened tab is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Continuation {
    AttachOpened {
        parent: TabId,
        insert_before: Option<TabId>,
    },
    AdoptAsGroup {
        parent: Option<TabId>,
        insert_before: Option<TabId>,
        children: Vec<TabId>,
    },
    /// Replaces `proxy`, which is closed once the new tab is in place
    ReplaceProxy { proxy: TabId, parent: TabId },
}

#[derive(Debug)]
struct PendingOpen {
    window: WindowId,
    url: String,
    continuation: Option<Continuation>,
    /// `new-tabs` request and slot waiting for this tab's id
    request: Option<(RequestId, usize)>,
    /// Set once an `opened` event was attributed to this command
    matched: Option<TabId>,
}

impl PendingOpen {
    fn new(window: WindowId, url: String, continuation: Option<Continuation>) -> Self {
        Self {
            window,
            url,
            continuation,
            request: None,
            matched: None,
        }
    }
}

#[derive(Debug)]
struct PendingCommand {
    command: HostCommand,
    window: Option<WindowId>,
    /// Moved tabs whose host event has not arrived yet
    unechoed: Vec<TabId>,
    open: Option<PendingOpen>,
}

#[derive(Debug)]
struct NewTabsProgress {
    remaining: usize,
    opened: Vec<Option<TabId>>,
}

/// Tree links of a closed tab, by persistent id
#[derive(Debug, Clone)]
struct ClosedLinks {
    parent: Option<PersistentId>,
    children: Vec<PersistentId>,
}

/// The reconciliation engine.
pub struct Engine {
    config: Config,
    registry: TabRegistry,
    gateway: Gateway,
    bursts: BurstGrouping,
    cache: Option<Box<dyn TreeCache>>,
    next_command: CommandId,
    next_request: RequestId,
    pending: HashMap<CommandId, PendingCommand>,
    /// Open commands per window, oldest first, not yet matched to a tab
    open_queues: HashMap<WindowId, VecDeque<CommandId>>,
    /// Tabs whose open completed before their `opened` event
    awaiting_registration: HashMap<TabId, Option<Continuation>>,
    internal_closes: HashSet<TabId>,
    internal_activations: HashSet<TabId>,
    /// Tabs the engine is moving into another window
    transfers: HashSet<TabId>,
    /// Tabs whose announced move must be reverted
    revert_moves: HashSet<TabId>,
    closed_links: HashMap<PersistentId, ClosedLinks>,
    closed_order: VecDeque<PersistentId>,
    new_tab_requests: HashMap<RequestId, NewTabsProgress>,
    cache_deadlines: HashMap<WindowId, Instant>,
    tab_switching: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tabs", &self.registry.len())
            .field("pending_commands", &self.pending.len())
            .field("parked_requests", &self.gateway.parked_len())
            .finish()
    }
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let gateway = Gateway::with_cached(&config.cached_external_collaborators);
        Self {
            config,
            registry: TabRegistry::new(),
            gateway,
            bursts: BurstGrouping::new(),
            cache: None,
            next_command: 1,
            next_request: 1,
            pending: HashMap::new(),
            open_queues: HashMap::new(),
            awaiting_registration: HashMap::new(),
            internal_closes: HashSet::new(),
            internal_activations: HashSet::new(),
            transfers: HashSet::new(),
            revert_moves: HashSet::new(),
            closed_links: HashMap::new(),
            closed_order: VecDeque::new(),
            new_tab_requests: HashMap::new(),
            cache_deadlines: HashMap::new(),
            tab_switching: false,
        }
    }

    /// Use `cache` to persist and restore window trees
    pub fn with_cache(mut self, cache: impl TreeCache + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    pub fn registry(&self) -> &TabRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Host commands issued and not completed yet
    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    /// Collaborators that want notifications of `kind`
    pub fn listeners(&self, kind: &str) -> Vec<String> {
        self.gateway.listeners(kind)
    }

    /// Earliest time [`Engine::tick`] has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.bursts.next_deadline(),
            self.gateway.next_deadline(),
            self.cache_deadlines.values().min().copied(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Run timers: settled bursts, expired parked requests, cache writes
    pub fn tick(&mut self, now: Instant) -> Output {
        let mut out = Output::default();
        let mut effects = TreeEffects::default();

        for (window, pending) in self.bursts.take_due(now) {
            if self.gateway.grouping_blocks().is_blocked() {
                log::debug!(
                    "Burst of {} tabs in window {} not grouped: grouping blocked by {:?}",
                    pending.len(),
                    window,
                    self.gateway.grouping_blocks().holders().collect::<Vec<_>>()
                );
                continue;
            }
            crate::grouping::flush_burst(
                &mut self.registry,
                window,
                pending,
                &self.config,
                &mut effects,
            );
        }

        let due: Vec<WindowId> = self
            .cache_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(&window, _)| window)
            .collect();
        for window in due {
            self.cache_deadlines.remove(&window);
            self.save_cache(window);
        }

        self.flush(effects, now, &mut out);

        for parked in self.gateway.take_expired(now) {
            self.process_external(parked.id, &parked.sender, parked.request, now, &mut out);
        }
        out
    }

    /// Feed back the result of an issued command
    pub fn handle_completion(
        &mut self,
        id: CommandId,
        result: Result<CommandOutcome, HostError>,
        now: Instant,
    ) -> Output {
        let mut out = Output::default();
        let Some(pending) = self.pending.remove(&id) else {
            log::debug!("Completion for unknown command #{}", id);
            return out;
        };
        if let Err(error) = &result {
            log::warn!(
                "Host rejected {} command #{}: {}",
                pending.command.kind(),
                id,
                error
            );
        }

        let mut effects = TreeEffects::default();
        match pending.command {
            HostCommand::Move { .. } => {
                if let Some(window) = pending.window
                    && let Some(w) = self.registry.window_mut(window)
                {
                    w.internal_moving_count =
                        w.internal_moving_count.saturating_sub(pending.unechoed.len());
                }
            }
            HostCommand::Open(_) => {
                if let Some(open) = pending.open {
                    self.complete_open(id, open, result, &mut effects, &mut out);
                }
            }
            HostCommand::Close { tab } => {
                if result.is_err() {
                    self.internal_closes.remove(&tab);
                }
            }
            HostCommand::Activate { tab } => {
                if result.is_err() {
                    self.internal_activations.remove(&tab);
                }
            }
            HostCommand::SetOpener { .. } => {}
        }

        self.flush(effects, now, &mut out);
        self.release_parked(now, &mut out);
        out
    }

    // ========================================================================
    // Command bookkeeping
    // ========================================================================

    fn issue(&mut self, command: HostCommand, open: Option<PendingOpen>, out: &mut Output) -> CommandId {
        let id = self.next_command;
        self.next_command += 1;

        let mut window = None;
        let mut unechoed = Vec::new();
        match &command {
            HostCommand::Move { tabs, window: target, .. } => {
                window = Some(*target);
                unechoed = tabs.clone();
                if let Some(w) = self.registry.window_mut(*target) {
                    w.internal_moving_count += tabs.len();
                }
            }
            HostCommand::Open(request) => {
                window = Some(request.window);
                self.registry.ensure_window(request.window).opening_count += 1;
                self.open_queues.entry(request.window).or_default().push_back(id);
            }
            HostCommand::Close { tab } => {
                self.internal_closes.insert(*tab);
            }
            HostCommand::Activate { tab } => {
                self.internal_activations.insert(*tab);
            }
            HostCommand::SetOpener { .. } => {}
        }

        crate::debug_log!("ENGINE", "issue #{} {:?}", id, command);
        self.pending.insert(
            id,
            PendingCommand {
                command: command.clone(),
                window,
                unechoed,
                open,
            },
        );
        out.commands.push(IssuedCommand { id, command });
        id
    }

    /// Match a host move event against in-flight engine moves
    fn consume_move_echo(&mut self, tab: TabId) -> bool {
        let Some(id) = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.unechoed.contains(&tab))
            .map(|(&id, _)| id)
            .min()
        else {
            return false;
        };
        let Some(pending) = self.pending.get_mut(&id) else {
            return false;
        };
        if let Some(position) = pending.unechoed.iter().position(|&t| t == tab) {
            pending.unechoed.remove(position);
        }
        if let Some(window) = pending.window
            && let Some(w) = self.registry.window_mut(window)
        {
            w.internal_moving_count = w.internal_moving_count.saturating_sub(1);
        }
        true
    }

    /// Attribute an `opened` event to an engine-issued open, if it is one
    fn claim_internal_open(&mut self, tab: TabId, window: WindowId, url: &str) -> Option<Option<Continuation>> {
        if let Some(continuation) = self.awaiting_registration.remove(&tab) {
            return Some(continuation);
        }
        let queue = self.open_queues.get_mut(&window)?;
        let position = queue.iter().position(|id| {
            self.pending
                .get(id)
                .and_then(|pending| pending.open.as_ref())
                .is_some_and(|open| open.url == url)
        })?;
        let id = queue.remove(position)?;
        let open = self.pending.get_mut(&id)?.open.as_mut()?;
        open.matched = Some(tab);
        let continuation = open.continuation.take();
        if let Some(w) = self.registry.window_mut(window) {
            w.opening_count = w.opening_count.saturating_sub(1);
        }
        log::debug!("Tab {} attributed to open command #{}", tab, id);
        Some(continuation)
    }

    fn complete_open(
        &mut self,
        id: CommandId,
        open: PendingOpen,
        result: Result<CommandOutcome, HostError>,
        effects: &mut TreeEffects,
        out: &mut Output,
    ) {
        if let Some(queue) = self.open_queues.get_mut(&open.window) {
            queue.retain(|&queued| queued != id);
        }
        if open.matched.is_none()
            && let Some(w) = self.registry.window_mut(open.window)
        {
            w.opening_count = w.opening_count.saturating_sub(1);
        }
        let opened = match result {
            Ok(CommandOutcome::Opened(tab)) => Some(tab),
            _ => None,
        };
        if let Some((request, slot)) = open.request {
            self.progress_new_tabs(request, slot, opened, out);
        }
        let (Some(tab), None) = (opened, open.matched) else {
            return;
        };
        if self.registry.contains(tab) {
            // Registered under a URL the host rewrote; adopt it now.
            if let Some(node) = self.registry.get_mut(tab) {
                node.origin.internal = true;
            }
            if let Some(continuation) = open.continuation {
                self.run_continuation(tab, continuation, effects);
            }
        } else {
            self.awaiting_registration.insert(tab, open.continuation);
        }
    }

    fn progress_new_tabs(
        &mut self,
        request: RequestId,
        slot: usize,
        opened: Option<TabId>,
        out: &mut Output,
    ) {
        let Some(progress) = self.new_tab_requests.get_mut(&request) else {
            return;
        };
        if let Some(entry) = progress.opened.get_mut(slot) {
            *entry = opened;
        }
        progress.remaining = progress.remaining.saturating_sub(1);
        if progress.remaining > 0 {
            return;
        }
        if let Some(progress) = self.new_tab_requests.remove(&request) {
            let tabs = progress.opened.into_iter().flatten().collect();
            out.replies
                .push((request, Reply::Internal(InternalResponse::Tabs(tabs))));
        }
    }

    fn run_continuation(&mut self, tab: TabId, continuation: Continuation, effects: &mut TreeEffects) {
        crate::debug_log!("ENGINE", "continuation for tab {}: {:?}", tab, continuation);
        match continuation {
            Continuation::AttachOpened {
                parent,
                insert_before,
            } => {
                tree::attach(
                    &mut self.registry,
                    tab,
                    parent,
                    AttachOptions {
                        insert_before,
                        insert_at: InsertPosition::Nearest,
                        ..AttachOptions::default()
                    },
                    effects,
                );
            }
            Continuation::AdoptAsGroup {
                parent,
                insert_before,
                children,
            } => {
                match parent {
                    Some(parent) => {
                        tree::attach(
                            &mut self.registry,
                            tab,
                            parent,
                            AttachOptions {
                                insert_before,
                                ..AttachOptions::default()
                            },
                            effects,
                        );
                    }
                    None => {
                        tree::detach(&mut self.registry, tab, DetachOptions::default(), effects);
                    }
                }
                let window = self.registry.get(tab).map(|node| node.window);
                for child in children {
                    let adoptable = self.registry.get(child).is_some_and(|node| {
                        Some(node.window) == window && !node.removing && !node.pinned
                    });
                    if adoptable {
                        tree::attach(
                            &mut self.registry,
                            child,
                            tab,
                            AttachOptions {
                                insert_at: InsertPosition::End,
                                ..AttachOptions::default()
                            },
                            effects,
                        );
                    }
                }
                tree::follow_descendants(&mut self.registry, tab, effects);
            }
            Continuation::ReplaceProxy { proxy, parent } => {
                tree::attach(
                    &mut self.registry,
                    tab,
                    parent,
                    AttachOptions {
                        insert_at: self.config.insert_new_child_at,
                        move_now: true,
                        ..AttachOptions::default()
                    },
                    effects,
                );
                if self.registry.contains(proxy) {
                    effects.closes.push(proxy);
                }
            }
        }
    }

    // ========================================================================
    // Effects
    // ========================================================================

    /// Turn tree effects into host commands and notifications
    fn flush(&mut self, mut effects: TreeEffects, now: Instant, out: &mut Output) {
        self.cleanup_groups(&mut effects);

        for mv in std::mem::take(&mut effects.moves) {
            let tabs: Vec<TabId> = mv
                .tabs
                .into_iter()
                .filter(|&tab| self.registry.contains(tab))
                .collect();
            if tabs.is_empty() {
                continue;
            }
            self.issue(
                HostCommand::Move {
                    tabs,
                    window: mv.window,
                    placement: mv.placement,
                },
                None,
                out,
            );
        }

        for tab in std::mem::take(&mut effects.closes) {
            if self.internal_closes.contains(&tab) || !self.registry.contains(tab) {
                continue;
            }
            self.issue(HostCommand::Close { tab }, None, out);
        }

        for group in std::mem::take(&mut effects.group_opens) {
            let url = group.group.build(&self.config.group_tab_url_prefix);
            let placement = self
                .placement_anchor_valid(group.placement)
                .then_some(group.placement);
            let continuation = Continuation::AdoptAsGroup {
                parent: group.parent,
                insert_before: group.insert_before,
                children: group.children,
            };
            log::info!(
                "Opening group tab {:?} in window {}",
                group.group.title,
                group.window
            );
            self.issue(
                HostCommand::Open(OpenTabRequest {
                    window: group.window,
                    url: url.clone(),
                    placement,
                    opener: None,
                    partition: None,
                    active: false,
                }),
                Some(PendingOpen::new(group.window, url, Some(continuation))),
                out,
            );
        }

        self.sync_openers(&effects.notifications, out);
        out.notifications.append(&mut effects.notifications);
        for window in effects.changed_windows {
            out.notifications
                .push(TreeNotification::TreeStructureChanged { window });
            self.schedule_cache_save(window, now);
        }
    }

    /// Close temporary group tabs left with too few children
    fn cleanup_groups(&mut self, effects: &mut TreeEffects) {
        let Some(threshold) = self.config.group_tab_cleanup.threshold() else {
            effects.orphaned_parents.clear();
            return;
        };
        let mut checked = HashSet::new();
        while let Some(parent) = effects.orphaned_parents.pop() {
            if !checked.insert(parent) {
                continue;
            }
            let Some(node) = self.registry.get(parent) else {
                continue;
            };
            let remaining = node.children().len();
            if !node.is_temporary_group()
                || node.removing
                || remaining > threshold
                || self.internal_closes.contains(&parent)
            {
                continue;
            }
            log::info!(
                "Discarding temporary group tab {} ({} children left)",
                parent,
                remaining
            );
            tree::detach_all_children(
                &mut self.registry,
                parent,
                CloseParentBehavior::PromoteAllChildren,
                DetachAllOptions::default(),
                effects,
            );
            effects.closes.push(parent);
        }
    }

    /// Mirror parent links into host openers
    fn sync_openers(&mut self, notifications: &[TreeNotification], out: &mut Output) {
        if !self.config.sync_parent_tab_and_opener_tab {
            return;
        }
        let mut touched: Vec<TabId> = Vec::new();
        for note in notifications {
            if let TreeNotification::Attached { tab, .. } | TreeNotification::Detached { tab, .. } = note
                && !touched.contains(tab)
            {
                touched.push(*tab);
            }
        }
        for tab in touched {
            let Some(node) = self.registry.get_mut(tab) else {
                continue;
            };
            let opener = node.parent();
            if node.removing || node.opener == opener {
                continue;
            }
            node.opener = opener;
            self.issue(HostCommand::SetOpener { tab, opener }, None, out);
        }
    }

    // ========================================================================
    // Tree cache
    // ========================================================================

    fn schedule_cache_save(&mut self, window: WindowId, now: Instant) {
        if !self.config.use_cached_tree || self.cache.is_none() {
            return;
        }
        if self.registry.window(window).is_none_or(|w| w.restoring) {
            return;
        }
        self.cache_deadlines
            .insert(window, now + self.config.cache_save_delay());
    }

    fn save_cache(&mut self, window: WindowId) {
        let Some(cache) = &self.cache else {
            return;
        };
        let key = window_key(window);
        let tabs = self.registry.normal_tabs(window);
        if tabs.is_empty() {
            if let Err(error) = cache.remove(&key) {
                log::warn!("Failed to drop tree cache for window {}: {:#}", window, error);
            }
            return;
        }
        let signature = self.signature(&tabs);
        let entry = WindowTreeCache::new(signature, codec::serialize(&self.registry, &tabs));
        if let Err(error) = cache.store(&key, &entry) {
            log::warn!("Failed to save tree cache for window {}: {:#}", window, error);
        }
    }

    fn signature(&self, tabs: &[TabId]) -> Vec<PersistentId> {
        tabs.iter()
            .filter_map(|&tab| self.registry.get(tab).map(|node| node.persistent_id))
            .collect()
    }

    /// Rebuild a restored window's tree from the cache, or from openers
    fn restore_window(&mut self, window: WindowId, effects: &mut TreeEffects) {
        let tabs = self.registry.normal_tabs(window);
        if tabs.is_empty() {
            return;
        }
        let cached = if self.config.use_cached_tree {
            self.cache
                .as_ref()
                .and_then(|cache| match cache.load(&window_key(window)) {
                    Ok(entry) => entry,
                    Err(error) => {
                        log::warn!("Failed to read tree cache for window {}: {:#}", window, error);
                        None
                    }
                })
        } else {
            None
        };

        let signature = self.signature(&tabs);
        match cached.map(|entry| entry.validate(&signature).map(|_| entry)) {
            Some(Ok(entry)) => {
                log::info!("Restoring window {} from tree cache", window);
                codec::restore(&mut self.registry, &entry.structure, &tabs, effects);
            }
            Some(Err(error)) => {
                log::warn!("Tree cache for window {} unusable: {}", window, error);
                self.infer_from_openers(&tabs, effects);
            }
            None => self.infer_from_openers(&tabs, effects),
        }
    }

    fn infer_from_openers(&mut self, tabs: &[TabId], effects: &mut TreeEffects) {
        let mut attached = 0;
        for &tab in tabs {
            let Some(node) = self.registry.get(tab) else {
                continue;
            };
            let Some(opener) = node.opener else {
                continue;
            };
            if node.parent().is_some()
                || self.registry.index_of(opener) >= self.registry.index_of(tab)
            {
                continue;
            }
            let attach = AttachOptions {
                insert_at: InsertPosition::End,
                ..AttachOptions::default()
            };
            if tree::attach(&mut self.registry, tab, opener, attach, effects) {
                attached += 1;
            }
        }
        log::info!("Inferred {} parent links from openers", attached);
    }

    // ========================================================================
    // Closed tab memory
    // ========================================================================

    fn remember_closed_links(&mut self, tab: TabId) {
        let Some(node) = self.registry.get(tab) else {
            return;
        };
        let pid = |id: TabId| self.registry.get(id).map(|node| node.persistent_id);
        let links = ClosedLinks {
            parent: node.parent().and_then(pid),
            children: node.children().iter().copied().filter_map(pid).collect(),
        };
        if links.parent.is_none() && links.children.is_empty() {
            return;
        }
        let key = node.persistent_id;
        if self.closed_links.insert(key, links).is_none() {
            self.closed_order.push_back(key);
        }
        while self.closed_order.len() > CLOSED_LINKS_CAPACITY {
            if let Some(oldest) = self.closed_order.pop_front() {
                self.closed_links.remove(&oldest);
            }
        }
    }

    /// Put a reopened tab back where it was when it closed
    fn restore_closed_links(&mut self, tab: TabId, effects: &mut TreeEffects) {
        let Some(node) = self.registry.get(tab) else {
            return;
        };
        let window = node.window;
        let Some(links) = self.closed_links.remove(&node.persistent_id) else {
            return;
        };
        self.closed_order.retain(|pid| self.closed_links.contains_key(pid));
        if let Some(parent) = links
            .parent
            .and_then(|pid| self.registry.by_persistent_id(&pid))
        {
            tree::attach(
                &mut self.registry,
                tab,
                parent,
                AttachOptions {
                    insert_at: InsertPosition::Nearest,
                    ..AttachOptions::default()
                },
                effects,
            );
        }
        let children: Vec<TabId> = links
            .children
            .iter()
            .filter_map(|pid| self.registry.by_persistent_id(pid))
            .collect();
        for child in children {
            let orphan = self
                .registry
                .get(child)
                .is_some_and(|node| node.window == window && node.parent().is_none());
            if orphan {
                tree::attach(
                    &mut self.registry,
                    child,
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

    fn next_request_id(&mut self) -> RequestId {
        let id = self.next_request;
        self.next_request += 1;
        id
    }

    /// Process parked requests whose tabs are now known
    fn release_parked(&mut self, now: Instant, out: &mut Output) {
        if self.gateway.parked_len() == 0 {
            return;
        }
        for parked in self.gateway.take_ready(&self.registry) {
            self.process_external(parked.id, &parked.sender, parked.request, now, out);
        }
    }

    fn placement_anchor_valid(&self, placement: Placement) -> bool {
        self.registry
            .get(placement.anchor())
            .is_some_and(|node| !node.removing)
    }
}

#[cfg(test)]
mod tests;
