//! External control gateway
//!
//! Bookkeeping for third-party collaborators: who is registered, who holds
//! scroll locks or grouping blocks, and which requests are parked waiting
//! for tab ids the registry does not know yet. Target resolution and tab
//! serialization live here too; the engine executes the mutating requests.

use crate::grouping::GroupingBlocks;
use crate::tab::TabRegistry;
use crate::tree;
use std::collections::{BTreeMap, BTreeSet};
use tabtree_config::TabId;
use tabtree_protocol::{
    CollaboratorInfo, ExternalRequest, ExternalResponse, SerializedTab, TabRef, TabsRef,
    TargetSpec,
};
use thiserror::Error;
use tokio::time::Instant;

/// State tag reported for synthetic group tabs
pub const GROUP_TAB_STATE: &str = "group-tab";

/// Identifier the engine assigns to each external request
pub type RequestId = u64;

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown sender: {0}")]
    UnknownSender(String),
}

/// A request waiting for its tab ids to be registered.
#[derive(Debug, Clone)]
pub struct ParkedRequest {
    pub id: RequestId,
    pub sender: String,
    pub request: ExternalRequest,
    pub deadline: Instant,
}

/// Collaborator registry plus the holds they own.
#[derive(Debug, Default)]
pub struct Gateway {
    collaborators: BTreeMap<String, CollaboratorInfo>,
    scroll_locks: BTreeSet<String>,
    grouping_blocks: GroupingBlocks,
    parked: Vec<ParkedRequest>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register collaborators remembered from a previous session
    pub fn with_cached(senders: &[String]) -> Self {
        let mut gateway = Self::new();
        for sender in senders {
            gateway
                .collaborators
                .insert(sender.clone(), CollaboratorInfo::default());
        }
        gateway
    }

    pub fn register(&mut self, sender: &str, info: CollaboratorInfo) {
        log::info!("Collaborator {:?} registered", sender);
        self.collaborators.insert(sender.to_string(), info);
    }

    /// Remove a collaborator and drop every hold it owns
    pub fn unregister(&mut self, sender: &str) -> Result<(), GatewayError> {
        if self.collaborators.remove(sender).is_none() {
            return Err(GatewayError::UnknownSender(sender.to_string()));
        }
        self.scroll_locks.remove(sender);
        self.grouping_blocks.unblock(sender);
        self.parked.retain(|parked| parked.sender != sender);
        log::info!("Collaborator {:?} unregistered", sender);
        Ok(())
    }

    pub fn is_registered(&self, sender: &str) -> bool {
        self.collaborators.contains_key(sender)
    }

    pub fn collaborators(&self) -> &BTreeMap<String, CollaboratorInfo> {
        &self.collaborators
    }

    /// Replace the collaborator list; holds of dropped collaborators go too
    pub fn replace_collaborators(&mut self, collaborators: BTreeMap<String, CollaboratorInfo>) {
        let dropped: Vec<String> = self
            .collaborators
            .keys()
            .filter(|sender| !collaborators.contains_key(*sender))
            .cloned()
            .collect();
        for sender in &dropped {
            self.scroll_locks.remove(sender);
            self.grouping_blocks.unblock(sender);
        }
        self.collaborators = collaborators;
    }

    /// Senders that listen for a notification kind
    pub fn listeners(&self, kind: &str) -> Vec<String> {
        self.collaborators
            .iter()
            .filter(|(_, info)| {
                info.listening_types.is_empty()
                    || info.listening_types.iter().any(|listened| listened == kind)
            })
            .map(|(sender, _)| sender.clone())
            .collect()
    }

    pub fn lock_scroll(&mut self, sender: &str) {
        self.scroll_locks.insert(sender.to_string());
    }

    pub fn unlock_scroll(&mut self, sender: &str) -> bool {
        self.scroll_locks.remove(sender)
    }

    pub fn scroll_locked(&self) -> bool {
        !self.scroll_locks.is_empty()
    }

    /// Lock state per registered collaborator
    pub fn scroll_lock_states(&self) -> BTreeMap<String, bool> {
        self.collaborators
            .keys()
            .map(|sender| (sender.clone(), self.scroll_locks.contains(sender)))
            .collect()
    }

    pub fn grouping_blocks(&self) -> &GroupingBlocks {
        &self.grouping_blocks
    }

    pub fn block_grouping(&mut self, sender: &str) {
        self.grouping_blocks.block(sender);
    }

    pub fn unblock_grouping(&mut self, sender: &str) {
        self.grouping_blocks.unblock(sender);
    }

    pub fn park(&mut self, parked: ParkedRequest) {
        log::debug!(
            "Parked {} request {} from {:?}",
            parked.request.type_name(),
            parked.id,
            parked.sender
        );
        self.parked.push(parked);
    }

    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    /// Parked requests whose ids are now all known, in arrival order
    pub fn take_ready(&mut self, registry: &TabRegistry) -> Vec<ParkedRequest> {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.parked)
            .into_iter()
            .partition(|parked| missing_ids(registry, &parked.request).is_empty());
        self.parked = waiting;
        ready
    }

    /// Parked requests that waited long enough; they run with what exists
    pub fn take_expired(&mut self, now: Instant) -> Vec<ParkedRequest> {
        let (expired, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.parked)
            .into_iter()
            .partition(|parked| parked.deadline <= now);
        self.parked = waiting;
        for parked in &expired {
            log::warn!(
                "Request {} ({}) timed out waiting for tabs",
                parked.id,
                parked.request.type_name()
            );
        }
        expired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.parked.iter().map(|parked| parked.deadline).min()
    }
}

/// Decode a request from its JSON wire form
pub fn parse_request(json: &str) -> Result<ExternalRequest, GatewayError> {
    serde_json::from_str(json).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
}

/// Encode a response for the wire
pub fn encode_response(response: &ExternalResponse) -> Result<String, GatewayError> {
    serde_json::to_string(response).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
}

/// Ids a request references that the registry does not know
pub fn missing_ids(registry: &TabRegistry, request: &ExternalRequest) -> Vec<TabId> {
    request
        .referenced_ids()
        .into_iter()
        .filter(|&id| !registry.contains(id))
        .collect()
}

/// Resolve a target description to tab ids.
///
/// * `tabs: [..]`: those ids
/// * `tab: <id>`: that tab
/// * `window` with `tab: "*"`: every tab of the window
/// * `window` otherwise (including `tabs: "*"`): the window's root tabs
/// * `"*"` without a window: every tab of the last focused window
pub fn resolve_targets(registry: &TabRegistry, target: &TargetSpec) -> Vec<TabId> {
    if let Some(TabsRef::Ids(ids)) = &target.tabs {
        return ids
            .iter()
            .copied()
            .filter(|&id| registry.contains(id))
            .collect();
    }
    if let Some(TabRef::Id(id)) = target.tab {
        return if registry.contains(id) { vec![id] } else { Vec::new() };
    }
    match target.window {
        Some(window) if target.tab_is_wildcard() => registry.normal_tabs(window),
        Some(window) => registry.root_tabs(window),
        None if target.any_wildcard() => registry
            .last_focused_window()
            .map(|window| registry.normal_tabs(window))
            .unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Serialize one tab with its nested children
pub fn serialize_tab(registry: &TabRegistry, tab: TabId) -> Option<SerializedTab> {
    let node = registry.get(tab)?;
    let mut states: Vec<String> = node.states.iter().cloned().collect();
    if node.is_group() && !node.states.contains(GROUP_TAB_STATE) {
        states.push(GROUP_TAB_STATE.to_string());
    }
    Some(SerializedTab {
        id: node.id,
        window_id: node.window,
        index: registry.index_of(tab)?,
        url: node.url.clone(),
        title: node.title.clone(),
        pinned: node.pinned,
        active: node.active,
        indent: tree::level(registry, tab),
        collapsed: node.collapsed(),
        hidden: tree::is_hidden(registry, tab),
        states,
        ancestor_tab_ids: tree::ancestors(registry, tab),
        children: node
            .children()
            .iter()
            .filter_map(|&child| serialize_tab(registry, child))
            .collect(),
    })
}

/// Shape a `get-tree` answer: a single tab for `tab: <id>`, a list otherwise
pub fn format_tabs(registry: &TabRegistry, target: &TargetSpec, tabs: &[TabId]) -> ExternalResponse {
    if let Some(TabRef::Id(_)) = target.tab
        && target.tabs.is_none()
    {
        return tabs
            .first()
            .and_then(|&tab| serialize_tab(registry, tab))
            .map(|tab| ExternalResponse::Tab(Box::new(tab)))
            .unwrap_or(ExternalResponse::Missing);
    }
    ExternalResponse::Tabs(
        tabs.iter()
            .filter_map(|&tab| serialize_tab(registry, tab))
            .collect(),
    )
}
