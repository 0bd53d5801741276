//! Tab nodes and the per-window registry
//!
//! This module provides the flat-order side of the engine:
//! - `TabNode`: one host tab plus its tree links and derived state
//! - `TabRegistry`: id lookup and per-window ordered tab lists
//! - `WindowTabs`: a window's order vector and its in-flight counters

mod registry;

pub use registry::{Neighbors, TabRegistry, WindowTabs};

use crate::group_tab::GroupTabUrl;
use crate::host::HostTab;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tabtree_config::{TabId, WindowId};

pub use tabtree_protocol::PersistentId;

/// Where a block of tabs goes relative to an anchor tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Before(TabId),
    After(TabId),
}

impl Placement {
    pub fn anchor(self) -> TabId {
        match self {
            Placement::Before(id) | Placement::After(id) => id,
        }
    }
}

/// How a tab came to exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOrigin {
    /// Duplicate of another tab (fresh persistent id)
    pub duplicated: bool,
    /// Brought back by session restore
    pub restored: bool,
    /// Opened by the engine itself (group tabs, reopened proxies)
    pub internal: bool,
}

/// One tab as tracked by the engine.
#[derive(Debug, Clone)]
pub struct TabNode {
    pub id: TabId,
    pub persistent_id: PersistentId,
    pub window: WindowId,
    pub pinned: bool,
    pub active: bool,
    pub url: String,
    pub title: String,
    pub partition: String,
    pub opener: Option<TabId>,
    pub origin: OpenOrigin,
    /// Arbitrary state tags set by collaborators
    pub states: BTreeSet<String>,
    /// Parsed from the URL when this is a synthetic group tab
    pub group: Option<GroupTabUrl>,
    /// Closed by the host; kept only while its children are re-homed
    pub removing: bool,
    // Tree links: only the tree store writes these.
    pub(crate) parent: Option<TabId>,
    pub(crate) children: Vec<TabId>,
    pub(crate) collapsed: bool,
    pub(crate) subtree_collapsed: bool,
}

impl TabNode {
    pub(crate) fn from_host(tab: &HostTab, persistent_id: PersistentId, group_prefix: &str) -> Self {
        Self {
            id: tab.id,
            persistent_id,
            window: tab.window,
            pinned: tab.pinned,
            active: tab.active,
            url: tab.url.clone(),
            title: tab.title.clone(),
            partition: tab.partition.clone(),
            opener: tab.opener,
            origin: OpenOrigin {
                duplicated: tab.duplicated_from.is_some(),
                restored: tab.restored,
                internal: false,
            },
            states: BTreeSet::new(),
            group: GroupTabUrl::parse(group_prefix, &tab.url),
            removing: false,
            parent: None,
            children: Vec::new(),
            collapsed: false,
            subtree_collapsed: false,
        }
    }

    pub fn parent(&self) -> Option<TabId> {
        self.parent
    }

    pub fn children(&self) -> &[TabId] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Own collapsed flag
    pub fn collapsed(&self) -> bool {
        self.collapsed
    }

    /// True if this tab or any ancestor is collapsed
    pub fn subtree_collapsed(&self) -> bool {
        self.subtree_collapsed
    }

    pub fn is_group(&self) -> bool {
        self.group.is_some()
    }

    /// A group tab the engine created and may discard
    pub fn is_temporary_group(&self) -> bool {
        self.group.as_ref().is_some_and(|group| group.temporary)
    }

    /// Opened from scratch rather than duplicated or restored
    pub fn is_genuinely_new(&self) -> bool {
        !self.origin.duplicated && !self.origin.restored
    }
}
