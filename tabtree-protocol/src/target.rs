//! Target-tab selectors used by external requests.
//!
//! Collaborators address tabs with an explicit id, an id list, or the `"*"`
//! wildcard, optionally scoped to a window.

use serde::{Deserialize, Serialize};
use tabtree_config::{TabId, WindowId};

const WILDCARD: &str = "*";

/// A single tab id or the `"*"` wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRef", into = "RawRef")]
pub enum TabRef {
    /// Every tab in scope
    All,
    /// One specific tab
    Id(TabId),
}

/// A tab id list or the `"*"` wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRefs", into = "RawRefs")]
pub enum TabsRef {
    /// Every tab in scope
    All,
    /// An explicit list of tabs
    Ids(Vec<TabId>),
}

/// Wire form shared by both selectors: a number or a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawRef {
    Id(TabId),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawRefs {
    Ids(Vec<TabId>),
    Text(String),
}

impl TryFrom<RawRef> for TabRef {
    type Error = String;

    fn try_from(raw: RawRef) -> Result<Self, Self::Error> {
        match raw {
            RawRef::Id(id) => Ok(TabRef::Id(id)),
            RawRef::Text(text) if text == WILDCARD => Ok(TabRef::All),
            RawRef::Text(text) => text
                .parse::<TabId>()
                .map(TabRef::Id)
                .map_err(|_| format!("invalid tab reference {text:?}")),
        }
    }
}

impl From<TabRef> for RawRef {
    fn from(value: TabRef) -> Self {
        match value {
            TabRef::All => RawRef::Text(WILDCARD.to_string()),
            TabRef::Id(id) => RawRef::Id(id),
        }
    }
}

impl TryFrom<RawRefs> for TabsRef {
    type Error = String;

    fn try_from(raw: RawRefs) -> Result<Self, Self::Error> {
        match raw {
            RawRefs::Ids(ids) => Ok(TabsRef::Ids(ids)),
            RawRefs::Text(text) if text == WILDCARD => Ok(TabsRef::All),
            RawRefs::Text(text) => Err(format!("invalid tab list {text:?}")),
        }
    }
}

impl From<TabsRef> for RawRefs {
    fn from(value: TabsRef) -> Self {
        match value {
            TabsRef::All => RawRefs::Text(WILDCARD.to_string()),
            TabsRef::Ids(ids) => RawRefs::Ids(ids),
        }
    }
}

/// Target selection fields shared by the tree requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Single tab or `"*"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<TabRef>,
    /// Tab list or `"*"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabs: Option<TabsRef>,
    /// Window scope
    #[serde(default, alias = "windowId", skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowId>,
}

impl TargetSpec {
    /// Target one tab
    pub fn tab(id: TabId) -> Self {
        Self {
            tab: Some(TabRef::Id(id)),
            ..Self::default()
        }
    }

    /// Target an explicit list of tabs
    pub fn tabs(ids: Vec<TabId>) -> Self {
        Self {
            tabs: Some(TabsRef::Ids(ids)),
            ..Self::default()
        }
    }

    /// Target a window's tabs; `all` selects every tab instead of only roots
    pub fn window(window: WindowId, all: bool) -> Self {
        Self {
            tab: all.then_some(TabRef::All),
            window: Some(window),
            ..Self::default()
        }
    }

    /// True when the `tab` field carries the wildcard
    pub fn tab_is_wildcard(&self) -> bool {
        matches!(self.tab, Some(TabRef::All))
    }

    /// True when either selector carries the wildcard
    pub fn any_wildcard(&self) -> bool {
        self.tab_is_wildcard() || matches!(self.tabs, Some(TabsRef::All))
    }

    /// Explicit ids named by this selector (the ones that must be registered
    /// before the request can be resolved)
    pub fn referenced_ids(&self) -> Vec<TabId> {
        let mut ids = Vec::new();
        if let Some(TabsRef::Ids(list)) = &self.tabs {
            ids.extend(list.iter().copied());
        }
        if let Some(TabRef::Id(id)) = self.tab {
            ids.push(id);
        }
        ids
    }
}
