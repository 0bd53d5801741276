//! Notifications emitted by the engine for the presentation layer.

use serde::{Deserialize, Serialize};
use tabtree_config::{TabId, WindowId};

/// Who asked for a collapse/expand change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollapseCause {
    /// Direct user action on this tab; never cascades to siblings
    Manual,
    /// Focus handling, attach handling, or a collaborator request
    #[default]
    Automatic,
}

/// A structural change the presentation layer can react to.
///
/// Tagged with `type` for easy JSON dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TreeNotification {
    /// A tab became the child of `parent`.
    Attached {
        tab: TabId,
        parent: TabId,
        window: WindowId,
    },

    /// A tab lost its parent.
    Detached {
        tab: TabId,
        former_parent: TabId,
        /// The presentation layer should keep the old indentation (the tab is
        /// about to disappear)
        preserve_indent: bool,
    },

    /// A tab's own collapsed flag changed.
    CollapsedStateChanged {
        tab: TabId,
        collapsed: bool,
        cause: CollapseCause,
    },

    /// The logical collapse/expand transition for a subtree has finished;
    /// `hidden` lists descendants whose visibility flipped.
    CollapseExpandDone {
        tab: TabId,
        collapsed: bool,
        hidden: Vec<TabId>,
        shown: Vec<TabId>,
    },

    /// State tags were added to or removed from tabs.
    TabStateChanged {
        tabs: Vec<TabId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        added: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        removed: Vec<String>,
    },

    /// Something in the window's tree changed (debounced cache save follows).
    TreeStructureChanged { window: WindowId },

    /// Focus was redirected away from a hidden tab.
    FocusRedirected { from: TabId, to: TabId },
}

impl TreeNotification {
    /// Short kind name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            TreeNotification::Attached { .. } => "attached",
            TreeNotification::Detached { .. } => "detached",
            TreeNotification::CollapsedStateChanged { .. } => "collapsed-state-changed",
            TreeNotification::CollapseExpandDone { .. } => "collapse-expand-done",
            TreeNotification::TabStateChanged { .. } => "tab-state-changed",
            TreeNotification::TreeStructureChanged { .. } => "tree-structure-changed",
            TreeNotification::FocusRedirected { .. } => "focus-redirected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_tagging() {
        let note = TreeNotification::CollapsedStateChanged {
            tab: 4,
            collapsed: true,
            cause: CollapseCause::Manual,
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["type"], "collapsed-state-changed");
        assert_eq!(json["cause"], "manual");
        assert_eq!(note.kind(), "collapsed-state-changed");
    }

    #[test]
    fn test_tab_state_omits_empty_lists() {
        let note = TreeNotification::TabStateChanged {
            tabs: vec![1, 2],
            added: vec!["highlighted".to_string()],
            removed: Vec::new(),
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["added"][0], "highlighted");
        assert!(json.get("removed").is_none());
    }
}
