//! Messages from the engine's own presentation layer.

use crate::notification::CollapseCause;
use crate::structure::TreeStructure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tabtree_config::{TabId, WindowId};

/// A request or fire-and-forget notice from the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InternalMessage {
    /// Current tree structure of a window.
    PullTreeStructure { window: WindowId },

    /// Collapse or expand one tab's subtree.
    ChangeSubtreeCollapsedState {
        tab: TabId,
        collapsed: bool,
        #[serde(default)]
        cause: CollapseCause,
    },

    /// Move tabs (with their subtrees) next to an anchor.
    #[serde(rename_all = "camelCase")]
    MoveTabs {
        tabs: Vec<TabId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert_before: Option<TabId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert_after: Option<TabId>,
    },

    /// Move tabs before `next_tab`.
    #[serde(rename_all = "camelCase")]
    MoveTabsBefore { tabs: Vec<TabId>, next_tab: TabId },

    /// Move tabs after `previous_tab`.
    #[serde(rename_all = "camelCase")]
    MoveTabsAfter { tabs: Vec<TabId>, previous_tab: TabId },

    /// Attach `child` under `parent`, moving it into place.
    #[serde(rename_all = "camelCase")]
    AttachTabTo {
        child: TabId,
        parent: TabId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert_before: Option<TabId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert_after: Option<TabId>,
        #[serde(default)]
        force_expand: bool,
    },

    /// Detach a tab from its parent.
    DetachTab { tab: TabId },

    /// A rapid tab-switch gesture started.
    NotifyStartTabSwitch {},

    /// A rapid tab-switch gesture ended.
    NotifyEndTabSwitch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window: Option<WindowId>,
    },

    /// Open tabs, optionally as children of `parent`.
    #[serde(rename_all = "camelCase")]
    NewTabs {
        urls: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window: Option<WindowId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<TabId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert_before: Option<TabId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert_after: Option<TabId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partition: Option<String>,
    },

    /// Registered collaborators and their registrations.
    RequestRegisteredCollaborators {},

    /// Replace the registered collaborator list (used when restoring state).
    ReplaceRegisteredCollaborators {
        collaborators: BTreeMap<String, CollaboratorInfo>,
    },

    /// Which collaborators currently hold a scroll lock.
    RequestScrollLockState {},

    /// The tree view of a window was shown or hidden.
    TreeViewVisibility { window: WindowId, visible: bool },
}

impl InternalMessage {
    /// Tab ids that must be registered before this message can run
    pub fn referenced_ids(&self) -> Vec<TabId> {
        match self {
            InternalMessage::ChangeSubtreeCollapsedState { tab, .. }
            | InternalMessage::DetachTab { tab } => vec![*tab],
            InternalMessage::MoveTabs {
                tabs,
                insert_before,
                insert_after,
            } => tabs
                .iter()
                .chain(insert_before.iter())
                .chain(insert_after.iter())
                .copied()
                .collect(),
            InternalMessage::MoveTabsBefore { tabs, next_tab: anchor }
            | InternalMessage::MoveTabsAfter {
                tabs,
                previous_tab: anchor,
            } => tabs.iter().chain(std::iter::once(anchor)).copied().collect(),
            InternalMessage::AttachTabTo {
                child,
                parent,
                insert_before,
                insert_after,
                ..
            } => {
                let mut ids = vec![*child, *parent];
                ids.extend(insert_before.iter().chain(insert_after.iter()).copied());
                ids
            }
            InternalMessage::NewTabs {
                parent,
                insert_before,
                insert_after,
                ..
            } => parent
                .iter()
                .chain(insert_before.iter())
                .chain(insert_after.iter())
                .copied()
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// What a collaborator told us when it registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listening_types: Vec<String>,
}

/// A response to an [`InternalMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InternalResponse {
    Ack(bool),
    Structure { structure: TreeStructure },
    /// Ids of tabs moved or opened, in order
    Tabs(Vec<TabId>),
    Collaborators(BTreeMap<String, CollaboratorInfo>),
    ScrollLocks(BTreeMap<String, bool>),
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_message_defaults_to_automatic() {
        let message: InternalMessage = serde_json::from_str(
            r#"{"type":"change-subtree-collapsed-state","tab":3,"collapsed":true}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            InternalMessage::ChangeSubtreeCollapsedState {
                tab: 3,
                collapsed: true,
                cause: CollapseCause::Automatic,
            }
        );
    }

    #[test]
    fn test_move_tabs_before_references_anchor() {
        let message: InternalMessage = serde_json::from_str(
            r#"{"type":"move-tabs-before","tabs":[1,2],"nextTab":7}"#,
        )
        .unwrap();
        assert_eq!(message.referenced_ids(), vec![1, 2, 7]);
    }

    #[test]
    fn test_new_tabs_roundtrip_fields() {
        let message = InternalMessage::NewTabs {
            urls: vec!["https://example.com/".to_string()],
            window: Some(1),
            parent: Some(4),
            insert_before: None,
            insert_after: None,
            partition: None,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "new-tabs");
        assert_eq!(json["parent"], 4);
        assert!(json.get("insertBefore").is_none());
    }

    #[test]
    fn test_structure_response_shape() {
        let response = InternalResponse::Structure {
            structure: TreeStructure::default(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["structure"].is_array());
    }
}
