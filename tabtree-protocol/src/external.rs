//! Request/response types for third-party collaborators.
//!
//! Every request carries a `type` discriminant (`"register-self"`,
//! `"get-tree"`, ...). The sender's identity travels next to the request, not
//! inside it, so holds can be keyed by it.

use crate::structure::TreeStructure;
use crate::target::TargetSpec;
use serde::{Deserialize, Serialize};
use tabtree_config::{TabId, WindowId};

/// A request from an external collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExternalRequest {
    /// Register the sender as a collaborator.
    #[serde(rename_all = "camelCase")]
    RegisterSelf {
        /// Human readable name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Notification types the collaborator wants to receive
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        listening_types: Vec<String>,
    },

    /// Unregister the sender; drops every hold it owns.
    UnregisterSelf {},

    /// Liveness check.
    Ping {},

    /// Serialized tabs (with nested children) for the resolved targets.
    GetTree {
        #[serde(flatten)]
        target: TargetSpec,
    },

    /// Tree structure for the resolved targets.
    GetTreeStructure {
        #[serde(flatten)]
        target: TargetSpec,
    },

    /// Apply a tree structure to the resolved targets.
    SetTreeStructure {
        #[serde(flatten)]
        target: TargetSpec,
        structure: TreeStructure,
    },

    /// Collapse the subtrees of the resolved targets.
    CollapseTree {
        #[serde(flatten)]
        target: TargetSpec,
    },

    /// Expand the subtrees of the resolved targets.
    ExpandTree {
        #[serde(flatten)]
        target: TargetSpec,
    },

    /// Attach `child` under `parent`.
    #[serde(rename_all = "camelCase")]
    Attach {
        child: TabId,
        parent: TabId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert_before: Option<TabId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert_after: Option<TabId>,
    },

    /// Detach `tab` from its parent.
    Detach { tab: TabId },

    /// Add state tags to the resolved targets.
    AddTabState {
        #[serde(flatten)]
        target: TargetSpec,
        #[serde(alias = "state")]
        states: StateList,
    },

    /// Remove state tags from the resolved targets.
    RemoveTabState {
        #[serde(flatten)]
        target: TargetSpec,
        #[serde(alias = "state")]
        states: StateList,
    },

    /// Acquire the sender's scroll lock.
    ScrollLock {},

    /// Release the sender's scroll lock.
    ScrollUnlock {},

    /// Acquire the sender's grouping block.
    BlockGrouping {},

    /// Release the sender's grouping block.
    UnblockGrouping {},
}

impl ExternalRequest {
    /// The `type` discriminant as it appears on the wire
    pub fn type_name(&self) -> &'static str {
        match self {
            ExternalRequest::RegisterSelf { .. } => "register-self",
            ExternalRequest::UnregisterSelf {} => "unregister-self",
            ExternalRequest::Ping {} => "ping",
            ExternalRequest::GetTree { .. } => "get-tree",
            ExternalRequest::GetTreeStructure { .. } => "get-tree-structure",
            ExternalRequest::SetTreeStructure { .. } => "set-tree-structure",
            ExternalRequest::CollapseTree { .. } => "collapse-tree",
            ExternalRequest::ExpandTree { .. } => "expand-tree",
            ExternalRequest::Attach { .. } => "attach",
            ExternalRequest::Detach { .. } => "detach",
            ExternalRequest::AddTabState { .. } => "add-tab-state",
            ExternalRequest::RemoveTabState { .. } => "remove-tab-state",
            ExternalRequest::ScrollLock {} => "scroll-lock",
            ExternalRequest::ScrollUnlock {} => "scroll-unlock",
            ExternalRequest::BlockGrouping {} => "block-grouping",
            ExternalRequest::UnblockGrouping {} => "unblock-grouping",
        }
    }

    /// Tab ids that must be registered before this request can run
    pub fn referenced_ids(&self) -> Vec<TabId> {
        match self {
            ExternalRequest::GetTree { target }
            | ExternalRequest::GetTreeStructure { target }
            | ExternalRequest::SetTreeStructure { target, .. }
            | ExternalRequest::CollapseTree { target }
            | ExternalRequest::ExpandTree { target }
            | ExternalRequest::AddTabState { target, .. }
            | ExternalRequest::RemoveTabState { target, .. } => target.referenced_ids(),
            ExternalRequest::Attach {
                child,
                parent,
                insert_before,
                insert_after,
            } => {
                let mut ids = vec![*child, *parent];
                ids.extend(insert_before.iter().chain(insert_after.iter()).copied());
                ids
            }
            ExternalRequest::Detach { tab } => vec![*tab],
            _ => Vec::new(),
        }
    }
}

/// One state tag or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateList {
    One(String),
    Many(Vec<String>),
}

impl StateList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StateList::One(state) => vec![state],
            StateList::Many(states) => states,
        }
    }
}

/// A tab as exposed to collaborators, with its subtree nested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedTab {
    pub id: TabId,
    pub window_id: WindowId,
    pub index: usize,
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    pub pinned: bool,
    pub active: bool,
    /// Depth in the tree (0 for roots)
    pub indent: usize,
    /// Own collapsed flag
    pub collapsed: bool,
    /// Hidden because an ancestor is collapsed
    pub hidden: bool,
    /// State tags, including the built-in `group-tab` marker
    #[serde(default)]
    pub states: Vec<String>,
    /// Ancestors, nearest first
    #[serde(default)]
    pub ancestor_tab_ids: Vec<TabId>,
    #[serde(default)]
    pub children: Vec<SerializedTab>,
}

/// A response to an [`ExternalRequest`].
///
/// Untagged: collaborators get a bare `true`, a tab object, a tab list, a
/// structure array, or `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalResponse {
    Ack(bool),
    Tab(Box<SerializedTab>),
    Tabs(Vec<SerializedTab>),
    Structure(TreeStructure),
    Missing,
}

impl ExternalResponse {
    pub fn is_success(&self) -> bool {
        !matches!(self, ExternalResponse::Ack(false) | ExternalResponse::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{TabRef, TabsRef};

    #[test]
    fn test_request_type_names_match_wire() {
        let requests = vec![
            ExternalRequest::Ping {},
            ExternalRequest::Detach { tab: 3 },
            ExternalRequest::BlockGrouping {},
            ExternalRequest::GetTree {
                target: TargetSpec::tab(1),
            },
        ];
        for request in requests {
            let json = serde_json::to_value(&request).unwrap();
            assert_eq!(json["type"], request.type_name());
        }
    }

    #[test]
    fn test_get_tree_with_wildcard_window() {
        let request: ExternalRequest =
            serde_json::from_str(r#"{"type":"get-tree","tabs":"*","window":2}"#).unwrap();
        match request {
            ExternalRequest::GetTree { target } => {
                assert_eq!(target.tabs, Some(TabsRef::All));
                assert_eq!(target.window, Some(2));
                assert_eq!(target.tab, None);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_attach_uses_camel_case_fields() {
        let request: ExternalRequest = serde_json::from_str(
            r#"{"type":"attach","child":5,"parent":2,"insertBefore":9}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            ExternalRequest::Attach {
                child: 5,
                parent: 2,
                insert_before: Some(9),
                insert_after: None,
            }
        );
        assert_eq!(request.referenced_ids(), vec![5, 2, 9]);
    }

    #[test]
    fn test_add_tab_state_accepts_single_state() {
        let request: ExternalRequest =
            serde_json::from_str(r#"{"type":"add-tab-state","tab":4,"state":"marked"}"#).unwrap();
        match request {
            ExternalRequest::AddTabState { target, states } => {
                assert_eq!(target.tab, Some(TabRef::Id(4)));
                assert_eq!(states.into_vec(), vec!["marked".to_string()]);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_register_self_defaults() {
        let request: ExternalRequest =
            serde_json::from_str(r#"{"type":"register-self"}"#).unwrap();
        assert_eq!(
            request,
            ExternalRequest::RegisterSelf {
                name: None,
                listening_types: Vec::new(),
            }
        );
    }

    #[test]
    fn test_response_shapes() {
        assert_eq!(
            serde_json::to_value(ExternalResponse::Ack(true)).unwrap(),
            serde_json::json!(true)
        );
        assert_eq!(
            serde_json::to_value(ExternalResponse::Missing).unwrap(),
            serde_json::Value::Null
        );
        assert!(!ExternalResponse::Ack(false).is_success());
    }
}
