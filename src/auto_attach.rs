//! Auto-attach policy for newly opened tabs.
//!
//! `decide` is pure: it looks at the new tab, its base tab (opener, active
//! tab, or duplication source) and the configured behavior, and says where
//! the tab belongs. The engine carries the decision out.

use crate::tab::{Placement, TabRegistry};
use crate::tree;
use tabtree_config::{Config, InsertPosition, NewTabBehavior, TabId};

/// Why a tab is being auto-attached; selects the configured behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenKind {
    /// Opened from a link or script in the base tab
    WithOpener,
    /// Opened by the host's "new tab" command; the base is the active tab
    NewTabCommand,
    /// Duplicate of the base tab
    Duplicated,
}

impl OpenKind {
    pub fn behavior(self, config: &Config) -> NewTabBehavior {
        match self {
            OpenKind::WithOpener => config.auto_attach_on_opened_with_owner,
            OpenKind::NewTabCommand => config.auto_attach_on_new_tab_command,
            OpenKind::Duplicated => config.auto_attach_on_duplicated,
        }
    }
}

/// Where a new tab goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoAttachDecision {
    /// Leave it alone
    Keep,
    Attach {
        parent: TabId,
        insert_before: Option<TabId>,
        insert_after: Option<TabId>,
        insert_at: InsertPosition,
    },
    /// Keep it a root, moved next to an anchor
    Root { placement: Option<Placement> },
    /// Opener is pinned in the same window: burst grouping positions it
    DeferToPinnedOpener { opener: TabId },
    /// Reopen the tab in `partition` under `parent`, then close the proxy
    ReopenInPartition { parent: TabId, partition: String },
}

/// Decide where `tab` goes relative to `base`.
pub fn decide(
    registry: &TabRegistry,
    tab: TabId,
    base: TabId,
    kind: OpenKind,
    config: &Config,
) -> AutoAttachDecision {
    let (Some(node), Some(base_node)) = (registry.get(tab), registry.get(base)) else {
        return AutoAttachDecision::Keep;
    };
    if tab == base || node.window != base_node.window {
        return AutoAttachDecision::Keep;
    }
    if kind == OpenKind::WithOpener && base_node.pinned {
        return AutoAttachDecision::DeferToPinnedOpener { opener: base };
    }

    let window = node.window;
    let last_other = || {
        registry
            .normal_tabs(window)
            .into_iter()
            .rev()
            .find(|&t| t != tab)
    };

    let decision = match kind.behavior(config) {
        NewTabBehavior::DoNothing => AutoAttachDecision::Keep,
        NewTabBehavior::Orphan => AutoAttachDecision::Root {
            placement: last_other().map(Placement::After),
        },
        NewTabBehavior::Child if base_node.pinned => AutoAttachDecision::Keep,
        NewTabBehavior::Child => AutoAttachDecision::Attach {
            parent: base,
            insert_before: None,
            insert_after: None,
            insert_at: config.insert_new_child_at,
        },
        NewTabBehavior::Sibling => match base_node.parent() {
            Some(parent) => AutoAttachDecision::Attach {
                parent,
                insert_before: None,
                insert_after: None,
                insert_at: config.insert_new_child_at,
            },
            None => AutoAttachDecision::Root {
                placement: last_other().map(Placement::After),
            },
        },
        NewTabBehavior::NextSibling => {
            let after = tree::last_descendant(registry, base).unwrap_or(base);
            match base_node.parent() {
                Some(parent) => AutoAttachDecision::Attach {
                    parent,
                    insert_before: tree::next_sibling(registry, base),
                    insert_after: Some(after),
                    insert_at: config.insert_new_child_at,
                },
                None => AutoAttachDecision::Root {
                    placement: (after != tab).then_some(Placement::After(after)),
                },
            }
        }
    };

    if let AutoAttachDecision::Attach { parent, .. } = decision
        && kind == OpenKind::NewTabCommand
        && config.inherit_contextual_identity_to_new_child_tab
        && node.partition == config.default_partition
        && let Some(parent_node) = registry.get(parent)
        && parent_node.partition != node.partition
    {
        return AutoAttachDecision::ReopenInPartition {
            parent,
            partition: parent_node.partition.clone(),
        };
    }
    crate::debug_info!(
        "ATTACH",
        "tab {} ({:?} from {}): {:?}",
        tab,
        kind,
        base,
        decision
    );
    decision
}
