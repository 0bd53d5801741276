//! Index-independent tree structure representation.
//!
//! Entries are keyed by persistent id, so a structure captured in one session
//! can be re-applied to the same tabs after the host reassigns session ids.

use serde::{Deserialize, Serialize};

/// Identifier stable across session save/restore (distinct from the host's
/// ephemeral tab id)
pub type PersistentId = uuid::Uuid;

/// One tab's place in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStructureEntry {
    /// Persistent id of the tab this entry describes
    pub id: PersistentId,
    /// Persistent id of the parent, if the parent is part of the same structure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<PersistentId>,
    /// Ordered child persistent ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PersistentId>,
    /// Own collapsed flag
    #[serde(default)]
    pub collapsed: bool,
}

/// Serialized parent/children/collapsed shape, entries in flat order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeStructure {
    pub entries: Vec<TreeStructureEntry>,
}

impl TreeStructure {
    pub fn new(entries: Vec<TreeStructureEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by persistent id
    pub fn entry(&self, id: &PersistentId) -> Option<&TreeStructureEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    /// Persistent ids in flat order
    pub fn ids(&self) -> Vec<PersistentId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }
}
