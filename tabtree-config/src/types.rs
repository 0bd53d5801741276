//! Configuration types and enums.

use serde::{Deserialize, Serialize};

/// Unique identifier for a tab, assigned by the host (session scoped)
pub type TabId = u64;

/// Unique identifier for a host window
pub type WindowId = u64;

// ============================================================================
// Auto-Attach Types
// ============================================================================

/// How a newly opened tab is placed relative to its base tab
/// (the opener, the active tab, or the duplication source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NewTabBehavior {
    /// Leave the tab wherever the host put it
    DoNothing,
    /// Open as an unparented root tab
    Orphan,
    /// Open as a child of the base tab
    #[default]
    Child,
    /// Open as a sibling after the base tab's parent subtree
    Sibling,
    /// Open as the next sibling immediately after the base tab's subtree
    NextSibling,
}

impl NewTabBehavior {
    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            NewTabBehavior::DoNothing => "Do nothing",
            NewTabBehavior::Orphan => "Open as orphan",
            NewTabBehavior::Child => "Open as child",
            NewTabBehavior::Sibling => "Open as sibling",
            NewTabBehavior::NextSibling => "Open as next sibling",
        }
    }

    /// All available behaviors for UI iteration
    pub fn all() -> &'static [NewTabBehavior] {
        &[
            NewTabBehavior::DoNothing,
            NewTabBehavior::Orphan,
            NewTabBehavior::Child,
            NewTabBehavior::Sibling,
            NewTabBehavior::NextSibling,
        ]
    }
}

/// Where a newly attached child is inserted among its siblings when no
/// explicit neighbour is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InsertPosition {
    /// Before the first existing child
    First,
    /// After the last existing child
    #[default]
    End,
    /// Next to the sibling closest to the child's current flat index
    Nearest,
    /// The caller controls placement; the store inserts at the end and never moves
    NoControl,
}

/// Where tabs opened from a pinned tab are moved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PinnedInsertPosition {
    /// Right after the last pinned tab
    First,
    /// At the end of the window
    #[default]
    End,
    /// Leave them where the host opened them
    NoControl,
}

// ============================================================================
// Close / Detach Types
// ============================================================================

/// What happens to a parent's children when the parent is closed, pinned,
/// or moved away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CloseParentBehavior {
    /// Close the whole subtree together with the parent
    CloseAllChildren,
    /// First child takes the parent's place, siblings become its children
    #[default]
    PromoteFirstChild,
    /// All children move up one level (to the grandparent)
    PromoteAllChildren,
    /// A synthetic group tab takes the parent's place and adopts the children
    ReplaceWithGroupTab,
    /// All children become roots
    DetachAllChildren,
}

impl CloseParentBehavior {
    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            CloseParentBehavior::CloseAllChildren => "Close all children",
            CloseParentBehavior::PromoteFirstChild => "Promote first child",
            CloseParentBehavior::PromoteAllChildren => "Promote all children",
            CloseParentBehavior::ReplaceWithGroupTab => "Replace with group tab",
            CloseParentBehavior::DetachAllChildren => "Detach all children",
        }
    }
}

/// When tree behaviors apply to changes made outside the tree view
/// (closing a parent from the host UI, dragging between windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TreeBehaviorScope {
    /// Always treat the subtree as a unit
    #[default]
    Always,
    /// Only while the tree view is visible in the window
    OnlyWhenVisible,
    /// Only for operations initiated from the tree view itself
    OnlyOnTreeView,
}

/// When a temporary group tab is closed automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupTabCleanup {
    /// Keep group tabs regardless of their children
    Never,
    /// Close once no children remain
    WhenEmpty,
    /// Close once one or zero children remain
    #[default]
    WhenSingleChild,
}

impl GroupTabCleanup {
    /// Largest remaining child count at which a temporary group tab is discarded
    pub fn threshold(self) -> Option<usize> {
        match self {
            GroupTabCleanup::Never => None,
            GroupTabCleanup::WhenEmpty => Some(0),
            GroupTabCleanup::WhenSingleChild => Some(1),
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Log level for the engine's logger.
///
/// The `RUST_LOG` environment variable takes precedence where a logger
/// implementation honours it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No logging
    Off,
    /// Errors only
    Error,
    /// Warnings and errors
    #[default]
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Most verbose
    Trace,
}

impl LogLevel {
    /// Convert to `log::LevelFilter`
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}
