//! Engine configuration: struct definition, defaults, persistence, validation.

use crate::error::ConfigError;
use crate::types::{
    CloseParentBehavior, GroupTabCleanup, InsertPosition, LogLevel, NewTabBehavior,
    PinnedInsertPosition, TreeBehaviorScope,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the tree reconciliation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // ========================================================================
    // Auto-Attach
    // ========================================================================
    /// Master switch for attaching newly opened tabs to their opener
    #[serde(default = "crate::defaults::bool_true")]
    pub auto_attach: bool,

    /// Placement of tabs opened with an opener (links, scripts)
    #[serde(default = "crate::defaults::auto_attach_on_opened_with_owner")]
    pub auto_attach_on_opened_with_owner: NewTabBehavior,

    /// Placement of tabs opened by the host's "new tab" command, relative to the active tab
    #[serde(default = "crate::defaults::auto_attach_on_new_tab_command")]
    pub auto_attach_on_new_tab_command: NewTabBehavior,

    /// Placement of duplicated tabs, relative to the original
    #[serde(default = "crate::defaults::auto_attach_on_duplicated")]
    pub auto_attach_on_duplicated: NewTabBehavior,

    /// Sibling position for new children when no explicit neighbour is given
    #[serde(default = "crate::defaults::insert_new_child_at")]
    pub insert_new_child_at: InsertPosition,

    /// Where tabs opened from a pinned tab are moved to
    #[serde(default = "crate::defaults::insert_new_tab_from_pinned_tab_at")]
    pub insert_new_tab_from_pinned_tab_at: PinnedInsertPosition,

    /// Reopen new-tab-command children in their parent's partition
    #[serde(default = "crate::defaults::bool_false")]
    pub inherit_contextual_identity_to_new_child_tab: bool,

    /// Partition identity the host assigns when none is requested
    #[serde(default = "crate::defaults::default_partition")]
    pub default_partition: String,

    /// URLs that identify a tab opened by the host's "new tab" command
    #[serde(default = "crate::defaults::new_tab_urls")]
    pub new_tab_urls: Vec<String>,

    /// Keep the host's opener field in sync with the tree parent
    #[serde(default = "crate::defaults::bool_true")]
    pub sync_parent_tab_and_opener_tab: bool,

    // ========================================================================
    // Burst Grouping
    // ========================================================================
    /// Group bursts of tabs opened without an opener under a synthetic group tab
    #[serde(default = "crate::defaults::bool_true")]
    pub auto_group_new_tabs: bool,

    /// Group tabs opened from the same pinned tab under a synthetic group tab
    #[serde(default = "crate::defaults::bool_true")]
    pub auto_group_new_tabs_from_pinned: bool,

    /// Debounce window for burst detection, in milliseconds
    #[serde(default = "crate::defaults::auto_group_new_tabs_timeout_ms")]
    pub auto_group_new_tabs_timeout_ms: u64,

    /// URL prefix identifying synthetic group tabs
    #[serde(default = "crate::defaults::group_tab_url_prefix")]
    pub group_tab_url_prefix: String,

    /// When temporary group tabs are discarded
    #[serde(default = "crate::defaults::group_tab_cleanup")]
    pub group_tab_cleanup: GroupTabCleanup,

    // ========================================================================
    // Close / Detach
    // ========================================================================
    /// What happens to children when their parent closes
    #[serde(default = "crate::defaults::close_parent_behavior")]
    pub close_parent_behavior: CloseParentBehavior,

    /// Promote all children when the closed parent was itself an only child
    #[serde(default = "crate::defaults::bool_true")]
    pub promote_all_children_when_closed_parent_is_last_child: bool,

    /// When tree behaviors apply to changes made outside the tree view
    #[serde(default)]
    pub parent_tab_behavior_for_changes: TreeBehaviorScope,

    /// Move detached children to the end of the window instead of after the old root
    #[serde(default = "crate::defaults::bool_false")]
    pub move_tabs_to_bottom_when_detached_from_closed_parent: bool,

    // ========================================================================
    // Collapse / Expand
    // ========================================================================
    /// Expand a subtree when its parent is focused, collapse it otherwise
    #[serde(default = "crate::defaults::bool_true")]
    pub auto_collapse_expand_subtree_on_select: bool,

    /// Expand the parent when a child is attached to a new tree
    #[serde(default = "crate::defaults::bool_true")]
    pub auto_collapse_expand_subtree_on_attach: bool,

    /// Collapse sibling subtrees when expanding one (mutual exclusion)
    #[serde(default = "crate::defaults::bool_true")]
    pub auto_expand_intelligently: bool,

    /// Expand ancestors when a hidden descendant gains focus
    #[serde(default = "crate::defaults::bool_true")]
    pub auto_expand_on_collapsed_child_focused: bool,

    /// Skip hidden tabs while the user cycles tabs with a shortcut
    #[serde(default = "crate::defaults::bool_false")]
    pub skip_collapsed_tabs_for_tab_switching_shortcuts: bool,

    // ========================================================================
    // Position Classifier
    // ========================================================================
    /// Minimum index delta at which a move of the active tab is treated as a
    /// deliberate drag rather than a nudge
    #[serde(default = "crate::defaults::drag_reparent_delta_threshold")]
    pub drag_reparent_delta_threshold: usize,

    // ========================================================================
    // Persistence
    // ========================================================================
    /// Restore the tree from the cached structure when a window is restored
    #[serde(default = "crate::defaults::bool_true")]
    pub use_cached_tree: bool,

    /// Debounce before writing the tree cache after structural changes, in milliseconds
    #[serde(default = "crate::defaults::tree_cache_save_delay_ms")]
    pub tree_cache_save_delay_ms: u64,

    // ========================================================================
    // External Control Gateway
    // ========================================================================
    /// How long a request waits for referenced tabs to be registered, in milliseconds
    #[serde(default = "crate::defaults::tab_registration_timeout_ms")]
    pub tab_registration_timeout_ms: u64,

    /// Collaborator ids remembered across restarts
    #[serde(default)]
    pub cached_external_collaborators: Vec<String>,

    // ========================================================================
    // Debug Logging
    // ========================================================================
    /// Log verbosity
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_attach: crate::defaults::bool_true(),
            auto_attach_on_opened_with_owner: crate::defaults::auto_attach_on_opened_with_owner(),
            auto_attach_on_new_tab_command: crate::defaults::auto_attach_on_new_tab_command(),
            auto_attach_on_duplicated: crate::defaults::auto_attach_on_duplicated(),
            insert_new_child_at: crate::defaults::insert_new_child_at(),
            insert_new_tab_from_pinned_tab_at: crate::defaults::insert_new_tab_from_pinned_tab_at(
            ),
            inherit_contextual_identity_to_new_child_tab: crate::defaults::bool_false(),
            default_partition: crate::defaults::default_partition(),
            new_tab_urls: crate::defaults::new_tab_urls(),
            sync_parent_tab_and_opener_tab: crate::defaults::bool_true(),
            auto_group_new_tabs: crate::defaults::bool_true(),
            auto_group_new_tabs_from_pinned: crate::defaults::bool_true(),
            auto_group_new_tabs_timeout_ms: crate::defaults::auto_group_new_tabs_timeout_ms(),
            group_tab_url_prefix: crate::defaults::group_tab_url_prefix(),
            group_tab_cleanup: crate::defaults::group_tab_cleanup(),
            close_parent_behavior: crate::defaults::close_parent_behavior(),
            promote_all_children_when_closed_parent_is_last_child: crate::defaults::bool_true(),
            parent_tab_behavior_for_changes: TreeBehaviorScope::default(),
            move_tabs_to_bottom_when_detached_from_closed_parent: crate::defaults::bool_false(),
            auto_collapse_expand_subtree_on_select: crate::defaults::bool_true(),
            auto_collapse_expand_subtree_on_attach: crate::defaults::bool_true(),
            auto_expand_intelligently: crate::defaults::bool_true(),
            auto_expand_on_collapsed_child_focused: crate::defaults::bool_true(),
            skip_collapsed_tabs_for_tab_switching_shortcuts: crate::defaults::bool_false(),
            drag_reparent_delta_threshold: crate::defaults::drag_reparent_delta_threshold(),
            use_cached_tree: crate::defaults::bool_true(),
            tree_cache_save_delay_ms: crate::defaults::tree_cache_save_delay_ms(),
            tab_registration_timeout_ms: crate::defaults::tab_registration_timeout_ms(),
            cached_external_collaborators: Vec::new(),
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default path, or return defaults if it does not exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, or return defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        log::info!("Config path: {:?}", path);

        if !path.exists() {
            log::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(ConfigError::from)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml_ng::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::from)?;
        }

        let yaml = serde_yaml_ng::to_string(self).map_err(ConfigError::from)?;

        // Atomic save: write to temp file then rename to prevent corruption on crash
        let temp_path = path.with_extension("yaml.tmp");
        fs::write(&temp_path, &yaml).map_err(ConfigError::from)?;
        fs::rename(&temp_path, path).map_err(ConfigError::from)?;

        Ok(())
    }

    /// Get the configuration file path (using XDG convention)
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.yaml")
    }

    /// Get the configuration directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tabtree")
    }

    /// Check semantic constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group_tab_url_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "group_tab_url_prefix must not be empty".to_string(),
            ));
        }
        if self.drag_reparent_delta_threshold == 0 {
            return Err(ConfigError::Validation(
                "drag_reparent_delta_threshold must be at least 1".to_string(),
            ));
        }
        if self.default_partition.is_empty() {
            return Err(ConfigError::Validation(
                "default_partition must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Burst debounce window
    pub fn burst_timeout(&self) -> Duration {
        Duration::from_millis(self.auto_group_new_tabs_timeout_ms)
    }

    /// Tree cache write debounce
    pub fn cache_save_delay(&self) -> Duration {
        Duration::from_millis(self.tree_cache_save_delay_ms)
    }

    /// How long gateway requests wait for unregistered tabs
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.tab_registration_timeout_ms)
    }

    /// Whether a URL is the host's "new tab" page
    pub fn is_new_tab_url(&self, url: &str) -> bool {
        self.new_tab_urls.iter().any(|u| u == url)
    }
}
