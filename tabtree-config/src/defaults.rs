//! Default value functions for configuration.
//!
//! Each function is used as a `#[serde(default = "crate::defaults::...")]`
//! attribute on a `Config` field.

use crate::types::{
    CloseParentBehavior, GroupTabCleanup, InsertPosition, NewTabBehavior, PinnedInsertPosition,
};

// ── Primitive helpers ──────────────────────────────────────────────────────

pub fn bool_false() -> bool {
    false
}

pub fn bool_true() -> bool {
    true
}

// ── Auto-attach ────────────────────────────────────────────────────────────

pub fn auto_attach_on_opened_with_owner() -> NewTabBehavior {
    NewTabBehavior::Child
}

pub fn auto_attach_on_new_tab_command() -> NewTabBehavior {
    NewTabBehavior::Orphan
}

pub fn auto_attach_on_duplicated() -> NewTabBehavior {
    NewTabBehavior::NextSibling
}

pub fn insert_new_child_at() -> InsertPosition {
    InsertPosition::End
}

pub fn insert_new_tab_from_pinned_tab_at() -> PinnedInsertPosition {
    PinnedInsertPosition::End
}

pub fn default_partition() -> String {
    "firefox-default".to_string()
}

pub fn new_tab_urls() -> Vec<String> {
    vec![
        "about:newtab".to_string(),
        "about:home".to_string(),
        "about:blank".to_string(),
    ]
}

// ── Burst grouping ─────────────────────────────────────────────────────────

pub fn auto_group_new_tabs_timeout_ms() -> u64 {
    100
}

pub fn group_tab_url_prefix() -> String {
    "about:treestyletab-group".to_string()
}

pub fn group_tab_cleanup() -> GroupTabCleanup {
    GroupTabCleanup::WhenSingleChild
}

// ── Close behavior ─────────────────────────────────────────────────────────

pub fn close_parent_behavior() -> CloseParentBehavior {
    CloseParentBehavior::PromoteFirstChild
}

// ── Classifier ─────────────────────────────────────────────────────────────

pub fn drag_reparent_delta_threshold() -> usize {
    2
}

// ── Persistence & gateway ──────────────────────────────────────────────────

pub fn tree_cache_save_delay_ms() -> u64 {
    150
}

pub fn tab_registration_timeout_ms() -> u64 {
    1000
}
