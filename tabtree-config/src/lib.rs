//! Configuration system for the tabtree reconciliation engine.
//!
//! This crate provides configuration loading, saving, and default values
//! for the engine. It includes:
//!
//! - Shared identifier types (`TabId`, `WindowId`)
//! - Behavior enums for auto-attach, insertion, and close-parent handling
//! - The `Config` struct with YAML persistence and validation
//! - Typed configuration errors

pub mod config;
pub mod defaults;
pub mod error;
mod types;

// Re-export main types for convenience
pub use config::Config;
pub use error::ConfigError;

// Re-export config types
pub use types::{
    CloseParentBehavior, GroupTabCleanup, InsertPosition, LogLevel, NewTabBehavior,
    PinnedInsertPosition, TabId, TreeBehaviorScope, WindowId,
};
