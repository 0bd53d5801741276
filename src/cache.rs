//! Tree cache persistence
//!
//! A window's tree structure is cached after structural changes (debounced)
//! and read back when the host restores the window. Caches live in
//! `~/.cache/tabtree/trees/<key>.yaml` by default.

use crate::tab::PersistentId;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tabtree_config::WindowId;
use tabtree_protocol::TreeStructure;
use thiserror::Error;

/// Format version written into every cache entry
pub const TREE_CACHE_VERSION: u32 = 1;

/// Why a cache entry cannot be used.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialize(String),

    #[error("cache version {found} does not match expected {expected}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("cached tabs do not match the restored tabs")]
    SignatureMismatch,
}

/// One window's cached tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowTreeCache {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    /// Persistent ids of the window's tabs in flat order when saved
    pub signature: Vec<PersistentId>,
    pub structure: TreeStructure,
}

impl WindowTreeCache {
    pub fn new(signature: Vec<PersistentId>, structure: TreeStructure) -> Self {
        Self {
            version: TREE_CACHE_VERSION,
            saved_at: Utc::now(),
            signature,
            structure,
        }
    }

    /// Check the entry against the tabs the host just restored
    pub fn validate(&self, signature: &[PersistentId]) -> Result<(), CacheError> {
        if self.version != TREE_CACHE_VERSION {
            return Err(CacheError::VersionMismatch {
                expected: TREE_CACHE_VERSION,
                found: self.version,
            });
        }
        if self.signature != signature {
            return Err(CacheError::SignatureMismatch);
        }
        Ok(())
    }
}

/// Cache key for a window
pub fn window_key(window: WindowId) -> String {
    format!("window-{window}")
}

/// Opaque key/value store for cached trees.
pub trait TreeCache: Send {
    fn load(&self, key: &str) -> Result<Option<WindowTreeCache>>;
    fn store(&self, key: &str, entry: &WindowTreeCache) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One YAML file per key under a directory.
#[derive(Debug, Clone)]
pub struct YamlFileCache {
    dir: PathBuf,
}

impl YamlFileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache in the platform cache directory
    pub fn default_location() -> Self {
        Self::new(
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tabtree")
                .join("trees"),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.yaml"))
    }
}

impl TreeCache for YamlFileCache {
    fn load(&self, key: &str) -> Result<Option<WindowTreeCache>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read tree cache from {:?}", path))?;
        if contents.trim().is_empty() {
            return Ok(None);
        }
        let entry: WindowTreeCache = serde_yaml_ng::from_str(&contents)
            .with_context(|| format!("Failed to parse tree cache from {:?}", path))?;
        log::debug!(
            "Loaded tree cache {:?} ({} entries) from {:?}",
            key,
            entry.structure.len(),
            path
        );
        Ok(Some(entry))
    }

    fn store(&self, key: &str, entry: &WindowTreeCache) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory {:?}", self.dir))?;
        let path = self.path_for(key);
        let yaml = serde_yaml_ng::to_string(entry).context("Failed to serialize tree cache")?;

        // Write to a temp file then rename so a crash never leaves half a file
        let temp_path = path.with_extension("yaml.tmp");
        std::fs::write(&temp_path, yaml)
            .with_context(|| format!("Failed to write tree cache to {:?}", temp_path))?;
        std::fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to move tree cache into place at {:?}", path))?;

        log::debug!("Saved tree cache {:?} to {:?}", key, path);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove tree cache {:?}", path))?;
        }
        Ok(())
    }
}

/// In-memory cache, mostly for tests and hosts without a writable disk.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, WindowTreeCache>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl TreeCache for MemoryCache {
    fn load(&self, key: &str) -> Result<Option<WindowTreeCache>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn store(&self, key: &str, entry: &WindowTreeCache) -> Result<()> {
        self.entries.lock().insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

impl<T: TreeCache + Sync> TreeCache for std::sync::Arc<T> {
    fn load(&self, key: &str) -> Result<Option<WindowTreeCache>> {
        (**self).load(key)
    }

    fn store(&self, key: &str, entry: &WindowTreeCache) -> Result<()> {
        (**self).store(key, entry)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}
