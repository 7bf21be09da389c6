//! Resolved-intent cache keyed by a hash of the normalized input.
//!
//! Entries are only learned after a confirmed successful execution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::intent::Intent;

/// Cache settings. Without a `path` the cache lives in memory only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// When set, the cache is read but never updated.
    #[serde(default)]
    pub learning_freeze: bool,
}

#[derive(Debug, Default)]
pub struct IntentCache {
    entries: HashMap<String, Intent>,
    path: Option<PathBuf>,
    learning_freeze: bool,
}

/// Cache key of a normalized input.
#[must_use]
pub fn input_key(input: &str) -> String {
    blake3::hash(input.trim().to_lowercase().as_bytes())
        .to_hex()
        .to_string()
}

impl IntentCache {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the cache described by `config`, loading persisted entries.
    /// A missing file is an empty cache; an unreadable one is too, with a warning.
    #[must_use]
    pub fn open(config: &CacheConfig) -> Self {
        let entries = config
            .path
            .as_deref()
            .map(load_entries)
            .unwrap_or_default();
        Self {
            entries,
            path: config.path.clone(),
            learning_freeze: config.learning_freeze,
        }
    }

    #[must_use]
    pub fn get(&self, input: &str) -> Option<&Intent> {
        self.entries.get(&input_key(input))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn learning_freeze(&self) -> bool {
        self.learning_freeze
    }

    pub fn set_learning_freeze(&mut self, frozen: bool) {
        self.learning_freeze = frozen;
    }

    /// Learn `intent` for `input`. Returns `true` if the entry was stored.
    pub fn remember(&mut self, input: &str, intent: &Intent) -> bool {
        if self.learning_freeze {
            tracing::info!("learning freeze active, cache not updated");
            return false;
        }
        if intent.is_failure() {
            return false;
        }
        self.entries.insert(input_key(input), intent.clone());
        self.persist();
        tracing::debug!(intent = %intent.intent_type, "intent cached");
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = save_entries(path, &self.entries) {
            tracing::warn!(path = %path.display(), "failed to save intent cache: {e}");
        }
    }
}

fn load_entries(path: &Path) -> HashMap<String, Intent> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to read intent cache: {e}");
            return HashMap::new();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), "ignoring malformed intent cache: {e}");
        HashMap::new()
    })
}

fn save_entries(path: &Path, entries: &HashMap<String, Intent>) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(entries).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}
