use crate::conflict::ConflictStrategy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Checkpoint behaviour for the versioned log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// The engine's JSONL log, relative to the working directory.
    pub log_path: PathBuf,
    /// Quiet period after the last write before a commit may flush.
    pub debounce_secs: u64,
    pub flush_on_commit: bool,
    pub auto_resolve_conflicts: bool,
    pub conflict_strategy: ConflictStrategy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(".beads/issues.jsonl"),
            debounce_secs: 5,
            flush_on_commit: true,
            auto_resolve_conflicts: true,
            conflict_strategy: ConflictStrategy::default(),
        }
    }
}

impl SyncConfig {
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
}
