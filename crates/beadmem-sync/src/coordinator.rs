//! Checkpoint coordinator.
//!
//! Nothing here runs on a timer. Callers report writes with
//! [`SyncCoordinator::record_write`] and invoke the two checkpoints around
//! their own version-control actions.

use crate::backup::backup_file;
use crate::config::SyncConfig;
use crate::conflict::{ConflictInfo, detect_conflicts, resolve};
use crate::error::{SyncError, SyncResult};
use beadmem_bd::{IssueIndex, write_bytes_atomic};
use beadmem_engine::{CommandRunner, EngineClient, SystemRunner};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Instant, SystemTime};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    InSync,
    /// A write landed; the debounce window runs from `since`.
    PendingWrite { since: Instant },
    Flushed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub commit_checks: u64,
    pub flushes: u64,
    pub imports: u64,
    pub conflicts_resolved: u64,
    pub last_import_at: Option<DateTime<Utc>>,
    /// Distinct ids in the log at the last import.
    pub last_import_records: usize,
}

#[derive(Debug)]
struct Inner {
    state: SyncState,
    last_write: Option<SystemTime>,
    stats: SyncStats,
}

pub struct SyncCoordinator<R: CommandRunner = SystemRunner> {
    client: Arc<EngineClient<R>>,
    config: SyncConfig,
    inner: Mutex<Inner>,
}

impl<R: CommandRunner> SyncCoordinator<R> {
    pub fn new(client: Arc<EngineClient<R>>, config: SyncConfig) -> Self {
        Self {
            client,
            config,
            inner: Mutex::new(Inner {
                state: SyncState::InSync,
                last_write: None,
                stats: SyncStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The log path, resolved against the engine's working directory.
    pub fn log_path(&self) -> PathBuf {
        match &self.client.config().working_dir {
            Some(dir) if self.config.log_path.is_relative() => dir.join(&self.config.log_path),
            _ => self.config.log_path.clone(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.lock().state
    }

    pub fn stats(&self) -> SyncStats {
        self.lock().stats.clone()
    }

    /// Note a write through the engine; restarts the debounce window.
    pub fn record_write(&self) {
        let mut inner = self.lock();
        inner.state = SyncState::PendingWrite {
            since: Instant::now(),
        };
        inner.last_write = Some(SystemTime::now());
    }

    /// Pre-commit checkpoint: `Ok(true)` when the on-disk log reflects every
    /// recorded write.
    pub fn before_commit(&self) -> SyncResult<bool> {
        self.lock().stats.commit_checks += 1;

        let path = self.log_path();
        if let Some(text) = read_optional(&path)? {
            let conflicts = detect_conflicts(&text)?;
            if !conflicts.is_empty() {
                return Err(SyncError::Conflict { conflicts });
            }
        }

        self.wait_for_debounce();

        let last_write = {
            let mut inner = self.lock();
            inner.state = SyncState::Flushed;
            inner.last_write
        };

        let mut current = is_current(&path, last_write)?;
        if !current && self.config.flush_on_commit {
            self.client.export_log(&path)?;
            self.lock().stats.flushes += 1;
            current = true;
        }

        if current {
            self.lock().state = SyncState::InSync;
        }
        Ok(current)
    }

    /// Post-pull checkpoint: resolve conflict markers if allowed, check that
    /// the log rebuilds into an index, then have the engine import it.
    /// `Ok(false)` when there is no log yet.
    pub fn after_pull(&self) -> SyncResult<bool> {
        let path = self.log_path();
        let Some(text) = read_optional(&path)? else {
            return Ok(false);
        };

        let conflicts = detect_conflicts(&text)?;
        if !conflicts.is_empty() {
            if !self.config.auto_resolve_conflicts {
                return Err(SyncError::Conflict { conflicts });
            }
            let backup = backup_file(&path).map_err(|e| SyncError::io(&path, e))?;
            let resolved = resolve(&text, self.config.conflict_strategy)?;
            write_bytes_atomic(&path, resolved.as_bytes())?;
            warn!(
                log = %path.display(),
                backup = %backup.display(),
                blocks = conflicts.len(),
                strategy = %self.config.conflict_strategy,
                "resolved conflict markers in log"
            );
            self.lock().stats.conflicts_resolved += conflicts.len() as u64;
        }

        let rebuilt = IssueIndex::load_jsonl(&path)?;
        self.client.import_log(&path)?;
        let mut inner = self.lock();
        inner.stats.imports += 1;
        inner.stats.last_import_at = Some(Utc::now());
        inner.stats.last_import_records = rebuilt.len();
        inner.state = SyncState::InSync;
        info!(log = %path.display(), records = rebuilt.len(), "imported log after pull");
        Ok(true)
    }

    /// Conflict blocks currently present in the log; empty when it is absent.
    pub fn detect_conflicts(&self) -> SyncResult<Vec<ConflictInfo>> {
        match read_optional(&self.log_path())? {
            Some(text) => Ok(detect_conflicts(&text)?),
            None => Ok(Vec::new()),
        }
    }

    fn wait_for_debounce(&self) {
        let since = match self.lock().state {
            SyncState::PendingWrite { since } => since,
            _ => return,
        };
        let remaining = self.config.debounce().saturating_sub(since.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_optional(path: &Path) -> SyncResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::io(path, e)),
    }
}

fn is_current(path: &Path, last_write: Option<SystemTime>) -> SyncResult<bool> {
    let Some(last_write) = last_write else {
        return Ok(true);
    };
    match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => Ok(modified >= last_write),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncError::io(path, e)),
    }
}
