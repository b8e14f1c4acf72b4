//! # beadmem
//!
//! Agent memory persisted through a git-distributed issue engine.
//!
//! [`Beadmem`] wires the pieces together: a [`MemoryProvider`] for storing
//! and restoring entries, a [`DependencyResolver`] for ready and blocked
//! work, and a [`SyncCoordinator`] invoked around the caller's own commits
//! and pulls.
//!
//! ```no_run
//! use beadmem::{Beadmem, BeadmemConfig};
//! use beadmem_bd::MemoryCategory;
//! use beadmem_provider::ProviderContext;
//!
//! let config = BeadmemConfig::load("beadmem.toml")?;
//! let memory = Beadmem::open(config, ProviderContext::new("planner", "s-42")?);
//! let session = memory.start_session()?;
//! for entry in &session.context.entries {
//!     println!("{}: {}", entry.category, entry.title);
//! }
//! let entry = memory
//!     .provider()
//!     .context()
//!     .entry(MemoryCategory::Decision, "Use sqlite", "Embedded, no server.")?;
//! memory.store(&entry)?;
//! memory.before_commit()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod telemetry;

pub use config::{BeadmemConfig, ConfigError, MemoryConfig};
pub use telemetry::init_tracing;

use beadmem_bd::{DepKind, Issue, MemoryEntry};
use beadmem_engine::{
    CommandRunner, DependencyResolver, EngineClient, EngineError, ReadyFilter, SystemRunner,
};
use beadmem_provider::{
    MemoryProvider, ProviderContext, ProviderError, decode_labels, session_label,
};
use beadmem_sync::{SyncCoordinator, SyncError};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BeadmemError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type BeadmemResult<T> = Result<T, BeadmemError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// The engine answered and its database is initialized.
    Engine,
    /// The engine is missing or uninitialized; memory stays in process.
    LocalOnly,
}

/// What an agent needs to resume work in a session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    /// Live entries of the session, oldest first.
    pub entries: Vec<MemoryEntry>,
    /// Unblocked work items labelled with the session, most urgent first.
    /// Memory entries are not work and never appear here.
    pub ready_work: Vec<Issue>,
}

#[derive(Debug, Clone)]
pub struct SessionStart {
    pub mode: EngineMode,
    pub context: SessionContext,
}

pub struct Beadmem<R: CommandRunner = SystemRunner> {
    config: BeadmemConfig,
    client: Arc<EngineClient<R>>,
    provider: MemoryProvider<R>,
    resolver: DependencyResolver<R>,
    sync: SyncCoordinator<R>,
}

impl Beadmem<SystemRunner> {
    /// Drive the real engine executable named in `config.engine`.
    pub fn open(config: BeadmemConfig, context: ProviderContext) -> Self {
        Self::with_runner(config, context, SystemRunner)
    }
}

impl<R: CommandRunner> Beadmem<R> {
    pub fn with_runner(config: BeadmemConfig, context: ProviderContext, runner: R) -> Self {
        let client = Arc::new(EngineClient::with_runner(config.engine.clone(), runner));
        let provider = MemoryProvider::new(Arc::clone(&client), context)
            .with_local_fallback(config.memory.local_fallback);
        let resolver = DependencyResolver::new(Arc::clone(&client));
        let sync = SyncCoordinator::new(Arc::clone(&client), config.sync.clone());
        Self {
            config,
            client,
            provider,
            resolver,
            sync,
        }
    }

    pub fn config(&self) -> &BeadmemConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<EngineClient<R>> {
        &self.client
    }

    pub fn provider(&self) -> &MemoryProvider<R> {
        &self.provider
    }

    pub fn resolver(&self) -> &DependencyResolver<R> {
        &self.resolver
    }

    pub fn sync(&self) -> &SyncCoordinator<R> {
        &self.sync
    }

    /// Check the engine and assemble the session's context.
    ///
    /// An unusable engine is reported once here, as [`EngineMode::LocalOnly`],
    /// rather than by every later call. In that mode entries come from the
    /// in-process store when local fallback is enabled and are empty
    /// otherwise; ready work is always empty.
    pub fn start_session(&self) -> BeadmemResult<SessionStart> {
        let session_id = self.provider.context().session_id.clone();
        let mode = self.engine_mode()?;

        let context = match mode {
            EngineMode::Engine => {
                let entries = self.provider.restore_session(&session_id)?;
                let ready_work = self
                    .resolver
                    .ready_work(&ReadyFilter::default().label(session_label(&session_id)))?
                    .into_iter()
                    .filter(|issue| decode_labels(&issue.labels).category.is_none())
                    .collect();
                SessionContext {
                    session_id,
                    entries,
                    ready_work,
                }
            }
            EngineMode::LocalOnly => {
                warn!(
                    program = %self.config.engine.program.display(),
                    local_fallback = self.config.memory.local_fallback,
                    "issue engine unavailable; running with local memory only"
                );
                self.provider.mark_degraded();
                let entries = if self.config.memory.local_fallback {
                    self.provider.restore_session(&session_id)?
                } else {
                    Vec::new()
                };
                SessionContext {
                    session_id,
                    entries,
                    ready_work: Vec::new(),
                }
            }
        };

        info!(
            session = %context.session_id,
            mode = ?mode,
            entries = context.entries.len(),
            ready = context.ready_work.len(),
            "session started"
        );
        Ok(SessionStart { mode, context })
    }

    /// Store `entry` and open a pending write with the coordinator.
    pub fn store(&self, entry: &MemoryEntry) -> BeadmemResult<String> {
        let id = self.provider.store(entry)?;
        self.sync.record_write();
        Ok(id)
    }

    /// Close the entry's issue. A pending write is opened only when
    /// something was closed.
    pub fn delete(&self, id: &str) -> BeadmemResult<bool> {
        let closed = self.provider.delete(id)?;
        if closed {
            self.sync.record_write();
        }
        Ok(closed)
    }

    pub fn link_entries(
        &self,
        child_id: &str,
        parent_id: &str,
        kind: DepKind,
    ) -> BeadmemResult<bool> {
        let linked = self.provider.link_entries(child_id, parent_id, kind)?;
        if linked {
            self.sync.record_write();
        }
        Ok(linked)
    }

    /// Refresh the entry's access time; the rewrite counts as a write.
    pub fn touch(&self, id: &str) -> BeadmemResult<MemoryEntry> {
        let entry = self.provider.touch(id)?;
        self.sync.record_write();
        Ok(entry)
    }

    pub fn before_commit(&self) -> BeadmemResult<bool> {
        Ok(self.sync.before_commit()?)
    }

    pub fn after_pull(&self) -> BeadmemResult<bool> {
        Ok(self.sync.after_pull()?)
    }

    fn engine_mode(&self) -> BeadmemResult<EngineMode> {
        if !self.client.is_available() {
            return Ok(EngineMode::LocalOnly);
        }
        match self.client.is_initialized() {
            Ok(true) => Ok(EngineMode::Engine),
            Ok(false) => Ok(EngineMode::LocalOnly),
            Err(err) if err.is_unavailable() => Ok(EngineMode::LocalOnly),
            Err(err) => Err(err.into()),
        }
    }
}
