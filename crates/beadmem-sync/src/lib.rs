//! # beadmem-sync
//!
//! Keeps the engine's versioned JSONL log consistent with its index at the
//! two points where version control touches it: before a commit
//! ([`SyncCoordinator::before_commit`]) and after a pull
//! ([`SyncCoordinator::after_pull`]). Version-control commands themselves
//! are always left to the caller.

pub mod backup;
pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod error;

pub use backup::backup_file;
pub use config::SyncConfig;
pub use conflict::{ConflictInfo, ConflictStrategy, MalformedConflict, detect_conflicts, resolve};
pub use coordinator::{SyncCoordinator, SyncState, SyncStats};
pub use error::{SyncError, SyncResult};
