use crate::conflict::{ConflictInfo, MalformedConflict};
use beadmem_bd::{IndexError, JsonlError};
use beadmem_engine::EngineError;
use std::path::PathBuf;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("log has {} unresolved conflict block(s)", conflicts.len())]
    Conflict { conflicts: Vec<ConflictInfo> },

    #[error(transparent)]
    MalformedConflict(#[from] MalformedConflict),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Jsonl(#[from] JsonlError),

    /// The log does not rebuild into an index; nothing was imported.
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }
}
