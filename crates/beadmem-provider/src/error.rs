use beadmem_bd::{IndexError, ValidationError};
use beadmem_engine::EngineError;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("local memory store: {0}")]
    Local(#[from] IndexError),

    #[error("memory entry not found: {0}")]
    NotFound(String),

    /// The parent edge was not recorded; the issue created as `id` has been
    /// closed.
    #[error("stored {id} but failed to link it to parent {parent_id}: {source}")]
    ParentLink {
        id: String,
        parent_id: String,
        #[source]
        source: EngineError,
    },
}

impl ProviderError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ProviderError::Engine(err) if err.is_unavailable())
    }
}
