//! # beadmem-provider
//!
//! Agent memory on top of the issue engine.
//!
//! Each [`MemoryEntry`](beadmem_bd::MemoryEntry) is stored as exactly one
//! issue. Session, agent and category travel as reserved labels
//! ([`labels`]); importance collapses onto priority ([`importance`], lossy);
//! everything else rides in a trailer line of the description ([`body`]).

pub mod body;
pub mod error;
pub mod importance;
pub mod labels;
pub mod mapping;
pub mod provider;

pub use body::{BodyMeta, decode_body, encode_body};
pub use error::{ProviderError, ProviderResult};
pub use importance::{importance_to_priority, priority_to_importance};
pub use labels::{
    AGENT_PREFIX, CATEGORY_PREFIX, MemoryLabels, SESSION_PREFIX, decode_labels, encode_labels,
    session_label,
};
pub use mapping::{from_issue, to_new_issue};
pub use provider::{DELETE_REASON, MemoryFilter, MemoryProvider, ProviderContext, UNLINKED_REASON};
