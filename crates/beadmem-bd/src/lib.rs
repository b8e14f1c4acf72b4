//! # beadmem-bd
//!
//! Record model for issue/dependency state and agent memory.
//!
//! This crate provides:
//! - `Issue`, `Dependency` and `MemoryEntry` types with fail-fast validation
//! - JSONL read/write/append (the append-only log)
//! - `IssueIndex` (the local, rebuildable cache)
//! - ready/blocked/tree algorithms over an index
//!
//! It never invokes the external engine and never touches version control.
//! Those concerns live in `beadmem-engine` and `beadmem-sync`.
//!
//! ## Data model
//!
//! ```text
//! JSONL log (on disk, versioned, one record per line)
//!     ↕  load / append
//! IssueIndex (deterministic in-memory projection, not versioned)
//! ```

pub mod dependency;
pub mod entry;
pub mod error;
pub mod graph;
pub mod index;
pub mod issue;
pub mod jsonl;

pub use dependency::{DepKind, Dependency};
pub use entry::{Importance, MemoryCategory, MemoryEntry};
pub use error::ValidationError;
pub use graph::{
    BlockedIssue, DEFAULT_TREE_DEPTH, NodeState, TreeNode, blocked_issues, dependency_tree,
    ready_issues, ready_order,
};
pub use index::{IndexError, IssueFilter, IssueIndex};
pub use issue::{AuditAction, AuditEntry, Issue, IssueType, Priority, Status};
pub use jsonl::{
    JsonlError, append_issue_to_path, read_issues, read_issues_from_path, write_bytes_atomic,
    write_issues, write_issues_to_path,
};
