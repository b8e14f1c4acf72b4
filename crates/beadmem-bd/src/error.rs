//! Validation errors raised while constructing model values.

/// A model value failed construction-time validation.
///
/// Invalid input is never coerced into range; it is rejected here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("priority must be in range [0, 4] (got {0})")]
    Priority(i64),

    #[error("importance must be in range [1, 10] (got {0})")]
    Importance(i64),

    #[error("unknown issue type: {0}")]
    IssueType(String),

    #[error("unknown status: {0}")]
    Status(String),

    #[error("unknown dependency kind: {0}")]
    DepKind(String),

    #[error("unknown memory category: {0}")]
    Category(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("issue cannot depend on itself: {0}")]
    SelfDependency(String),

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is too long ({len} > {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{field} contains forbidden characters: {value:?}")]
    Forbidden { field: &'static str, value: String },
}
