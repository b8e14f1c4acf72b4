//! Argument validation applied before any engine invocation.
//!
//! Arguments are passed as a vector, never through a shell, so these checks
//! guard the engine's own parser: ids and labels must not look like flags
//! and free text must not carry control characters.

use beadmem_bd::ValidationError;
use regex::Regex;
use std::sync::OnceLock;

pub const MAX_ID_LEN: usize = 100;
pub const MAX_TITLE_LEN: usize = 500;
pub const MAX_LABEL_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 64 * 1024;

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("id regex must compile")
    })
}

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s,\-][^\s,]*$").expect("label regex must compile")
    })
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len > max {
        return Err(ValidationError::TooLong { field, len, max });
    }
    Ok(())
}

fn forbidden(field: &'static str, value: &str) -> ValidationError {
    ValidationError::Forbidden {
        field,
        value: value.to_string(),
    }
}

pub fn validate_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::Empty { field: "id" });
    }
    check_len("id", id, MAX_ID_LEN)?;
    if !id_pattern().is_match(id) {
        return Err(forbidden("id", id));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::Empty { field: "title" });
    }
    check_len("title", title, MAX_TITLE_LEN)?;
    if title.chars().any(char::is_control) {
        return Err(forbidden("title", title));
    }
    Ok(())
}

/// Descriptions may span lines; other control characters are rejected.
pub fn validate_description(description: &str) -> Result<(), ValidationError> {
    check_len("description", description, MAX_DESCRIPTION_LEN)?;
    if description
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\t' && c != '\r')
    {
        return Err(forbidden("description", description));
    }
    Ok(())
}

pub fn validate_label(label: &str) -> Result<(), ValidationError> {
    if label.is_empty() {
        return Err(ValidationError::Empty { field: "label" });
    }
    check_len("label", label, MAX_LABEL_LEN)?;
    if !label_pattern().is_match(label) {
        return Err(forbidden("label", label));
    }
    Ok(())
}

pub fn validate_labels<'a>(
    labels: impl IntoIterator<Item = &'a String>,
) -> Result<(), ValidationError> {
    labels.into_iter().try_for_each(|label| validate_label(label))
}

pub fn validate_assignee(assignee: &str) -> Result<(), ValidationError> {
    if assignee.is_empty() {
        return Err(ValidationError::Empty { field: "assignee" });
    }
    check_len("assignee", assignee, MAX_LABEL_LEN)?;
    if !label_pattern().is_match(assignee) {
        return Err(forbidden("assignee", assignee));
    }
    Ok(())
}

/// Close reasons are single-line free text.
pub fn validate_reason(reason: &str) -> Result<(), ValidationError> {
    check_len("reason", reason, MAX_TITLE_LEN)?;
    if reason.chars().any(char::is_control) {
        return Err(forbidden("reason", reason));
    }
    Ok(())
}
