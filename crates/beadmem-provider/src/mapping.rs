//! MemoryEntry <-> Issue conversion.

use crate::body::{BodyMeta, decode_body, encode_body};
use crate::importance::{importance_to_priority, priority_to_importance};
use crate::labels::{MemoryLabels, decode_labels, encode_labels};
use beadmem_bd::{DepKind, Issue, IssueType, MemoryEntry};
use beadmem_engine::NewIssue;

fn labels_of(entry: &MemoryEntry) -> MemoryLabels {
    MemoryLabels {
        session_id: Some(entry.session_id.clone()),
        agent_id: Some(entry.agent_id.clone()),
        category: Some(entry.category),
        tags: entry.tags.clone(),
    }
}

fn meta_of(entry: &MemoryEntry) -> BodyMeta {
    BodyMeta {
        metadata: entry.metadata.clone(),
        created_at: Some(entry.created_at),
        accessed_at: Some(entry.accessed_at),
        parent_id: entry.parent_id.clone(),
    }
}

pub fn entry_description(entry: &MemoryEntry) -> String {
    encode_body(&entry.content, &meta_of(entry))
}

/// Creation parameters for the issue backing `entry`.
pub fn to_new_issue(entry: &MemoryEntry) -> NewIssue {
    NewIssue::new(entry.title.clone())
        .description(entry_description(entry))
        .issue_type(IssueType::Task)
        .priority(importance_to_priority(entry.importance))
        .labels(encode_labels(&labels_of(entry)))
}

/// Materialize `entry` as a full issue under `id` (local-only records).
pub fn to_issue(entry: &MemoryEntry, id: &str) -> Issue {
    let new = to_new_issue(entry);
    let mut issue = Issue::new(id, new.title);
    issue.description = new.description;
    issue.priority = new.priority;
    issue.issue_type = new.issue_type;
    issue.labels = new.labels;
    issue.created_at = entry.created_at;
    issue
}

/// Decode an issue back into a memory entry.
///
/// Returns `None` for issues that carry no `memory:<category>` label; those
/// are ordinary work items, not memory.
pub fn from_issue(issue: &Issue) -> Option<MemoryEntry> {
    let labels = decode_labels(&issue.labels);
    let category = labels.category?;
    let (content, meta) = decode_body(&issue.description);
    let parent_id = meta.parent_id.or_else(|| {
        issue
            .dependencies
            .iter()
            .find(|dep| dep.dep_type == DepKind::ParentChild)
            .map(|dep| dep.depends_on_id.clone())
    });
    let metadata = if meta.metadata.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        meta.metadata
    };

    Some(MemoryEntry {
        id: issue.id.clone(),
        agent_id: labels.agent_id.unwrap_or_default(),
        session_id: labels.session_id.unwrap_or_default(),
        category,
        title: issue.title.clone(),
        content,
        metadata,
        tags: labels.tags,
        importance: priority_to_importance(issue.priority),
        created_at: meta.created_at.unwrap_or(issue.created_at),
        accessed_at: meta.accessed_at.unwrap_or(issue.updated_at),
        parent_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use beadmem_bd::{Importance, MemoryCategory};
    use serde_json::json;

    fn entry() -> MemoryEntry {
        MemoryEntry::new(
            "planner",
            "s-1",
            MemoryCategory::Decision,
            "Use sqlite",
            "We picked sqlite for the cache.\nIt is embedded.",
        )
        .expect("entry")
        .with_importance(Importance::new(8).expect("importance"))
        .with_tags(["db", "session:spoof"])
        .with_metadata(json!({"ticket": 42}))
        .with_parent("bd-9")
    }

    #[test]
    fn new_issue_carries_labels_priority_and_trailer() {
        let new = to_new_issue(&entry());
        assert_eq!(new.title, "Use sqlite");
        assert_eq!(new.priority.value(), 1);
        assert_eq!(
            new.labels,
            vec!["session:s-1", "agent:planner", "memory:decision", "db"]
        );
        assert!(new.description.starts_with("We picked sqlite"));
        assert!(new.description.contains("beadmem:meta"));
    }

    #[test]
    fn issue_round_trip_is_exact_except_importance() {
        let original = entry();
        let decoded = from_issue(&to_issue(&original, "bd-1")).expect("memory issue");

        assert_eq!(decoded.id, "bd-1");
        assert_eq!(decoded.title, original.title);
        assert_eq!(decoded.content, original.content);
        assert_eq!(decoded.category, original.category);
        assert_eq!(decoded.agent_id, "planner");
        assert_eq!(decoded.session_id, "s-1");
        assert_eq!(decoded.tags, vec!["db".to_string()]);
        assert_eq!(decoded.metadata, json!({"ticket": 42}));
        assert_eq!(decoded.parent_id.as_deref(), Some("bd-9"));
        assert_eq!(decoded.created_at, original.created_at);
        assert_eq!(decoded.importance.value(), 7);
    }

    #[test]
    fn ordinary_issues_are_not_memory() {
        let issue = Issue::new("bd-5", "Fix the build");
        assert!(from_issue(&issue).is_none());
    }

    #[test]
    fn hand_written_memory_issue_decodes_with_defaults() {
        let mut issue = Issue::new("bd-6", "Learned something");
        issue.description = "no trailer here".to_string();
        issue.labels = vec!["memory:learning".to_string()];
        let entry = from_issue(&issue).expect("memory");
        assert_eq!(entry.content, "no trailer here");
        assert_eq!(entry.session_id, "");
        assert_eq!(entry.metadata, json!({}));
        assert_eq!(entry.created_at, issue.created_at);
        assert_eq!(entry.importance.value(), 5);
    }
}
