//! Dependency types: typed edges in the issue graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// A dependency between two issues: `issue_id` depends on `depends_on_id`.
///
/// For `blocks`, the target is the blocker: while `depends_on_id` is open,
/// `issue_id` is not ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub issue_id: String,
    pub depends_on_id: String,
    /// JSONL compatibility:
    /// - the engine uses `type`
    /// - older exports may use `dep_type`
    #[serde(rename = "type", alias = "dep_type")]
    pub dep_type: DepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,
}

impl Dependency {
    /// Build an edge, rejecting self-references.
    pub fn new(
        issue_id: impl Into<String>,
        depends_on_id: impl Into<String>,
        dep_type: DepKind,
    ) -> Result<Self, ValidationError> {
        let issue_id = issue_id.into();
        let depends_on_id = depends_on_id.into();
        if issue_id == depends_on_id {
            return Err(ValidationError::SelfDependency(issue_id));
        }
        Ok(Self {
            issue_id,
            depends_on_id,
            dep_type,
            created_at: None,
            created_by: String::new(),
        })
    }
}

/// Dependency kind classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepKind {
    Blocks,
    Related,
    ParentChild,
    DiscoveredFrom,
}

impl DepKind {
    pub const ALL: [DepKind; 4] = [
        DepKind::Blocks,
        DepKind::Related,
        DepKind::ParentChild,
        DepKind::DiscoveredFrom,
    ];

    /// Whether this dependency kind affects ready-work computation.
    pub fn is_blocking(&self) -> bool {
        matches!(self, DepKind::Blocks)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepKind::Blocks => "blocks",
            DepKind::Related => "related",
            DepKind::ParentChild => "parent-child",
            DepKind::DiscoveredFrom => "discovered-from",
        }
    }

    /// Name of the relation seen from the other endpoint.
    pub fn inverse_label(&self) -> &'static str {
        match self {
            DepKind::Blocks => "blocked-by",
            DepKind::ParentChild => "child-of",
            DepKind::Related => "related",
            DepKind::DiscoveredFrom => "discovered-from",
        }
    }
}

impl fmt::Display for DepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepKind {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        DepKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ValidationError::DepKind(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_accepts_type_field() {
        let raw = r#"{
            "issue_id":"bd-a",
            "depends_on_id":"bd-b",
            "type":"discovered-from"
        }"#;

        let dep: Dependency = serde_json::from_str(raw).expect("must parse engine dependency");
        assert_eq!(dep.dep_type, DepKind::DiscoveredFrom);
    }

    #[test]
    fn dependency_accepts_dep_type_alias() {
        let raw = r#"{
            "issue_id":"bd-a",
            "depends_on_id":"bd-b",
            "dep_type":"blocks"
        }"#;

        let dep: Dependency = serde_json::from_str(raw).expect("must parse alias");
        assert_eq!(dep.dep_type, DepKind::Blocks);
    }

    #[test]
    fn dependency_rejects_unknown_kind() {
        let raw = r#"{"issue_id":"bd-a","depends_on_id":"bd-b","type":"waits-for"}"#;
        assert!(serde_json::from_str::<Dependency>(raw).is_err());
        assert_eq!(
            "waits-for".parse::<DepKind>(),
            Err(ValidationError::DepKind("waits-for".to_string()))
        );
    }

    #[test]
    fn kind_parsing_accepts_underscored_spelling() {
        assert_eq!("parent_child".parse::<DepKind>(), Ok(DepKind::ParentChild));
        assert_eq!(" Blocks ".parse::<DepKind>(), Ok(DepKind::Blocks));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let err = Dependency::new("bd-a", "bd-a", DepKind::Related).expect_err("self edge");
        assert_eq!(err, ValidationError::SelfDependency("bd-a".to_string()));
    }

    #[test]
    fn only_blocks_gates_ready_work() {
        let blocking: Vec<_> = DepKind::ALL.iter().filter(|k| k.is_blocking()).collect();
        assert_eq!(blocking, vec![&DepKind::Blocks]);
        assert_eq!(DepKind::Blocks.inverse_label(), "blocked-by");
    }
}
