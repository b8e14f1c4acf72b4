//! Memory entries: an agent's stored knowledge, backed by one issue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Conversation,
    Decision,
    Pattern,
    Context,
    Learning,
    Artifact,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 6] = [
        MemoryCategory::Conversation,
        MemoryCategory::Decision,
        MemoryCategory::Pattern,
        MemoryCategory::Context,
        MemoryCategory::Learning,
        MemoryCategory::Artifact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Conversation => "conversation",
            MemoryCategory::Decision => "decision",
            MemoryCategory::Pattern => "pattern",
            MemoryCategory::Context => "context",
            MemoryCategory::Learning => "learning",
            MemoryCategory::Artifact => "artifact",
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryCategory {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        MemoryCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| ValidationError::Category(raw.to_string()))
    }
}

/// Importance score, 1 (trivial) through 10 (critical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Importance(u8);

impl Importance {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    /// Every score, indexed by `value - 1`.
    pub const LEVELS: [Importance; 10] = [
        Importance(1),
        Importance(2),
        Importance(3),
        Importance(4),
        Importance(5),
        Importance(6),
        Importance(7),
        Importance(8),
        Importance(9),
        Importance(10),
    ];

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::Importance(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Importance {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<i64> for Importance {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Importance> for i64 {
    fn from(value: Importance) -> Self {
        i64::from(value.0)
    }
}

/// One unit of agent memory.
///
/// `id` is empty until the entry is persisted; afterwards it equals the
/// backing issue's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    #[serde(default)]
    pub id: String,
    pub agent_id: String,
    pub session_id: String,
    pub category: MemoryCategory,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub importance: Importance,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl MemoryEntry {
    pub fn new(
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        category: MemoryCategory,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let agent_id = agent_id.into();
        let session_id = session_id.into();
        let title = title.into();
        if agent_id.trim().is_empty() {
            return Err(ValidationError::Empty { field: "agent_id" });
        }
        if session_id.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "session_id",
            });
        }
        if title.trim().is_empty() {
            return Err(ValidationError::Empty { field: "title" });
        }

        let now = Utc::now();
        Ok(Self {
            id: String::new(),
            agent_id,
            session_id,
            category,
            title,
            content: content.into(),
            metadata: empty_object(),
            tags: Vec::new(),
            importance: Importance::default(),
            created_at: now,
            accessed_at: now,
            parent_id: None,
        })
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }
}
