//! Issue type: the atomic unit of persisted state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::dependency::{DepKind, Dependency};
use crate::error::ValidationError;

/// Closed set of issue kinds understood by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    #[default]
    Task,
    Feature,
    Chore,
    Bug,
    Epic,
}

impl IssueType {
    pub const ALL: [IssueType; 5] = [
        IssueType::Task,
        IssueType::Feature,
        IssueType::Chore,
        IssueType::Bug,
        IssueType::Epic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Task => "task",
            IssueType::Feature => "feature",
            IssueType::Chore => "chore",
            IssueType::Bug => "bug",
            IssueType::Epic => "epic",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        IssueType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ValidationError::IssueType(raw.to_string()))
    }
}

/// Issue status.
///
/// `blocked` ranks alongside `in_progress`; the engine reports it for
/// issues parked behind an open blocker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    Closed,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Open,
        Status::InProgress,
        Status::Blocked,
        Status::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::InProgress => "in_progress",
            Status::Blocked => "blocked",
            Status::Closed => "closed",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Status::Open => 0,
            Status::InProgress | Status::Blocked => 1,
            Status::Closed => 2,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Status::Closed)
    }

    /// Whether `self -> next` is a legal move.
    ///
    /// Statuses only move forward one rank, except that closing is allowed
    /// from any active status and `closed -> open` is an explicit reopen.
    pub fn can_transition_to(self, next: Status) -> bool {
        match (self, next) {
            (from, to) if from == to => false,
            (Status::Closed, Status::Open) => true,
            (Status::Closed, _) => false,
            (_, Status::Closed) => true,
            (Status::InProgress, Status::Blocked) | (Status::Blocked, Status::InProgress) => true,
            (from, to) => to.rank() == from.rank() + 1,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ValidationError::Status(raw.to_string()))
    }
}

/// Issue priority, 0 (most urgent) through 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 4;

    /// Every priority, indexed by value.
    pub const LEVELS: [Priority; 5] = [
        Priority(0),
        Priority(1),
        Priority(2),
        Priority(3),
        Priority(4),
    ];

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::Priority(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(2)
    }
}

impl TryFrom<i64> for Priority {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for i64 {
    fn from(value: Priority) -> Self {
        i64::from(value.0)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One prior state transition or mutation of an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub actor: String,
    #[serde(flatten)]
    pub action: AuditAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    StatusChanged {
        from: Status,
        to: Status,
    },
    Closed {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        reason: String,
    },
    Reopened,
    Updated {
        fields: Vec<String>,
    },
    DependencyAdded {
        depends_on_id: String,
        kind: DepKind,
    },
    DependencyRemoved {
        depends_on_id: String,
        kind: DepKind,
    },
}

impl AuditAction {
    pub fn is_close(&self) -> bool {
        matches!(self, AuditAction::Closed { .. })
    }
}

/// An issue: a trackable record in the external engine.
///
/// Closed issues are never physically removed; closing is the deletion
/// mechanism and keeps the audit trail intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    // ── Core identification ──
    pub id: String,

    // ── Content ──
    pub title: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub description: String,

    // ── Status & workflow ──
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub issue_type: IssueType,

    // ── Assignment ──
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub assignee: String,

    // ── Timestamps ──
    #[serde(default = "default_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub close_reason: String,

    // ── Labels ──
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub labels: Vec<String>,

    // ── Dependencies (populated from JSONL/engine) ──
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub dependencies: Vec<Dependency>,

    // ── Audit trail ──
    #[serde(
        default,
        alias = "events",
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub audit: Vec<AuditEntry>,
}

fn default_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// The engine emits `null` for unset strings and lists.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Issue {
    /// Fresh open issue with a `created` audit entry.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: Status::Open,
            priority: Priority::default(),
            issue_type: IssueType::default(),
            assignee: String::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
            close_reason: String::new(),
            labels: Vec::new(),
            dependencies: Vec::new(),
            audit: vec![AuditEntry {
                at: now,
                actor: String::new(),
                action: AuditAction::Created,
            }],
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == Status::Closed
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn touch_updated_at(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn record(&mut self, actor: &str, at: DateTime<Utc>, action: AuditAction) {
        self.audit.push(AuditEntry {
            at,
            actor: actor.to_string(),
            action,
        });
    }

    /// Move to `next`, appending the matching audit entry.
    pub fn transition(
        &mut self,
        next: Status,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        self.apply_status(next, actor, now, "")
    }

    /// Close the issue. Closing is how records are deleted.
    pub fn close(
        &mut self,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        self.apply_status(Status::Closed, actor, now, reason)
    }

    fn apply_status(
        &mut self,
        next: Status,
        actor: &str,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), ValidationError> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(ValidationError::InvalidTransition {
                from: from.to_string(),
                to: next.to_string(),
            });
        }

        self.status = next;
        self.updated_at = now;
        let action = match (from, next) {
            (_, Status::Closed) => {
                self.closed_at = Some(now);
                self.close_reason = reason.to_string();
                AuditAction::Closed {
                    reason: reason.to_string(),
                }
            }
            (Status::Closed, Status::Open) => {
                self.closed_at = None;
                self.close_reason.clear();
                AuditAction::Reopened
            }
            (from, to) => AuditAction::StatusChanged { from, to },
        };
        self.record(actor, now, action);
        Ok(())
    }

    /// Blocking edges declared by this issue.
    pub fn blockers(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|dep| dep.dep_type.is_blocking())
    }
}
