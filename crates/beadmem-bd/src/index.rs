//! Local queryable index of issue/dependency state.
//!
//! Derived from the JSONL log and never versioned: it is safe to delete
//! and rebuild. It also backs the local-only fallback when the engine is
//! unreachable.

use crate::dependency::{DepKind, Dependency};
use crate::error::ValidationError;
use crate::issue::{AuditAction, Issue, IssueType, Status};
use crate::jsonl::{JsonlError, read_issues_from_path, write_issues_to_path};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;

/// Errors raised while loading or mutating the index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Jsonl(#[from] JsonlError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("issue not found: {0}")]
    IssueNotFound(String),

    #[error("dependency already exists: {issue_id} -> {depends_on_id} ({kind})")]
    DependencyAlreadyExists {
        issue_id: String,
        depends_on_id: String,
        kind: DepKind,
    },

    #[error("dependency not found: {issue_id} -> {depends_on_id}")]
    DependencyNotFound {
        issue_id: String,
        depends_on_id: String,
    },
}

/// Selection criteria shared by the index and the engine's `list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueFilter {
    /// Exact status. When unset, closed issues are skipped unless
    /// `include_closed` is set.
    pub status: Option<Status>,
    pub include_closed: bool,
    /// Every label listed must be present.
    pub labels: Vec<String>,
    pub assignee: Option<String>,
    pub issue_type: Option<IssueType>,
    pub limit: Option<usize>,
}

impl IssueFilter {
    /// Every issue, closed ones included.
    pub fn all() -> Self {
        Self {
            include_closed: true,
            ..Self::default()
        }
    }

    pub fn with_status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, issue: &Issue) -> bool {
        match self.status {
            Some(status) if issue.status != status => return false,
            None if !self.include_closed && issue.is_closed() => return false,
            _ => {}
        }
        if let Some(assignee) = &self.assignee
            && &issue.assignee != assignee
        {
            return false;
        }
        if let Some(issue_type) = self.issue_type
            && issue.issue_type != issue_type
        {
            return false;
        }
        self.labels.iter().all(|label| issue.has_label(label))
    }
}

/// Deterministic in-memory state for issues and typed edges.
#[derive(Debug, Clone, Default)]
pub struct IssueIndex {
    issues: BTreeMap<String, Issue>,
}

impl IssueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from fully-materialized issues.
    ///
    /// Duplicate IDs are resolved with deterministic last-write-wins
    /// semantics, matching how the engine replays an append-only log.
    pub fn from_issues(issues: impl IntoIterator<Item = Issue>) -> Self {
        let mut index = BTreeMap::new();
        for issue in issues {
            index.insert(issue.id.clone(), issue);
        }
        Self { issues: index }
    }

    /// Rebuild the index from a JSONL log.
    pub fn load_jsonl(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let issues = read_issues_from_path(path)?;
        Ok(Self::from_issues(issues))
    }

    /// Persist a compacted snapshot (one line per id) to a JSONL file.
    pub fn save_jsonl(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let issues: Vec<Issue> = self.issues.values().cloned().collect();
        write_issues_to_path(path, &issues)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issue(&self, id: &str) -> Option<&Issue> {
        self.issues.get(id)
    }

    pub fn issue_mut(&mut self, id: &str) -> Option<&mut Issue> {
        self.issues.get_mut(id)
    }

    fn require_mut(&mut self, id: &str) -> Result<&mut Issue, IndexError> {
        self.issues
            .get_mut(id)
            .ok_or_else(|| IndexError::IssueNotFound(id.to_string()))
    }

    /// Insert or replace an issue by ID. Returns the previous value.
    pub fn upsert_issue(&mut self, issue: Issue) -> Option<Issue> {
        self.issues.insert(issue.id.clone(), issue)
    }

    /// Iterate all issues in deterministic ID order.
    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.values()
    }

    /// Issues matching `filter`, oldest first.
    pub fn list(&self, filter: &IssueFilter) -> Vec<&Issue> {
        let mut matched: Vec<&Issue> = self.issues().filter(|i| filter.matches(i)).collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Add a typed dependency edge to an issue.
    ///
    /// Both endpoints must exist. Duplicate (issue, depends_on, kind) triples
    /// are rejected deterministically.
    pub fn add_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        kind: DepKind,
        created_by: &str,
    ) -> Result<(), IndexError> {
        let mut dependency = Dependency::new(issue_id, depends_on_id, kind)?;
        if self.issue(depends_on_id).is_none() {
            return Err(IndexError::IssueNotFound(depends_on_id.to_string()));
        }

        let issue = self.require_mut(issue_id)?;
        if issue
            .dependencies
            .iter()
            .any(|d| d.depends_on_id == depends_on_id && d.dep_type == kind)
        {
            return Err(IndexError::DependencyAlreadyExists {
                issue_id: issue_id.to_string(),
                depends_on_id: depends_on_id.to_string(),
                kind,
            });
        }

        let now = Utc::now();
        dependency.created_at = Some(now);
        dependency.created_by = created_by.to_string();
        issue.dependencies.push(dependency);
        issue.updated_at = now;
        issue.record(
            created_by,
            now,
            AuditAction::DependencyAdded {
                depends_on_id: depends_on_id.to_string(),
                kind,
            },
        );
        Ok(())
    }

    /// Remove every edge `issue_id -> depends_on_id`, or only the one of
    /// `kind` when given.
    pub fn remove_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        kind: Option<DepKind>,
        actor: &str,
    ) -> Result<(), IndexError> {
        let issue = self.require_mut(issue_id)?;
        let mut removed = Vec::new();
        issue.dependencies.retain(|d| {
            let hit = d.depends_on_id == depends_on_id && kind.is_none_or(|k| d.dep_type == k);
            if hit {
                removed.push(d.dep_type);
            }
            !hit
        });
        if removed.is_empty() {
            return Err(IndexError::DependencyNotFound {
                issue_id: issue_id.to_string(),
                depends_on_id: depends_on_id.to_string(),
            });
        }

        let now = Utc::now();
        issue.updated_at = now;
        for kind in removed {
            issue.record(
                actor,
                now,
                AuditAction::DependencyRemoved {
                    depends_on_id: depends_on_id.to_string(),
                    kind,
                },
            );
        }
        Ok(())
    }

    /// Close an issue. The record stays in the index.
    pub fn close(&mut self, id: &str, reason: &str, actor: &str) -> Result<&Issue, IndexError> {
        let issue = self.require_mut(id)?;
        issue.close(reason, actor, Utc::now())?;
        Ok(issue)
    }

    pub fn transition(
        &mut self,
        id: &str,
        next: Status,
        actor: &str,
    ) -> Result<&Issue, IndexError> {
        let issue = self.require_mut(id)?;
        issue.transition(next, actor, Utc::now())?;
        Ok(issue)
    }

    /// Iterate dependencies declared by `issue_id`.
    pub fn dependencies_of(&self, issue_id: &str) -> impl Iterator<Item = &Dependency> {
        self.issue(issue_id)
            .into_iter()
            .flat_map(|issue| issue.dependencies.iter())
    }

    /// Issues that declare an edge pointing at `issue_id`.
    pub fn dependents_of(&self, issue_id: &str) -> Vec<&Dependency> {
        self.issues()
            .flat_map(|issue| issue.dependencies.iter())
            .filter(|dep| dep.depends_on_id == issue_id)
            .collect()
    }
}
