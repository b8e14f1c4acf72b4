//! Engine command grammar.
//!
//! Every builder validates its inputs, emits an argument vector (never a
//! shell string) and ends with `--json`. Free-text values use the
//! `--flag=value` form so a value can never be read as another flag.

use crate::config::TimeoutClass;
use crate::validate::{
    validate_assignee, validate_description, validate_id, validate_labels, validate_reason,
    validate_title,
};
use beadmem_bd::{DepKind, Issue, IssueFilter, IssueType, Priority, Status, ValidationError};
use std::fmt;
use std::path::Path;

/// Engine operations the adapter knows how to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Show,
    List,
    Update,
    Close,
    Reopen,
    Delete,
    DepAdd,
    DepRemove,
    DepTree,
    Ready,
    Blocked,
    Stats,
    Import,
    Export,
    Compact,
    Version,
    Status,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Show => "show",
            Operation::List => "list",
            Operation::Update => "update",
            Operation::Close => "close",
            Operation::Reopen => "reopen",
            Operation::Delete => "delete",
            Operation::DepAdd => "dep add",
            Operation::DepRemove => "dep remove",
            Operation::DepTree => "dep tree",
            Operation::Ready => "ready",
            Operation::Blocked => "blocked",
            Operation::Stats => "stats",
            Operation::Import => "import",
            Operation::Export => "export",
            Operation::Compact => "compact",
            Operation::Version => "version",
            Operation::Status => "status",
        }
    }

    pub fn timeout_class(&self) -> TimeoutClass {
        match self {
            Operation::Create
            | Operation::Show
            | Operation::Update
            | Operation::Close
            | Operation::Reopen
            | Operation::DepAdd
            | Operation::DepRemove
            | Operation::Stats
            | Operation::Version
            | Operation::Status => TimeoutClass::SingleRecord,
            Operation::List
            | Operation::Delete
            | Operation::DepTree
            | Operation::Ready
            | Operation::Blocked
            | Operation::Import
            | Operation::Export => TimeoutClass::Query,
            Operation::Compact => TimeoutClass::Compaction,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields for a new record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub issue_type: IssueType,
    pub priority: Priority,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
}

impl NewIssue {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn issue_type(mut self, issue_type: IssueType) -> Self {
        self.issue_type = issue_type;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }
}

/// Partial update; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
}

impl IssueUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.assignee.is_none()
            && self.add_labels.is_empty()
            && self.remove_labels.is_empty()
    }

    /// Names of the fields this update touches.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.status.is_some() {
            fields.push("status");
        }
        if self.priority.is_some() {
            fields.push("priority");
        }
        if self.assignee.is_some() {
            fields.push("assignee");
        }
        if !self.add_labels.is_empty() || !self.remove_labels.is_empty() {
            fields.push("labels");
        }
        fields
    }
}

/// Narrowing applied to ready work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadyFilter {
    pub assignee: Option<String>,
    /// Every label listed must be present.
    pub labels: Vec<String>,
    /// Only issues at this priority or more urgent.
    pub max_priority: Option<Priority>,
    pub limit: Option<usize>,
}

impl ReadyFilter {
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, issue: &Issue) -> bool {
        if let Some(assignee) = &self.assignee
            && &issue.assignee != assignee
        {
            return false;
        }
        if let Some(max) = self.max_priority
            && issue.priority > max
        {
            return false;
        }
        self.labels.iter().all(|label| issue.has_label(label))
    }
}

struct ArgList(Vec<String>);

impl ArgList {
    fn new(words: &[&str]) -> Self {
        Self(words.iter().map(|w| (*w).to_string()).collect())
    }

    fn positional(mut self, value: &str) -> Self {
        self.0.push(value.to_string());
        self
    }

    fn flag(mut self, name: &str) -> Self {
        self.0.push(format!("--{name}"));
        self
    }

    fn value(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.0.push(format!("--{name}={value}"));
        self
    }

    fn opt(self, name: &str, value: Option<impl fmt::Display>) -> Self {
        match value {
            Some(value) => self.value(name, value),
            None => self,
        }
    }

    fn repeated(mut self, name: &str, values: &[String]) -> Self {
        for value in values {
            self.0.push(format!("--{name}={value}"));
        }
        self
    }

    fn finish(mut self) -> Vec<String> {
        self.0.push("--json".to_string());
        self.0
    }
}

pub fn create_args(issue: &NewIssue) -> Result<Vec<String>, ValidationError> {
    validate_title(&issue.title)?;
    validate_description(&issue.description)?;
    validate_labels(&issue.labels)?;
    if let Some(assignee) = &issue.assignee {
        validate_assignee(assignee)?;
    }
    Ok(ArgList::new(&["create"])
        .value("title", &issue.title)
        .value("description", &issue.description)
        .value("type", issue.issue_type)
        .value("priority", issue.priority)
        .opt("assignee", issue.assignee.as_deref())
        .repeated("label", &issue.labels)
        .finish())
}

pub fn show_args(id: &str) -> Result<Vec<String>, ValidationError> {
    validate_id(id)?;
    Ok(ArgList::new(&["show"]).positional(id).finish())
}

pub fn list_args(filter: &IssueFilter) -> Result<Vec<String>, ValidationError> {
    validate_labels(&filter.labels)?;
    if let Some(assignee) = &filter.assignee {
        validate_assignee(assignee)?;
    }
    let mut args = ArgList::new(&["list"]);
    args = match filter.status {
        Some(status) => args.value("status", status),
        None if filter.include_closed => args.flag("all"),
        None => args,
    };
    Ok(args
        .repeated("label", &filter.labels)
        .opt("assignee", filter.assignee.as_deref())
        .opt("type", filter.issue_type)
        .opt("limit", filter.limit)
        .finish())
}

pub fn update_args(id: &str, update: &IssueUpdate) -> Result<Vec<String>, ValidationError> {
    validate_id(id)?;
    if update.is_empty() {
        return Err(ValidationError::Empty { field: "update" });
    }
    if let Some(title) = &update.title {
        validate_title(title)?;
    }
    if let Some(description) = &update.description {
        validate_description(description)?;
    }
    if let Some(assignee) = &update.assignee {
        validate_assignee(assignee)?;
    }
    validate_labels(&update.add_labels)?;
    validate_labels(&update.remove_labels)?;
    Ok(ArgList::new(&["update"])
        .positional(id)
        .opt("title", update.title.as_deref())
        .opt("description", update.description.as_deref())
        .opt("status", update.status)
        .opt("priority", update.priority)
        .opt("assignee", update.assignee.as_deref())
        .repeated("add-label", &update.add_labels)
        .repeated("remove-label", &update.remove_labels)
        .finish())
}

pub fn close_args(id: &str, reason: &str) -> Result<Vec<String>, ValidationError> {
    validate_id(id)?;
    validate_reason(reason)?;
    let args = ArgList::new(&["close"]).positional(id);
    let args = if reason.is_empty() {
        args
    } else {
        args.value("reason", reason)
    };
    Ok(args.finish())
}

pub fn reopen_args(id: &str) -> Result<Vec<String>, ValidationError> {
    validate_id(id)?;
    Ok(ArgList::new(&["reopen"]).positional(id).finish())
}

pub fn delete_args(id: &str) -> Result<Vec<String>, ValidationError> {
    validate_id(id)?;
    Ok(ArgList::new(&["delete"]).positional(id).flag("force").finish())
}

pub fn dep_add_args(
    issue_id: &str,
    depends_on_id: &str,
    kind: DepKind,
) -> Result<Vec<String>, ValidationError> {
    validate_id(issue_id)?;
    validate_id(depends_on_id)?;
    if issue_id == depends_on_id {
        return Err(ValidationError::SelfDependency(issue_id.to_string()));
    }
    Ok(ArgList::new(&["dep", "add"])
        .positional(issue_id)
        .positional(depends_on_id)
        .value("type", kind)
        .finish())
}

pub fn dep_remove_args(issue_id: &str, depends_on_id: &str) -> Result<Vec<String>, ValidationError> {
    validate_id(issue_id)?;
    validate_id(depends_on_id)?;
    Ok(ArgList::new(&["dep", "remove"])
        .positional(issue_id)
        .positional(depends_on_id)
        .finish())
}

pub fn dep_tree_args(id: &str) -> Result<Vec<String>, ValidationError> {
    validate_id(id)?;
    Ok(ArgList::new(&["dep", "tree"]).positional(id).finish())
}

pub fn ready_args(filter: &ReadyFilter) -> Result<Vec<String>, ValidationError> {
    validate_labels(&filter.labels)?;
    if let Some(assignee) = &filter.assignee {
        validate_assignee(assignee)?;
    }
    Ok(ArgList::new(&["ready"])
        .opt("assignee", filter.assignee.as_deref())
        .repeated("label", &filter.labels)
        .opt("priority", filter.max_priority)
        .opt("limit", filter.limit)
        .finish())
}

pub fn import_args(path: &Path) -> Result<Vec<String>, ValidationError> {
    Ok(ArgList::new(&["import"])
        .value("input", path_value(path)?)
        .finish())
}

pub fn export_args(path: &Path) -> Result<Vec<String>, ValidationError> {
    Ok(ArgList::new(&["export"])
        .value("output", path_value(path)?)
        .finish())
}

/// Arguments for operations that take no parameters.
pub fn bare_args(op: Operation) -> Vec<String> {
    ArgList::new(&[op.as_str()]).finish()
}

fn path_value(path: &Path) -> Result<String, ValidationError> {
    let value = path.to_str().ok_or_else(|| ValidationError::Forbidden {
        field: "path",
        value: path.to_string_lossy().into_owned(),
    })?;
    if value.is_empty() {
        return Err(ValidationError::Empty { field: "path" });
    }
    if value.chars().any(char::is_control) {
        return Err(ValidationError::Forbidden {
            field: "path",
            value: value.to_string(),
        });
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(value: i64) -> Priority {
        Priority::new(value).expect("priority")
    }

    #[test]
    fn create_passes_hostile_text_as_single_values() {
        let issue = NewIssue::new("Fix $(rm -rf /); `whoami` --all")
            .description("body\nwith lines")
            .priority(p(1))
            .labels(["session:s-1", "memory:decision"]);
        let args = create_args(&issue).expect("args");
        assert_eq!(
            args,
            vec![
                "create",
                "--title=Fix $(rm -rf /); `whoami` --all",
                "--description=body\nwith lines",
                "--type=task",
                "--priority=1",
                "--label=session:s-1",
                "--label=memory:decision",
                "--json",
            ]
        );
    }

    #[test]
    fn create_rejects_invalid_fields_before_invocation() {
        assert!(create_args(&NewIssue::new("")).is_err());
        assert!(create_args(&NewIssue::new("ok").labels(["has space"])).is_err());
        assert!(create_args(&NewIssue::new("ok").assignee("--force")).is_err());
    }

    #[test]
    fn list_status_and_all_are_exclusive() {
        assert_eq!(
            list_args(&IssueFilter::default()).expect("args"),
            vec!["list", "--json"]
        );
        assert_eq!(
            list_args(&IssueFilter::all().label("a").limit(5)).expect("args"),
            vec!["list", "--all", "--label=a", "--limit=5", "--json"]
        );
        let mut filter = IssueFilter::with_status(Status::InProgress);
        filter.include_closed = true;
        assert_eq!(
            list_args(&filter).expect("args"),
            vec!["list", "--status=in_progress", "--json"]
        );
    }

    #[test]
    fn ids_are_validated() {
        assert!(show_args("--all").is_err());
        assert!(close_args("bd-1;ls", "").is_err());
        assert!(dep_add_args("bd-1", "bd-1", DepKind::Blocks).is_err());
        assert_eq!(
            dep_add_args("bd-1", "bd-2", DepKind::ParentChild).expect("args"),
            vec!["dep", "add", "bd-1", "bd-2", "--type=parent-child", "--json"]
        );
    }

    #[test]
    fn close_reason_is_optional() {
        assert_eq!(close_args("bd-1", "").expect("args"), vec!["close", "bd-1", "--json"]);
        assert_eq!(
            close_args("bd-1", "memory deleted").expect("args"),
            vec!["close", "bd-1", "--reason=memory deleted", "--json"]
        );
    }

    #[test]
    fn empty_update_is_rejected() {
        assert_eq!(
            update_args("bd-1", &IssueUpdate::default()),
            Err(ValidationError::Empty { field: "update" })
        );
        let update = IssueUpdate {
            status: Some(Status::InProgress),
            add_labels: vec!["x".to_string()],
            ..IssueUpdate::default()
        };
        assert_eq!(
            update_args("bd-1", &update).expect("args"),
            vec!["update", "bd-1", "--status=in_progress", "--add-label=x", "--json"]
        );
        assert_eq!(update.fields(), vec!["status", "labels"]);
    }

    #[test]
    fn timeout_classes_follow_operation_weight() {
        assert_eq!(Operation::Create.timeout_class(), TimeoutClass::SingleRecord);
        assert_eq!(Operation::DepAdd.timeout_class(), TimeoutClass::SingleRecord);
        assert_eq!(Operation::List.timeout_class(), TimeoutClass::Query);
        assert_eq!(Operation::Delete.timeout_class(), TimeoutClass::Query);
        assert_eq!(Operation::Compact.timeout_class(), TimeoutClass::Compaction);
    }

    #[test]
    fn ready_filter_matches_locally() {
        let mut issue = Issue::new("bd-1", "t");
        issue.priority = p(3);
        issue.labels = vec!["a".to_string()];
        assert!(ReadyFilter::default().matches(&issue));
        assert!(ReadyFilter::default().label("a").matches(&issue));
        assert!(!ReadyFilter::default().label("b").matches(&issue));
        let urgent_only = ReadyFilter {
            max_priority: Some(p(1)),
            ..ReadyFilter::default()
        };
        assert!(!urgent_only.matches(&issue));
    }
}
