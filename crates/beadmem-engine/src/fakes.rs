//! In-process runners for tests.
//!
//! `FakeEngine` speaks the same argument grammar as the real executable and
//! keeps its records in an [`IssueIndex`]. `ScriptedRunner` replays canned
//! outputs and records every invocation.

use crate::args::ReadyFilter;
use crate::error::{EngineError, EngineResult};
use crate::runner::{CommandRunner, Invocation, ProcessOutput};
use beadmem_bd::{
    AuditAction, DEFAULT_TREE_DEPTH, DepKind, Issue, IssueFilter, IssueIndex, Priority, Status,
    append_issue_to_path, blocked_issues, dependency_tree, read_issues_from_path, ready_issues,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// FakeEngine
// ---------------------------------------------------------------------------

/// How the fake presents itself to the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FakeMode {
    #[default]
    Ready,
    /// Every call fails as if the executable were missing.
    NotInstalled,
    /// Every call exits 1 with an uninitialized-workspace message.
    NotInitialized,
}

#[derive(Debug, Default)]
struct FakeState {
    index: IssueIndex,
    next_id: u64,
    mode: FakeMode,
    calls: Vec<Vec<String>>,
}

/// In-memory engine. Mutations are appended to `log_path` when set.
#[derive(Debug)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
    log_path: Option<PathBuf>,
    version: String,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            log_path: None,
            version: "0.20.1".to_string(),
        }
    }

    pub fn with_mode(mode: FakeMode) -> Self {
        let fake = Self::new();
        fake.set_mode(mode);
        fake
    }

    pub fn with_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn set_mode(&self, mode: FakeMode) {
        lock(&self.state).mode = mode;
    }

    /// Insert a record directly, bypassing the command grammar.
    pub fn seed(&self, issue: Issue) {
        lock(&self.state).index.upsert_issue(issue);
    }

    pub fn issue(&self, id: &str) -> Option<Issue> {
        lock(&self.state).index.issue(id).cloned()
    }

    pub fn issues(&self) -> Vec<Issue> {
        lock(&self.state).index.issues().cloned().collect()
    }

    /// Argument vectors of every call received, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.state).calls.clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state).calls.len()
    }

    fn persist(&self, issue: &Issue) -> Result<(), String> {
        match &self.log_path {
            Some(path) => append_issue_to_path(path, issue).map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }

    fn dispatch(&self, state: &mut FakeState, args: &ParsedArgs) -> Result<Value, String> {
        let words: Vec<&str> = args.words.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["create"] => self.create(state, args),
            ["show", id] => {
                let issue = state
                    .index
                    .issue(id)
                    .ok_or_else(|| format!("issue {id} not found"))?;
                Ok(json!([to_json(issue)?]))
            }
            ["list"] => {
                let filter = list_filter(args)?;
                to_json(&state.index.list(&filter))
            }
            ["update", id] => self.update(state, id, args),
            ["close", id] => {
                let reason = args.value("reason").unwrap_or_default();
                let issue = state
                    .index
                    .close(id, reason, "")
                    .map_err(|e| e.to_string())?
                    .clone();
                self.persist(&issue)?;
                to_json(&issue)
            }
            ["reopen", id] => {
                let issue = state
                    .index
                    .transition(id, Status::Open, "")
                    .map_err(|e| e.to_string())?
                    .clone();
                self.persist(&issue)?;
                to_json(&issue)
            }
            ["delete", id] => {
                if !args.has("force") {
                    return Err("delete requires --force".to_string());
                }
                // Records are kept; closing stands in for removal.
                let issue = state
                    .index
                    .close(id, "deleted", "")
                    .map_err(|e| e.to_string())?
                    .clone();
                self.persist(&issue)?;
                Ok(json!({ "deleted": id }))
            }
            ["dep", "add", issue_id, depends_on_id] => {
                let kind: DepKind = args
                    .value("type")
                    .unwrap_or("blocks")
                    .parse()
                    .map_err(|e: beadmem_bd::ValidationError| e.to_string())?;
                state
                    .index
                    .add_dependency(issue_id, depends_on_id, kind, "")
                    .map_err(|e| e.to_string())?;
                self.persist_id(state, issue_id)?;
                Ok(json!({
                    "status": "added",
                    "issue_id": issue_id,
                    "depends_on_id": depends_on_id,
                    "type": kind,
                }))
            }
            ["dep", "remove", issue_id, depends_on_id] => {
                state
                    .index
                    .remove_dependency(issue_id, depends_on_id, None, "")
                    .map_err(|e| e.to_string())?;
                self.persist_id(state, issue_id)?;
                Ok(json!({
                    "status": "removed",
                    "issue_id": issue_id,
                    "depends_on_id": depends_on_id,
                }))
            }
            ["dep", "tree", id] => to_json(&dependency_tree(&state.index, id, DEFAULT_TREE_DEPTH)),
            ["ready"] => {
                let filter = ready_filter(args)?;
                let ready: Vec<&Issue> = ready_issues(&state.index)
                    .into_iter()
                    .filter(|issue| filter.matches(issue))
                    .take(filter.limit.unwrap_or(usize::MAX))
                    .collect();
                to_json(&ready)
            }
            ["blocked"] => {
                let mut rows = Vec::new();
                for blocked in blocked_issues(&state.index) {
                    let mut row = to_json(&blocked.issue)?;
                    if let Value::Object(map) = &mut row {
                        map.insert("blocked_by".to_string(), json!(blocked.blocked_by));
                    }
                    rows.push(row);
                }
                Ok(Value::Array(rows))
            }
            ["stats"] => Ok(stats(&state.index)),
            ["import"] => {
                let path = args.value("input").ok_or("import requires --input")?;
                let issues = read_issues_from_path(Path::new(path))
                    .map_err(|e| format!("import failed: {e}"))?;
                let count = issues.len();
                for issue in issues {
                    state.index.upsert_issue(issue);
                }
                Ok(json!({ "imported": count }))
            }
            ["export"] => {
                let path = args.value("output").ok_or("export requires --output")?;
                state
                    .index
                    .save_jsonl(Path::new(path))
                    .map_err(|e| format!("export failed: {e}"))?;
                Ok(json!({ "exported": state.index.len() }))
            }
            ["compact"] => Ok(json!({ "compacted": 0 })),
            ["version"] => Ok(json!({ "version": self.version })),
            ["status"] => Ok(json!({
                "initialized": true,
                "total_issues": state.index.len(),
            })),
            other => Err(format!("unknown command: {}", other.join(" "))),
        }
    }

    fn create(&self, state: &mut FakeState, args: &ParsedArgs) -> Result<Value, String> {
        let title = args.value("title").ok_or("title is required")?;
        state.next_id += 1;
        let mut issue = Issue::new(format!("bd-{}", state.next_id), title);
        issue.description = args.value("description").unwrap_or_default().to_string();
        if let Some(raw) = args.value("type") {
            issue.issue_type = raw
                .parse()
                .map_err(|e: beadmem_bd::ValidationError| e.to_string())?;
        }
        if let Some(raw) = args.value("priority") {
            issue.priority = parse_priority(raw)?;
        }
        issue.assignee = args.value("assignee").unwrap_or_default().to_string();
        issue.labels = args.values("label");

        self.persist(&issue)?;
        let value = to_json(&issue)?;
        state.index.upsert_issue(issue);
        Ok(value)
    }

    fn update(&self, state: &mut FakeState, id: &str, args: &ParsedArgs) -> Result<Value, String> {
        let issue = state
            .index
            .issue_mut(id)
            .ok_or_else(|| format!("issue {id} not found"))?;
        let now = Utc::now();
        let mut fields = Vec::new();

        if let Some(title) = args.value("title") {
            issue.title = title.to_string();
            fields.push("title".to_string());
        }
        if let Some(description) = args.value("description") {
            issue.description = description.to_string();
            fields.push("description".to_string());
        }
        if let Some(raw) = args.value("priority") {
            issue.priority = parse_priority(raw)?;
            fields.push("priority".to_string());
        }
        if let Some(assignee) = args.value("assignee") {
            issue.assignee = assignee.to_string();
            fields.push("assignee".to_string());
        }
        let added = args.values("add-label");
        let removed = args.values("remove-label");
        if !added.is_empty() || !removed.is_empty() {
            issue.labels.retain(|label| !removed.contains(label));
            for label in added {
                if !issue.labels.contains(&label) {
                    issue.labels.push(label);
                }
            }
            fields.push("labels".to_string());
        }
        if !fields.is_empty() {
            issue.updated_at = now;
            issue.record("", now, AuditAction::Updated { fields });
        }
        if let Some(raw) = args.value("status") {
            let next: Status = raw
                .parse()
                .map_err(|e: beadmem_bd::ValidationError| e.to_string())?;
            if next != issue.status {
                issue.transition(next, "", now).map_err(|e| e.to_string())?;
            }
        }

        let issue = issue.clone();
        self.persist(&issue)?;
        to_json(&issue)
    }

    fn persist_id(&self, state: &FakeState, id: &str) -> Result<(), String> {
        match state.index.issue(id) {
            Some(issue) => self.persist(issue),
            None => Ok(()),
        }
    }
}

impl CommandRunner for FakeEngine {
    fn run(&self, invocation: &Invocation) -> EngineResult<ProcessOutput> {
        let mut state = lock(&self.state);
        state.calls.push(invocation.args.clone());
        match state.mode {
            FakeMode::NotInstalled => {
                return Err(EngineError::NotInstalled {
                    program: invocation.program.display().to_string(),
                });
            }
            FakeMode::NotInitialized => {
                return Ok(ProcessOutput::failure(
                    1,
                    "Error: no beads database found (run 'bd init')",
                ));
            }
            FakeMode::Ready => {}
        }

        let Some((last, rest)) = invocation.args.split_last() else {
            return Ok(ProcessOutput::failure(2, "Error: missing command"));
        };
        if last != "--json" {
            return Ok(ProcessOutput::failure(2, "Error: --json is required"));
        }

        let parsed = ParsedArgs::parse(rest);
        Ok(match self.dispatch(&mut state, &parsed) {
            Ok(value) => ProcessOutput::success(value.to_string()),
            Err(message) => ProcessOutput::failure(1, format!("Error: {message}")),
        })
    }
}

#[derive(Debug, Default)]
struct ParsedArgs {
    words: Vec<String>,
    values: Vec<(String, String)>,
    switches: Vec<String>,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut parsed = Self::default();
        for arg in args {
            match arg.strip_prefix("--") {
                Some(flag) => match flag.split_once('=') {
                    Some((name, value)) => parsed
                        .values
                        .push((name.to_string(), value.to_string())),
                    None => parsed.switches.push(flag.to_string()),
                },
                None => parsed.words.push(arg.clone()),
            }
        }
        parsed
    }

    fn value(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn values(&self, name: &str) -> Vec<String> {
        self.values
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn has(&self, name: &str) -> bool {
        self.switches.iter().any(|s| s == name)
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    let value: i64 = raw
        .parse()
        .map_err(|_| format!("invalid priority: {raw}"))?;
    Priority::new(value).map_err(|e| e.to_string())
}

fn parse_limit(raw: Option<&str>) -> Result<Option<usize>, String> {
    raw.map(|v| v.parse().map_err(|_| format!("invalid limit: {v}")))
        .transpose()
}

fn list_filter(args: &ParsedArgs) -> Result<IssueFilter, String> {
    Ok(IssueFilter {
        status: args
            .value("status")
            .map(|raw| raw.parse().map_err(|e: beadmem_bd::ValidationError| e.to_string()))
            .transpose()?,
        include_closed: args.has("all"),
        labels: args.values("label"),
        assignee: args.value("assignee").map(str::to_string),
        issue_type: args
            .value("type")
            .map(|raw| raw.parse().map_err(|e: beadmem_bd::ValidationError| e.to_string()))
            .transpose()?,
        limit: parse_limit(args.value("limit"))?,
    })
}

fn ready_filter(args: &ParsedArgs) -> Result<ReadyFilter, String> {
    Ok(ReadyFilter {
        assignee: args.value("assignee").map(str::to_string),
        labels: args.values("label"),
        max_priority: args.value("priority").map(parse_priority).transpose()?,
        limit: parse_limit(args.value("limit"))?,
    })
}

fn stats(index: &IssueIndex) -> Value {
    let count = |status: Status| index.issues().filter(|i| i.status == status).count();
    json!({
        "total_issues": index.len(),
        "open_issues": count(Status::Open),
        "in_progress_issues": count(Status::InProgress),
        "blocked_issues": blocked_issues(index).len(),
        "closed_issues": count(Status::Closed),
        "ready_issues": ready_issues(index).len(),
    })
}

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

/// Replays queued results in order and records each invocation.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<EngineResult<ProcessOutput>>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stdout(&self, stdout: impl Into<String>) -> &Self {
        lock(&self.responses).push_back(Ok(ProcessOutput::success(stdout)));
        self
    }

    pub fn push_json(&self, value: &Value) -> &Self {
        self.push_stdout(value.to_string())
    }

    pub fn push_exit(&self, code: i32, stderr: impl Into<String>) -> &Self {
        lock(&self.responses).push_back(Ok(ProcessOutput::failure(code, stderr)));
        self
    }

    pub fn push_error(&self, error: EngineError) -> &Self {
        lock(&self.responses).push_back(Err(error));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        lock(&self.invocations).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> EngineResult<ProcessOutput> {
        lock(&self.invocations).push(invocation.clone());
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| {
                Err(EngineError::Process {
                    args: invocation.display_args(),
                    code: None,
                    stderr: "no scripted response".to_string(),
                })
            })
    }
}
