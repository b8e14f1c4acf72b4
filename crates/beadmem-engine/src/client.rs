//! Typed client over the engine executable.

use crate::args::{self, IssueUpdate, NewIssue, Operation, ReadyFilter};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, signals_not_initialized};
use crate::runner::{CommandRunner, Invocation, ProcessOutput, SystemRunner};
use beadmem_bd::{BlockedIssue, DepKind, Issue, IssueFilter};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Instant;

/// Aggregate counts reported by `stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineStats {
    pub total_issues: u64,
    pub open_issues: u64,
    pub in_progress_issues: u64,
    pub blocked_issues: u64,
    pub closed_issues: u64,
    pub ready_issues: u64,
}

#[derive(Deserialize)]
struct BlockedRow {
    #[serde(flatten)]
    issue: Issue,
    #[serde(default)]
    blocked_by: Vec<String>,
}

#[derive(Deserialize)]
struct VersionInfo {
    version: String,
}

/// Client for one engine workspace.
///
/// Every call validates arguments, runs the executable once under the
/// operation's timeout and parses the JSON reply. Nothing is retried.
#[derive(Debug)]
pub struct EngineClient<R = SystemRunner> {
    config: EngineConfig,
    runner: R,
    available: OnceLock<bool>,
}

impl EngineClient<SystemRunner> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_runner(config, SystemRunner)
    }
}

impl<R: CommandRunner> EngineClient<R> {
    pub fn with_runner(config: EngineConfig, runner: R) -> Self {
        Self {
            config,
            runner,
            available: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Whether the executable can be launched. Checked once per client.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            match self.execute(Operation::Version, args::bare_args(Operation::Version)) {
                Ok(_) => true,
                Err(EngineError::NotInstalled { .. }) => false,
                // The executable launched; whatever else failed is not
                // an availability problem.
                Err(_) => true,
            }
        })
    }

    /// Whether the working directory holds an initialized engine workspace.
    pub fn is_initialized(&self) -> EngineResult<bool> {
        match self.execute(Operation::Status, args::bare_args(Operation::Status)) {
            Ok(_) => Ok(true),
            Err(EngineError::NotInitialized { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn version(&self) -> EngineResult<String> {
        let info: VersionInfo =
            self.execute_as(Operation::Version, args::bare_args(Operation::Version))?;
        Ok(info.version)
    }

    /// Compare the engine version against `minimum` (dotted numeric).
    pub fn meets_min_version(&self, minimum: &str) -> EngineResult<bool> {
        let version = self.version()?;
        Ok(version_at_least(&version, minimum))
    }

    pub fn create_issue(&self, issue: &NewIssue) -> EngineResult<Issue> {
        let value = self.execute(Operation::Create, args::create_args(issue)?)?;
        self.single(Operation::Create, value)
    }

    pub fn show_issue(&self, id: &str) -> EngineResult<Issue> {
        let value = self.execute(Operation::Show, args::show_args(id)?)?;
        self.single(Operation::Show, value)
    }

    pub fn list_issues(&self, filter: &IssueFilter) -> EngineResult<Vec<Issue>> {
        self.execute_as(Operation::List, args::list_args(filter)?)
    }

    pub fn update_issue(&self, id: &str, update: &IssueUpdate) -> EngineResult<Issue> {
        let value = self.execute(Operation::Update, args::update_args(id, update)?)?;
        self.single(Operation::Update, value)
    }

    pub fn close_issue(&self, id: &str, reason: &str) -> EngineResult<Issue> {
        let value = self.execute(Operation::Close, args::close_args(id, reason)?)?;
        self.single(Operation::Close, value)
    }

    pub fn reopen_issue(&self, id: &str) -> EngineResult<Issue> {
        let value = self.execute(Operation::Reopen, args::reopen_args(id)?)?;
        self.single(Operation::Reopen, value)
    }

    /// Engine-level delete. The memory layer closes instead.
    pub fn delete_issue(&self, id: &str) -> EngineResult<Value> {
        self.execute(Operation::Delete, args::delete_args(id)?)
    }

    pub fn add_dependency(
        &self,
        issue_id: &str,
        depends_on_id: &str,
        kind: DepKind,
    ) -> EngineResult<()> {
        self.execute(
            Operation::DepAdd,
            args::dep_add_args(issue_id, depends_on_id, kind)?,
        )?;
        Ok(())
    }

    pub fn remove_dependency(&self, issue_id: &str, depends_on_id: &str) -> EngineResult<()> {
        self.execute(
            Operation::DepRemove,
            args::dep_remove_args(issue_id, depends_on_id)?,
        )?;
        Ok(())
    }

    /// The engine's own tree rendering, unparsed.
    pub fn dependency_tree(&self, id: &str) -> EngineResult<Value> {
        self.execute(Operation::DepTree, args::dep_tree_args(id)?)
    }

    pub fn ready_work(&self, filter: &ReadyFilter) -> EngineResult<Vec<Issue>> {
        self.execute_as(Operation::Ready, args::ready_args(filter)?)
    }

    pub fn blocked_issues(&self) -> EngineResult<Vec<BlockedIssue>> {
        let rows: Vec<BlockedRow> =
            self.execute_as(Operation::Blocked, args::bare_args(Operation::Blocked))?;
        Ok(rows
            .into_iter()
            .map(|row| BlockedIssue {
                issue: row.issue,
                blocked_by: row.blocked_by,
                unknown: Vec::new(),
            })
            .collect())
    }

    pub fn stats(&self) -> EngineResult<EngineStats> {
        self.execute_as(Operation::Stats, args::bare_args(Operation::Stats))
    }

    /// Rebuild the engine's index from a JSONL log.
    pub fn import_log(&self, path: &Path) -> EngineResult<Value> {
        self.execute(Operation::Import, args::import_args(path)?)
    }

    /// Write the engine's state to a JSONL log.
    pub fn export_log(&self, path: &Path) -> EngineResult<Value> {
        self.execute(Operation::Export, args::export_args(path)?)
    }

    pub fn compact(&self) -> EngineResult<Value> {
        self.execute(Operation::Compact, args::bare_args(Operation::Compact))
    }

    /// Run one invocation and return the unwrapped JSON payload.
    pub fn execute(&self, operation: Operation, args: Vec<String>) -> EngineResult<Value> {
        let invocation = Invocation {
            operation,
            program: self.config.program.clone(),
            args,
            cwd: self.config.working_dir.clone(),
            timeout: self.config.timeouts.for_class(operation.timeout_class()),
        };

        let started = Instant::now();
        let result = self
            .runner
            .run(&invocation)
            .and_then(|output| interpret(&invocation, output));
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::debug!(
                operation = operation.as_str(),
                elapsed_ms,
                "engine call succeeded"
            ),
            Err(err) => tracing::debug!(
                operation = operation.as_str(),
                elapsed_ms,
                error = %err,
                "engine call failed"
            ),
        }
        result
    }

    fn execute_as<T: DeserializeOwned>(
        &self,
        operation: Operation,
        args: Vec<String>,
    ) -> EngineResult<T> {
        let value = self.execute(operation, args)?;
        decode(operation, value)
    }

    /// Accept either an object or a one-element array.
    fn single(&self, operation: Operation, value: Value) -> EngineResult<Issue> {
        let value = match value {
            Value::Array(mut items) => {
                if items.is_empty() {
                    return Err(EngineError::Parse {
                        args: operation.to_string(),
                        message: "expected one record, got an empty array".to_string(),
                    });
                }
                items.swap_remove(0)
            }
            other => other,
        };
        decode(operation, value)
    }
}

fn decode<T: DeserializeOwned>(operation: Operation, value: Value) -> EngineResult<T> {
    serde_json::from_value(value).map_err(|err| EngineError::Parse {
        args: operation.to_string(),
        message: err.to_string(),
    })
}

/// Classify a finished process and unwrap its JSON payload.
fn interpret(invocation: &Invocation, output: ProcessOutput) -> EngineResult<Value> {
    let args = invocation.display_args();
    if !output.is_success() {
        let stderr = output.stderr.trim().to_string();
        if signals_not_initialized(&stderr) {
            return Err(EngineError::NotInitialized { message: stderr });
        }
        return Err(EngineError::Process {
            args,
            code: output.code,
            stderr,
        });
    }

    let stdout = output.stdout.trim();
    if stdout.is_empty() {
        return Err(EngineError::Parse {
            args,
            message: "empty output".to_string(),
        });
    }
    let value: Value = serde_json::from_str(stdout).map_err(|err| EngineError::Parse {
        args: args.clone(),
        message: err.to_string(),
    })?;
    unwrap_envelope(&args, value)
}

/// Some engine versions wrap replies as `{"success": bool, "data" | "error"}`.
fn unwrap_envelope(args: &str, value: Value) -> EngineResult<Value> {
    let Value::Object(mut map) = value else {
        return Ok(value);
    };
    match map.get("success").and_then(Value::as_bool) {
        Some(true) => Ok(map.remove("data").unwrap_or(Value::Object(map))),
        Some(false) => {
            let message = map
                .get("error")
                .or_else(|| map.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unspecified error")
                .to_string();
            if signals_not_initialized(&message) {
                Err(EngineError::NotInitialized { message })
            } else {
                Err(EngineError::Rejected {
                    args: args.to_string(),
                    message,
                })
            }
        }
        None => Ok(Value::Object(map)),
    }
}

/// Dotted numeric comparison; a leading `v` and pre-release suffixes are
/// ignored.
pub fn version_at_least(version: &str, minimum: &str) -> bool {
    fn parts(raw: &str) -> Vec<u64> {
        raw.trim()
            .trim_start_matches('v')
            .split(['-', '+', ' '])
            .next()
            .unwrap_or_default()
            .split('.')
            .map(|part| part.parse().unwrap_or(0))
            .collect()
    }
    let (have, want) = (parts(version), parts(minimum));
    let len = have.len().max(want.len());
    for i in 0..len {
        let h = have.get(i).copied().unwrap_or(0);
        let w = want.get(i).copied().unwrap_or(0);
        if h != w {
            return h > w;
        }
    }
    true
}
