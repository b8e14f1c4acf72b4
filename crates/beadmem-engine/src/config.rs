//! Engine location and per-operation timeouts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How long an operation may run before it is killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutClass {
    /// Reads and writes of one record.
    SingleRecord,
    /// List, ready, tree and bulk file operations.
    Query,
    /// AI-assisted compaction.
    Compaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub single_record_secs: u64,
    pub query_secs: u64,
    pub compaction_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            single_record_secs: 5,
            query_secs: 10,
            compaction_secs: 120,
        }
    }
}

impl Timeouts {
    pub fn for_class(&self, class: TimeoutClass) -> Duration {
        let secs = match class {
            TimeoutClass::SingleRecord => self.single_record_secs,
            TimeoutClass::Query => self.query_secs,
            TimeoutClass::Compaction => self.compaction_secs,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Executable name (resolved through `PATH`) or path.
    pub program: PathBuf,
    /// Working directory for every invocation; inherits the caller's when unset.
    pub working_dir: Option<PathBuf>,
    pub timeouts: Timeouts,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("bd"),
            working_dir: None,
            timeouts: Timeouts::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}
