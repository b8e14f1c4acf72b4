//! Typed failures of engine invocations.

use beadmem_bd::ValidationError;
use std::time::Duration;

pub type EngineResult<T> = Result<T, EngineError>;

/// Every way an engine call can fail.
///
/// The adapter reports these and never recovers from them; callers decide
/// whether to retry or degrade.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine executable not found: {program}")]
    NotInstalled { program: String },

    #[error("engine workspace is not initialized: {message}")]
    NotInitialized { message: String },

    #[error("engine command failed: {args} (exit {}): {stderr}", code_label(*.code))]
    Process {
        args: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("engine rejected {args}: {message}")]
    Rejected { args: String, message: String },

    #[error("unable to parse engine output for {args}: {message}")]
    Parse { args: String, message: String },

    #[error("engine command timed out after {timeout:?}: {args}")]
    Timeout { args: String, timeout: Duration },

    #[error("failed to run engine command {args}: {message}")]
    Spawn { args: String, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

fn code_label(code: Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl EngineError {
    /// The engine cannot be reached at all; local-only mode applies.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            EngineError::NotInstalled { .. } | EngineError::NotInitialized { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout { .. })
    }
}

const NOT_INITIALIZED_MARKERS: [&str; 4] = [
    "not initialized",
    "not a beads repository",
    "no beads database",
    "run 'bd init'",
];

/// Whether diagnostic text signals an uninitialized workspace.
pub fn signals_not_initialized(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    NOT_INITIALIZED_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_error_message_includes_exit_code() {
        let err = EngineError::Process {
            args: "show bd-1 --json".to_string(),
            code: Some(3),
            stderr: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "engine command failed: show bd-1 --json (exit 3): boom"
        );

        let killed = EngineError::Process {
            args: "list --json".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert!(killed.to_string().contains("(exit signal)"));
    }

    #[test]
    fn unavailability_covers_install_and_init() {
        assert!(
            EngineError::NotInstalled {
                program: "bd".to_string()
            }
            .is_unavailable()
        );
        assert!(
            EngineError::NotInitialized {
                message: String::new()
            }
            .is_unavailable()
        );
        assert!(
            !EngineError::Timeout {
                args: String::new(),
                timeout: Duration::from_secs(1)
            }
            .is_unavailable()
        );
    }

    #[test]
    fn not_initialized_detection_is_case_insensitive() {
        assert!(signals_not_initialized("Error: Beads NOT INITIALIZED here"));
        assert!(signals_not_initialized("no beads database found"));
        assert!(!signals_not_initialized("issue bd-9 not found"));
    }
}
