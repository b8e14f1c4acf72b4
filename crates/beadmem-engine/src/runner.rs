//! Process execution seam.
//!
//! `CommandRunner` is the only place a child process is spawned. Tests swap
//! in the runners from [`crate::fakes`].

use crate::args::Operation;
use crate::error::{EngineError, EngineResult};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// One fully-resolved engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub operation: Operation,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl Invocation {
    /// Arguments joined for diagnostics.
    pub fn display_args(&self) -> String {
        self.args.join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an invocation to completion.
///
/// Implementations report spawn failures, missing executables and timeouts
/// as errors. A process that ran and exited non-zero is an `Ok` output;
/// classification happens in the client.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> EngineResult<ProcessOutput>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
    fn run(&self, invocation: &Invocation) -> EngineResult<ProcessOutput> {
        (**self).run(invocation)
    }
}

/// Spawns the real executable with piped output and a hard deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> EngineResult<ProcessOutput> {
        let args = invocation.display_args();
        if let Some(cwd) = &invocation.cwd
            && !cwd.is_dir()
        {
            return Err(EngineError::Spawn {
                args,
                message: format!("working directory does not exist: {}", cwd.display()),
            });
        }

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                EngineError::NotInstalled {
                    program: invocation.program.display().to_string(),
                }
            } else {
                EngineError::Spawn {
                    args: args.clone(),
                    message: err.to_string(),
                }
            }
        })?;

        // Drain both pipes concurrently so a chatty child cannot fill one
        // and stall before exit.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + invocation.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::warn!(
                        operation = invocation.operation.as_str(),
                        timeout_ms = invocation.timeout.as_millis() as u64,
                        "engine command killed after timeout"
                    );
                    return Err(EngineError::Timeout {
                        args,
                        timeout: invocation.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(EngineError::Spawn {
                        args,
                        message: err.to_string(),
                    });
                }
            }
        };

        Ok(ProcessOutput {
            code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

fn drain(mut pipe: impl Read + Send + 'static) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// A grandchild holding the pipe open must not hang the caller, so the
/// reader gets a bounded grace period after the child exits.
fn collect(pipe: Option<Receiver<Vec<u8>>>) -> String {
    pipe.and_then(|rx| rx.recv_timeout(DRAIN_GRACE).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
