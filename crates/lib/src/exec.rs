//! Execution engine: run an accepted command as a child process under a deadline.
//! No shell is used; arguments are passed as a list to avoid injection.

use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Exit code reported when the deadline elapsed before the child exited.
pub const TIMEOUT_EXIT_CODE: i32 = -1;
/// Exit code reported when the child could not be spawned or waited on.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -2;

/// How long to keep draining output after a deadline kill. Descendants that inherited the
/// pipes can keep them open past the child's death.
const KILL_DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    NonZeroExit,
    Timeout,
    SpawnFailure,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::NonZeroExit => "non_zero_exit",
            OutcomeKind::Timeout => "timeout",
            OutcomeKind::SpawnFailure => "spawn_failure",
        }
    }

    /// The process ran to an exit of its own (any exit code).
    pub fn ran_to_exit(self) -> bool {
        matches!(self, OutcomeKind::Success | OutcomeKind::NonZeroExit)
    }
}

/// Result of one execution. `stdout`/`stderr` are trimmed and present for every outcome.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub outcome: OutcomeKind,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// Internal detail for timeouts and spawn failures. Audit log only.
    pub error: Option<String>,
}

/// Server-side timeout policy: default for missing requests, ceiling for all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub default_timeout: Duration,
    pub max_execution_time: Duration,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_execution_time: Duration::from_secs(300),
        }
    }
}

impl ExecutionLimits {
    /// `requested_secs <= 0` selects the default; anything else is clamped to the maximum.
    pub fn effective_timeout(&self, requested_secs: i64) -> Duration {
        let wanted = if requested_secs <= 0 {
            self.default_timeout
        } else {
            Duration::from_secs(requested_secs as u64)
        };
        wanted.min(self.max_execution_time)
    }
}

/// Runs commands with the configured limits. Stateless apart from the limits; share freely.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    limits: ExecutionLimits,
}

impl Executor {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Run `command args...` with the caller's timeout clamped by the limits. Attempted once.
    pub async fn execute(
        &self,
        command: &str,
        args: &[String],
        requested_timeout_secs: i64,
    ) -> ExecutionResult {
        let timeout = self.limits.effective_timeout(requested_timeout_secs);
        log::debug!("running {} {:?} with timeout {:?}", command, args, timeout);
        run(command, args, timeout).await
    }
}

/// Spawn `command` with `args` and wait at most `timeout`. The child is killed if the deadline
/// elapses or if this future is dropped.
pub async fn run(command: &str, args: &[String], timeout: Duration) -> ExecutionResult {
    let started = Instant::now();
    let mut child = match Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(c) => c,
        Err(e) => {
            let error = format!("command execution failed: {}", e);
            return spawn_failure(error, started, Vec::new(), Vec::new());
        }
    };

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let mut out = Vec::new();
    let mut err = Vec::new();

    let waited = tokio::time::timeout(timeout, async {
        let (_, _, status) = tokio::join!(
            drain(stdout_pipe.as_mut(), &mut out),
            drain(stderr_pipe.as_mut(), &mut err),
            child.wait()
        );
        status
    })
    .await;

    match waited {
        Ok(Ok(status)) => {
            let duration = started.elapsed();
            let exit_code = exit_code_of(&status);
            let outcome = if exit_code == 0 {
                OutcomeKind::Success
            } else {
                OutcomeKind::NonZeroExit
            };
            ExecutionResult {
                outcome,
                exit_code,
                stdout: trimmed(&out),
                stderr: trimmed(&err),
                duration,
                error: None,
            }
        }
        Ok(Err(e)) => {
            let error = format!("command execution failed: {}", e);
            spawn_failure(error, started, out, err)
        }
        Err(_) => {
            let duration = started.elapsed();
            if let Err(e) = child.start_kill() {
                log::debug!("kill after deadline: {}", e);
            }
            if let Err(e) = child.wait().await {
                log::debug!("reaping killed child: {}", e);
            }
            let _ = tokio::time::timeout(KILL_DRAIN_GRACE, async {
                tokio::join!(
                    drain(stdout_pipe.as_mut(), &mut out),
                    drain(stderr_pipe.as_mut(), &mut err)
                )
            })
            .await;
            ExecutionResult {
                outcome: OutcomeKind::Timeout,
                exit_code: TIMEOUT_EXIT_CODE,
                stdout: trimmed(&out),
                stderr: trimmed(&err),
                duration,
                error: Some("command execution timed out".to_string()),
            }
        }
    }
}

/// Read a pipe to EOF, appending to `buf`. Bytes read before cancellation stay in `buf`.
async fn drain<R: AsyncRead + Unpin>(reader: Option<&mut R>, buf: &mut Vec<u8>) {
    if let Some(r) = reader {
        if let Err(e) = r.read_to_end(buf).await {
            log::debug!("reading child output: {}", e);
        }
    }
}

fn spawn_failure(error: String, started: Instant, out: Vec<u8>, err: Vec<u8>) -> ExecutionResult {
    ExecutionResult {
        outcome: OutcomeKind::SpawnFailure,
        exit_code: SPAWN_FAILURE_EXIT_CODE,
        stdout: trimmed(&out),
        stderr: trimmed(&err),
        duration: started.elapsed(),
        error: Some(error),
    }
}

#[cfg(unix)]
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(SPAWN_FAILURE_EXIT_CODE)
}

#[cfg(not(unix))]
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(SPAWN_FAILURE_EXIT_CODE)
}

fn trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// Wire rendering of a measured duration (e.g. "1.503ms", "5.001s").
pub fn format_duration(d: Duration) -> String {
    format!("{:?}", d)
}
