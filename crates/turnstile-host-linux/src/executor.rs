//! Shell-backed command executor

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use turnstile_host_api::{
    combine_streams, decode_output, CommandExecutor, ExecutionLimits, ExecutionOutcome,
    ExecutorError,
};
use turnstile_util::MonotonicInstant;

use crate::{read_capped, ShellProcess};

/// Grace period for reaping a killed shell
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Grace period for collecting output after the shell exits
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Runs accepted commands through `shell -c`
pub struct ShellExecutor {
    shell: PathBuf,
    limits: ExecutionLimits,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<PathBuf>, limits: ExecutionLimits) -> Self {
        Self {
            shell: shell.into(),
            limits,
        }
    }

    async fn run(&self, command: &str) -> Result<ExecutionOutcome, ExecutorError> {
        let mut proc = ShellProcess::spawn(&self.shell, command)?;
        let started = MonotonicInstant::now();
        let cap = self.limits.max_output_bytes;

        let stdout = proc
            .child
            .stdout
            .take()
            .ok_or_else(|| ExecutorError::Internal("stdout not captured".into()))?;
        let stderr = proc
            .child
            .stderr
            .take()
            .ok_or_else(|| ExecutorError::Internal("stderr not captured".into()))?;
        let stdout = tokio::spawn(read_capped(stdout, cap));
        let stderr = tokio::spawn(read_capped(stderr, cap));

        // Only the shell's own exit counts against the limit
        let exited = tokio::time::timeout(self.limits.timeout, proc.child.wait()).await;

        // Background jobs still holding the pipes go with the group
        if let Err(e) = proc.kill_group() {
            warn!(pgid = proc.pgid, error = %e, "Failed to clean up process group");
        }

        let status = match exited {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    command = %command,
                    timeout_secs = self.limits.timeout.as_secs(),
                    "Command timed out"
                );
                if tokio::time::timeout(REAP_TIMEOUT, proc.wait()).await.is_err() {
                    warn!(pid = proc.pid, "Killed shell was not reaped in time");
                }
                stdout.abort();
                stderr.abort();
                return Ok(ExecutionOutcome::timed_out());
            }
        };

        let out = drain(stdout, "stdout").await?;
        let err = drain(stderr, "stderr").await?;

        let stdout = decode_output(&out, cap);
        let stderr = decode_output(&err, cap);
        let elapsed = started.elapsed();

        debug!(
            pid = proc.pid,
            status = %status,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            stdout_bytes = out.len(),
            stderr_bytes = err.len(),
            "Command finished"
        );

        if status.success() {
            Ok(ExecutionOutcome::succeeded(combine_streams(&stdout, &stderr)))
        } else {
            let mut error_output = combine_streams(&stdout, &stderr);
            if error_output.is_empty() {
                error_output = format!("command failed: {}", status);
            }
            Ok(ExecutionOutcome::failed(error_output))
        }
    }
}

/// Collect a pipe reader once the shell has exited and its group is dead.
///
/// A descendant that left the group can hold the pipe open forever, so the
/// wait is bounded and whatever it still holds is dropped.
async fn drain(
    mut reader: JoinHandle<std::io::Result<Vec<u8>>>,
    stream: &'static str,
) -> Result<Vec<u8>, ExecutorError> {
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut reader).await {
        Ok(joined) => joined
            .map_err(|e| ExecutorError::Internal(format!("{} reader failed: {}", stream, e)))?
            .map_err(ExecutorError::from),
        Err(_) => {
            reader.abort();
            warn!(stream, "Pipe still open after the shell exited");
            Ok(Vec::new())
        }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    fn name(&self) -> &'static str {
        "shell"
    }

    async fn execute(&self, command: &str) -> ExecutionOutcome {
        info!(command = %command, shell = %self.shell.display(), "Executing command");
        match self.run(command).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(command = %command, error = %e, "Execution error");
                e.into()
            }
        }
    }

    fn is_available(&self) -> bool {
        self.shell.exists()
    }
}
