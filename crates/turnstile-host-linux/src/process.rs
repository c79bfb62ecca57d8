//! Process management utilities

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::debug;

use turnstile_host_api::{ExecutorError, ExecutorResult};

/// Variables passed through from the gateway's environment
const INHERITED_ENV: &[&str] = &["PATH", "HOME", "LANG"];

/// Child shell running in its own process group
pub struct ShellProcess {
    pub child: Child,
    pub pid: u32,
    pub pgid: u32,
}

impl ShellProcess {
    /// Spawn `shell -c command` as the leader of a new session
    pub fn spawn(shell: &Path, command: &str) -> ExecutorResult<Self> {
        let mut cmd = Command::new(shell);
        cmd.arg("-c").arg(command);

        cmd.env_clear();
        for key in INHERITED_ENV {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        // SAFETY: setsid is async-signal-safe and touches no parent state
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(std::io::Error::from)?;
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(|e| {
            ExecutorError::SpawnFailed(format!("Failed to spawn {}: {}", shell.display(), e))
        })?;

        let pid = child
            .id()
            .ok_or_else(|| ExecutorError::Internal("child exited before its pid was read".into()))?;
        let pgid = pid; // After setsid, pid == pgid

        debug!(pid = pid, pgid = pgid, shell = %shell.display(), "Shell spawned");

        Ok(Self { child, pid, pgid })
    }

    /// Send SIGKILL to the process group
    pub fn kill_group(&self) -> ExecutorResult<()> {
        let pgid = Pid::from_raw(-(self.pgid as i32)); // Negative for process group

        match signal::kill(pgid, Signal::SIGKILL) {
            Ok(()) => {
                debug!(pgid = self.pgid, "Sent SIGKILL to process group");
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => {
                // Process group already gone
                Ok(())
            }
            Err(e) => Err(ExecutorError::Internal(format!(
                "Failed to send SIGKILL: {}",
                e
            ))),
        }
    }

    /// Wait for the shell itself to exit
    pub async fn wait(&mut self) -> ExecutorResult<ExitStatus> {
        Ok(self.child.wait().await?)
    }
}

/// Drain a pipe to EOF, keeping at most `cap + 1` bytes.
///
/// The extra byte lets the caller tell a full pipe from a truncated one.
/// Draining continues past the cap so the writer never blocks on a full pipe.
pub async fn read_capped<R>(mut reader: R, cap: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let keep = cap.saturating_add(1);
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = keep.saturating_sub(kept.len());
        kept.extend_from_slice(&buf[..n.min(room)]);
    }

    Ok(kept)
}
