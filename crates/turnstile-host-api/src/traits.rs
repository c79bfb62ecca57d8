//! Executor traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result text recorded when an execution exceeds its time limit
pub const TIMEOUT_MESSAGE: &str = "timeout";

/// Errors raised while trying to run a command
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// What came of running one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded { output: String },
    Failed { error_output: String },
}

impl ExecutionOutcome {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self::Succeeded {
            output: output.into(),
        }
    }

    pub fn failed(error_output: impl Into<String>) -> Self {
        Self::Failed {
            error_output: error_output.into(),
        }
    }

    pub fn timed_out() -> Self {
        Self::failed(TIMEOUT_MESSAGE)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Text stored as the submission result
    pub fn text(&self) -> &str {
        match self {
            Self::Succeeded { output } => output,
            Self::Failed { error_output } => error_output,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Succeeded { output } => output,
            Self::Failed { error_output } => error_output,
        }
    }
}

impl From<ExecutorError> for ExecutionOutcome {
    fn from(e: ExecutorError) -> Self {
        Self::failed(e.to_string())
    }
}

/// Bounds applied to every execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_output_bytes: 64 * 1024,
        }
    }
}

/// Runs accepted commands.
///
/// Execution never returns an error to the caller: every failure, including
/// spawn errors and timeouts, comes back as [`ExecutionOutcome::Failed`].
/// Implementations must honor their time limit and must not leave processes
/// running after returning.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Short name for logs and health output
    fn name(&self) -> &'static str;

    /// Run one command to completion
    async fn execute(&self, command: &str) -> ExecutionOutcome;

    /// Whether the executor can currently run commands
    fn is_available(&self) -> bool {
        true
    }
}
