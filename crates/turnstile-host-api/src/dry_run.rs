//! Executor that reports instead of running

use async_trait::async_trait;
use tracing::info;

use crate::{CommandExecutor, ExecutionOutcome};

/// Accepts every command and runs none of them
#[derive(Debug, Default, Clone)]
pub struct DryRunExecutor;

impl DryRunExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for DryRunExecutor {
    fn name(&self) -> &'static str {
        "dry_run"
    }

    async fn execute(&self, command: &str) -> ExecutionOutcome {
        info!(command = %command, "Dry run, command not executed");
        ExecutionOutcome::succeeded(format!("[dry-run] would execute: {}", command))
    }
}
