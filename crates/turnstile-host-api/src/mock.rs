//! Mock executor for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{CommandExecutor, ExecutionOutcome};

/// Scriptable executor for unit and integration tests.
///
/// Unscripted commands succeed and echo the command text back.
#[derive(Clone, Default)]
pub struct MockExecutor {
    scripted: Arc<Mutex<HashMap<String, ExecutionOutcome>>>,
    invocations: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,

    /// Configure every execution to fail
    pub fail_all: Arc<Mutex<bool>>,

    /// Simulated run time for every execution
    pub delay: Arc<Mutex<Option<Duration>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the outcome for one exact command text
    pub fn script(&self, command: impl Into<String>, outcome: ExecutionOutcome) {
        self.scripted.lock().unwrap().insert(command.into(), outcome);
    }

    pub fn set_fail_all(&self, fail: bool) {
        *self.fail_all.lock().unwrap() = fail;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Commands executed so far, in order
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    /// Highest number of executions observed running at once
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn execute(&self, command: &str) -> ExecutionOutcome {
        self.invocations.lock().unwrap().push(command.to_string());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if *self.fail_all.lock().unwrap() {
            return ExecutionOutcome::failed("mock execution failure");
        }

        self.scripted
            .lock()
            .unwrap()
            .get(command)
            .cloned()
            .unwrap_or_else(|| ExecutionOutcome::succeeded(command))
    }
}
