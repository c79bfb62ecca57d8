//! Admission pipeline: classification, charging, execution, audit

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use turnstile_api::{
    AuditAction, CommandSubmission, DefaultPolicy, PipelineState, RejectionReason, RuleAction,
};
use turnstile_host_api::{CommandExecutor, ExecutionOutcome};
use turnstile_store::Store;
use turnstile_util::{GatewayError, MonotonicInstant, PrincipalId, Result};

use crate::{AuditLog, CreditLedger, DebitError, MatchOutcome, RuleBook};

/// Longest output excerpt copied into an audit entry
const AUDIT_EXCERPT_CHARS: usize = 256;

/// Knobs the pipeline needs from configuration
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub default_policy: DefaultPolicy,
    pub command_cost: u64,
}

/// Drives one submission from SUBMITTED to a terminal state.
///
/// Every path ends with the submission finalized once and exactly one
/// terminal audit entry. Charged paths also record `CREDIT_DEBITED` before
/// the command is dispatched. Credits are charged for the attempt and are
/// not returned when execution fails.
pub struct AdmissionPipeline {
    settings: PipelineSettings,
    store: Arc<dyn Store>,
    rules: Arc<RuleBook>,
    ledger: Arc<CreditLedger>,
    executor: Arc<dyn CommandExecutor>,
    audit: Arc<AuditLog>,
}

/// A submission in flight
struct Run {
    submission: CommandSubmission,
}

impl Run {
    fn advance(&mut self, to: PipelineState) {
        debug!(
            submission_id = %self.submission.id,
            from = self.submission.state.as_str(),
            to = to.as_str(),
            "Pipeline transition"
        );
        self.submission.state = to;
    }
}

impl AdmissionPipeline {
    pub fn new(
        settings: PipelineSettings,
        store: Arc<dyn Store>,
        rules: Arc<RuleBook>,
        ledger: Arc<CreditLedger>,
        executor: Arc<dyn CommandExecutor>,
        audit: Arc<AuditLog>,
    ) -> Self {
        info!(
            default_policy = %settings.default_policy,
            command_cost = settings.command_cost,
            executor = executor.name(),
            "Admission pipeline initialized"
        );

        Self {
            settings,
            store,
            rules,
            ledger,
            executor,
            audit,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one command through the full pipeline and return its terminal record
    pub async fn submit(
        &self,
        principal_id: PrincipalId,
        command_text: &str,
    ) -> Result<CommandSubmission> {
        if command_text.trim().is_empty() {
            return Err(GatewayError::invalid_request("command text is empty"));
        }
        if self.store.get_principal(&principal_id)?.is_none() {
            return Err(GatewayError::PrincipalNotFound(principal_id));
        }

        let submission =
            CommandSubmission::pending(principal_id, command_text, turnstile_util::now());
        self.store.insert_submission(&submission)?;
        info!(
            submission_id = %submission.id,
            principal_id = %principal_id,
            command = %command_text,
            "Command submitted"
        );

        let mut run = Run { submission };

        match self.rules.classify(command_text) {
            MatchOutcome::Matched {
                rule_id,
                pattern,
                action: RuleAction::AutoReject,
            } => {
                return Ok(self.reject(
                    run,
                    RejectionReason::Rule { rule_id, pattern },
                    AuditAction::RejectedByRule,
                ));
            }
            MatchOutcome::Matched {
                rule_id,
                action: RuleAction::AutoAccept,
                ..
            } => {
                debug!(submission_id = %run.submission.id, rule_id = %rule_id, "Accepted by rule");
            }
            MatchOutcome::NoMatch => match self.settings.default_policy {
                DefaultPolicy::Allow => {
                    debug!(submission_id = %run.submission.id, "No rule matched, default allow");
                }
                DefaultPolicy::Deny => {
                    return Ok(self.reject(
                        run,
                        RejectionReason::DefaultPolicy,
                        AuditAction::RejectedByDefaultPolicy,
                    ));
                }
            },
        }
        run.advance(PipelineState::Classified);

        let cost = self.settings.command_cost;
        let balance = match self.ledger.check_and_debit(&principal_id, cost) {
            Ok(balance) => balance,
            Err(DebitError::InsufficientCredits { balance, cost }) => {
                return Ok(self.reject(
                    run,
                    RejectionReason::InsufficientCredits { balance, cost },
                    AuditAction::RejectedInsufficientCredits,
                ));
            }
            Err(e) => {
                error!(
                    submission_id = %run.submission.id,
                    error = %e,
                    "Debit failed, nothing charged"
                );
                return Ok(self.reject(
                    run,
                    RejectionReason::LedgerUnavailable {
                        error: e.to_string(),
                    },
                    AuditAction::RejectedLedgerUnavailable,
                ));
            }
        };
        run.advance(PipelineState::Charged);
        run.submission.cost_charged = cost;
        self.audit.append(
            Some(principal_id),
            AuditAction::CreditDebited,
            json!({
                "submission_id": run.submission.id,
                "cost": cost,
                "balance": balance,
            }),
        );

        // Past this point the submission always runs to a terminal state
        let started = MonotonicInstant::now();
        let outcome = self.executor.execute(command_text).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (state, action) = match &outcome {
            ExecutionOutcome::Succeeded { .. } => {
                (PipelineState::Executed, AuditAction::Executed)
            }
            ExecutionOutcome::Failed { error_output } => {
                warn!(
                    submission_id = %run.submission.id,
                    error = %excerpt(error_output),
                    "Execution failed"
                );
                (PipelineState::ExecutionFailed, AuditAction::ExecutionFailed)
            }
        };
        run.advance(state);
        run.submission.result = Some(outcome.into_text());

        let submission = self.finalize(run);
        self.audit.append(
            Some(principal_id),
            action,
            json!({
                "submission_id": submission.id,
                "elapsed_ms": elapsed_ms,
                "output": submission.result.as_deref().map(excerpt),
            }),
        );

        info!(
            submission_id = %submission.id,
            state = submission.state.as_str(),
            elapsed_ms,
            "Command finished"
        );
        Ok(submission)
    }

    fn reject(
        &self,
        mut run: Run,
        reason: RejectionReason,
        action: AuditAction,
    ) -> CommandSubmission {
        run.advance(PipelineState::Rejected);
        run.submission.result = Some(reason.describe());

        let mut details = json!({ "submission_id": run.submission.id });
        match &reason {
            RejectionReason::Rule { rule_id, pattern } => {
                details["rule_id"] = json!(rule_id);
                details["pattern"] = json!(pattern);
            }
            RejectionReason::DefaultPolicy => {}
            RejectionReason::InsufficientCredits { balance, cost } => {
                details["balance"] = json!(balance);
                details["cost"] = json!(cost);
            }
            RejectionReason::LedgerUnavailable { error } => {
                details["error"] = json!(error);
            }
        }
        run.submission.rejection = Some(reason);

        let submission = self.finalize(run);
        self.audit
            .append(Some(submission.principal_id), action, details);

        info!(
            submission_id = %submission.id,
            reason = %action,
            "Command rejected"
        );
        submission
    }

    /// Record the terminal state. The caller gets the record even if the
    /// write fails.
    fn finalize(&self, mut run: Run) -> CommandSubmission {
        let submission = &mut run.submission;
        submission.status = submission.state.submission_status();
        submission.finished_at = Some(turnstile_util::now());

        match self.store.finish_submission(submission) {
            Ok(true) => {}
            Ok(false) => {
                warn!(submission_id = %submission.id, "Submission was already terminal");
            }
            Err(e) => {
                error!(
                    submission_id = %submission.id,
                    state = submission.state.as_str(),
                    error = %e,
                    "Failed to persist terminal submission state"
                );
            }
        }

        run.submission
    }
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(AUDIT_EXCERPT_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
