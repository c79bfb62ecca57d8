//! Shared types for the turnstile API

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use turnstile_util::{PrincipalId, RuleId, SubmissionId};

/// Failure to parse a stored or user-supplied tag
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind} '{value}'")]
pub struct ParseTagError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseTagError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            _ => Err(ParseTagError::new("role", s)),
        }
    }
}

/// What a matching rule does to a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    AutoAccept,
    AutoReject,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::AutoAccept => "AUTO_ACCEPT",
            RuleAction::AutoReject => "AUTO_REJECT",
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleAction {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "AUTO_ACCEPT" => Ok(RuleAction::AutoAccept),
            "AUTO_REJECT" => Ok(RuleAction::AutoReject),
            _ => Err(ParseTagError::new("rule action", s)),
        }
    }
}

/// Result of evaluating a command against the rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    AutoAccept,
    AutoReject,
    NoMatch,
}

impl From<RuleAction> for Classification {
    fn from(action: RuleAction) -> Self {
        match action {
            RuleAction::AutoAccept => Classification::AutoAccept,
            RuleAction::AutoReject => Classification::AutoReject,
        }
    }
}

/// How a command that matches no rule is treated.
///
/// No `Default` impl: every deployment picks one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    Allow,
    Deny,
}

impl fmt::Display for DefaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultPolicy::Allow => f.write_str("allow"),
            DefaultPolicy::Deny => f.write_str("deny"),
        }
    }
}

/// A validation rule. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub pattern: String,
    pub action: RuleAction,
    pub created_by: PrincipalId,
    pub created_at: DateTime<Local>,
}

/// An authenticated actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub name: String,
    pub role: Role,
    pub credit_balance: u64,
    /// Never leaves the process
    #[serde(skip_serializing, default)]
    pub api_key_hash: String,
}

/// A freshly created principal together with its one-time credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedPrincipal {
    pub principal: Principal,
    /// Shown exactly once; only its hash is kept
    pub api_key: String,
}

/// Stored status of a command submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Executed,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Executed => "executed",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubmissionStatus::Pending),
            "executed" => Ok(SubmissionStatus::Executed),
            "rejected" => Ok(SubmissionStatus::Rejected),
            _ => Err(ParseTagError::new("submission status", s)),
        }
    }
}

/// Admission pipeline states
///
/// `Submitted -> Classified -> Charged -> {Executed | ExecutionFailed}`, with
/// `Rejected` reachable from `Submitted` and `Classified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Submitted,
    Classified,
    Charged,
    Executed,
    ExecutionFailed,
    Rejected,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Executed | PipelineState::ExecutionFailed | PipelineState::Rejected
        )
    }

    /// Stored status for a terminal state. Failed executions were still
    /// attempted and charged, so they are recorded as executed.
    pub fn submission_status(&self) -> SubmissionStatus {
        match self {
            PipelineState::Executed | PipelineState::ExecutionFailed => SubmissionStatus::Executed,
            PipelineState::Rejected => SubmissionStatus::Rejected,
            _ => SubmissionStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Submitted => "SUBMITTED",
            PipelineState::Classified => "CLASSIFIED",
            PipelineState::Charged => "CHARGED",
            PipelineState::Executed => "EXECUTED",
            PipelineState::ExecutionFailed => "EXECUTION_FAILED",
            PipelineState::Rejected => "REJECTED",
        }
    }
}

impl FromStr for PipelineState {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBMITTED" => Ok(PipelineState::Submitted),
            "CLASSIFIED" => Ok(PipelineState::Classified),
            "CHARGED" => Ok(PipelineState::Charged),
            "EXECUTED" => Ok(PipelineState::Executed),
            "EXECUTION_FAILED" => Ok(PipelineState::ExecutionFailed),
            "REJECTED" => Ok(PipelineState::Rejected),
            _ => Err(ParseTagError::new("pipeline state", s)),
        }
    }
}

/// Why a submission was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectionReason {
    /// An AUTO_REJECT rule matched
    Rule { rule_id: RuleId, pattern: String },
    /// No rule matched and the default policy is deny
    DefaultPolicy,
    /// Balance below the per-command cost
    InsufficientCredits { balance: u64, cost: u64 },
    /// The ledger could not be read or updated; nothing was charged
    LedgerUnavailable { error: String },
}

impl RejectionReason {
    /// Human-readable text stored as the submission result
    pub fn describe(&self) -> String {
        match self {
            RejectionReason::Rule { rule_id, pattern } => {
                format!("rejected by rule {}: {}", rule_id, pattern)
            }
            RejectionReason::DefaultPolicy => "rejected by default policy".to_string(),
            RejectionReason::InsufficientCredits { .. } => "insufficient credits".to_string(),
            RejectionReason::LedgerUnavailable { .. } => "credit ledger unavailable".to_string(),
        }
    }
}

/// One command submission, from pending to its terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSubmission {
    pub id: SubmissionId,
    pub principal_id: PrincipalId,
    pub command_text: String,
    pub status: SubmissionStatus,
    pub result: Option<String>,
    pub created_at: DateTime<Local>,
    /// Last pipeline state reached
    pub state: PipelineState,
    pub rejection: Option<RejectionReason>,
    /// Credits debited for this submission (0 unless charged)
    pub cost_charged: u64,
    pub finished_at: Option<DateTime<Local>>,
}

impl CommandSubmission {
    /// New submission in the pending state
    pub fn pending(
        principal_id: PrincipalId,
        command_text: impl Into<String>,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            id: SubmissionId::new(),
            principal_id,
            command_text: command_text.into(),
            status: SubmissionStatus::Pending,
            result: None,
            created_at: now,
            state: PipelineState::Submitted,
            rejection: None,
            cost_charged: 0,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != SubmissionStatus::Pending
    }
}

/// Audit action tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    RuleCreated,
    UserCreated,
    RejectedByRule,
    RejectedByDefaultPolicy,
    RejectedInsufficientCredits,
    RejectedLedgerUnavailable,
    CreditDebited,
    Executed,
    ExecutionFailed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RuleCreated => "RULE_CREATED",
            AuditAction::UserCreated => "USER_CREATED",
            AuditAction::RejectedByRule => "REJECTED_BY_RULE",
            AuditAction::RejectedByDefaultPolicy => "REJECTED_BY_DEFAULT_POLICY",
            AuditAction::RejectedInsufficientCredits => "REJECTED_INSUFFICIENT_CREDITS",
            AuditAction::RejectedLedgerUnavailable => "REJECTED_LEDGER_UNAVAILABLE",
            AuditAction::CreditDebited => "CREDIT_DEBITED",
            AuditAction::Executed => "EXECUTED",
            AuditAction::ExecutionFailed => "EXECUTION_FAILED",
        }
    }

    /// Whether this tag closes a submission
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuditAction::RejectedByRule
                | AuditAction::RejectedByDefaultPolicy
                | AuditAction::RejectedInsufficientCredits
                | AuditAction::RejectedLedgerUnavailable
                | AuditAction::Executed
                | AuditAction::ExecutionFailed
        )
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RULE_CREATED" => Ok(AuditAction::RuleCreated),
            "USER_CREATED" => Ok(AuditAction::UserCreated),
            "REJECTED_BY_RULE" => Ok(AuditAction::RejectedByRule),
            "REJECTED_BY_DEFAULT_POLICY" => Ok(AuditAction::RejectedByDefaultPolicy),
            "REJECTED_INSUFFICIENT_CREDITS" => Ok(AuditAction::RejectedInsufficientCredits),
            "REJECTED_LEDGER_UNAVAILABLE" => Ok(AuditAction::RejectedLedgerUnavailable),
            "CREDIT_DEBITED" => Ok(AuditAction::CreditDebited),
            "EXECUTED" => Ok(AuditAction::Executed),
            "EXECUTION_FAILED" => Ok(AuditAction::ExecutionFailed),
            _ => Err(ParseTagError::new("audit action", s)),
        }
    }
}

/// Immutable record of one decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID, assigned by the store
    pub id: i64,
    pub actor_id: Option<PrincipalId>,
    pub action: AuditAction,
    /// Compact JSON describing the decision
    pub details: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl AuditEntry {
    pub fn new(actor_id: Option<PrincipalId>, action: AuditAction, details: Option<String>) -> Self {
        Self {
            id: 0, // Will be set by store
            actor_id,
            action,
            details,
            timestamp: turnstile_util::now(),
        }
    }

    /// Parsed `details`, if they are JSON
    pub fn details_json(&self) -> Option<serde_json::Value> {
        self.details
            .as_deref()
            .and_then(|d| serde_json::from_str(d).ok())
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub store_ok: bool,
    pub executor_ok: bool,
    pub rule_count: usize,
    /// Audit writes that were lost since startup
    pub audit_failures: u64,
    pub last_audit_failure: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.store_ok && self.executor_ok && self.audit_failures == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_action_wire_format() {
        let json = serde_json::to_string(&RuleAction::AutoReject).unwrap();
        assert_eq!(json, "\"AUTO_REJECT\"");
        assert_eq!("auto-accept".parse::<RuleAction>().unwrap(), RuleAction::AutoAccept);
        assert!("maybe".parse::<RuleAction>().is_err());
    }

    #[test]
    fn role_parsing() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::Member.to_string(), "member");
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn failed_execution_is_stored_as_executed() {
        assert_eq!(
            PipelineState::ExecutionFailed.submission_status(),
            SubmissionStatus::Executed
        );
        assert_eq!(PipelineState::Rejected.submission_status(), SubmissionStatus::Rejected);
        assert!(!PipelineState::Charged.is_terminal());
    }

    #[test]
    fn audit_action_tags_parse_back() {
        for action in [
            AuditAction::RuleCreated,
            AuditAction::RejectedInsufficientCredits,
            AuditAction::RejectedLedgerUnavailable,
            AuditAction::ExecutionFailed,
        ] {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!(!AuditAction::CreditDebited.is_terminal());
    }

    #[test]
    fn principal_hash_is_not_serialized() {
        let principal = Principal {
            id: PrincipalId::new(),
            name: "alice".into(),
            role: Role::Member,
            credit_balance: 5,
            api_key_hash: "deadbeef".into(),
        };

        let json = serde_json::to_string(&principal).unwrap();
        assert!(!json.contains("deadbeef"));
        assert!(json.contains("\"role\":\"member\""));
    }

    #[test]
    fn rejection_reason_text() {
        assert_eq!(
            RejectionReason::InsufficientCredits { balance: 0, cost: 1 }.describe(),
            "insufficient credits"
        );
        assert_eq!(
            RejectionReason::LedgerUnavailable {
                error: "database is locked".into()
            }
            .describe(),
            "credit ledger unavailable"
        );
        let json = serde_json::to_string(&RejectionReason::DefaultPolicy).unwrap();
        assert!(json.contains("default_policy"));
    }
}
