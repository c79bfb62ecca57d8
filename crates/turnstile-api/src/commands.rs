//! Request and response envelopes for the gateway operations

use serde::{Deserialize, Serialize};
use turnstile_util::GatewayError;

use crate::{
    AuditEntry, CommandSubmission, CreatedPrincipal, HealthStatus, Role, Rule, RuleAction,
    API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.result, ResponseResult::Ok(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&GatewayError> for ErrorInfo {
    fn from(err: &GatewayError) -> Self {
        let code = match err {
            GatewayError::InvalidPattern { .. } => ErrorCode::InvalidPattern,
            GatewayError::NotAuthorized => ErrorCode::NotAuthorized,
            GatewayError::Unauthenticated => ErrorCode::Unauthenticated,
            GatewayError::PrincipalNotFound(_) => ErrorCode::PrincipalNotFound,
            GatewayError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            GatewayError::Store(_) => ErrorCode::StoreError,
            GatewayError::Internal(_) => ErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    InvalidPattern,
    NotAuthorized,
    Unauthenticated,
    PrincipalNotFound,
    StoreError,
    InternalError,
}

/// All operations the gateway serves
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Run a command through the admission pipeline
    SubmitCommand { command_text: String },

    /// List rules in evaluation order
    ListRules,

    /// Append a rule (admin only)
    AddRule { pattern: String, action: RuleAction },

    /// Read the audit log, most recent first (admin only)
    ListAuditLog,

    /// The caller's own submissions, most recent first
    ListHistory,

    /// Create a principal and reveal its key once (admin only)
    CreatePrincipal {
        name: String,
        #[serde(default = "default_role")]
        role: Role,
        initial_credits: Option<u64>,
    },

    /// The caller's current balance
    GetCredits,

    /// Get health status
    GetHealth,
}

fn default_role() -> Role {
    Role::Member
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Submission(CommandSubmission),
    Rules(Vec<Rule>),
    RuleAdded(Rule),
    AuditLog(Vec<AuditEntry>),
    History(Vec<CommandSubmission>),
    PrincipalCreated(CreatedPrincipal),
    Credits { balance: u64 },
    Health(HealthStatus),
}
