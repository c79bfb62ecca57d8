//! Error types for turnstile

use thiserror::Error;

use crate::PrincipalId;

/// Errors surfaced to callers of the gateway.
///
/// Only authorization and malformed-request conditions end up here. Credit
/// exhaustion and executor failures are terminal submission states, not errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Deliberately carries no detail so every refusal looks the same.
    #[error("Not authorized")]
    NotAuthorized,

    #[error("Invalid or missing API key")]
    Unauthenticated,

    #[error("Principal not found: {0}")]
    PrincipalNotFound(PrincipalId),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
