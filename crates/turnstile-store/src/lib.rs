//! Persistence layer for turnstile
//!
//! Provides:
//! - Principals and their credit balances
//! - Rules, in insertion order
//! - Command submissions
//! - Audit log (append-only)

mod rows;
mod sqlite;
mod traits;

pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violated: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, msg) = &e
            && err.code == rusqlite::ErrorCode::ConstraintViolation
        {
            return StoreError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()));
        }
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for turnstile_util::GatewayError {
    fn from(e: StoreError) -> Self {
        turnstile_util::GatewayError::store(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
