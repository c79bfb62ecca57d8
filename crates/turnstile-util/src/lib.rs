//! Shared utilities for turnstile
//!
//! This crate provides:
//! - ID types (PrincipalId, RuleId, SubmissionId)
//! - Time utilities (wall clock with mock override, monotonic instants)
//! - Error types
//! - API key generation and hashing
//! - Default paths for config and data directories

mod credential;
mod error;
mod ids;
mod paths;
mod time;

pub use credential::*;
pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
