//! Protocol types for turnstile
//!
//! This crate defines the stable data model shared by the gateway and its
//! callers:
//! - Rules, principals, command submissions, audit entries
//! - Requests (the operations the gateway serves) and responses
//! - Versioning

mod commands;
mod types;

pub use commands::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
