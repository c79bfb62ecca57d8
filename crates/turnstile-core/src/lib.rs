//! Rule engine and admission pipeline for turnstile
//!
//! This crate is the heart of turnstile, containing:
//! - The ordered rule book and first-match classifier
//! - The credit ledger with per-principal check-and-debit
//! - The audit log with operator escalation on write failure
//! - The admission state machine (Submitted -> Classified -> Charged -> Executed)
//! - The gateway that authorizes and serves external operations

mod audit;
mod gateway;
mod ledger;
mod pipeline;
mod rules;

#[cfg(test)]
mod testing;

pub use audit::*;
pub use gateway::*;
pub use ledger::*;
pub use pipeline::*;
pub use rules::*;
