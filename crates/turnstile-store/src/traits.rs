//! Store trait definitions

use turnstile_api::{AuditEntry, CommandSubmission, Principal, Rule};
use turnstile_util::{PrincipalId, SubmissionId};

use crate::StoreResult;

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit entry, returning its assigned id
    fn append_audit(&self, entry: AuditEntry) -> StoreResult<i64>;

    /// Most recent audit entries first
    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEntry>>;

    // Rules

    fn insert_rule(&self, rule: &Rule) -> StoreResult<()>;

    /// All rules in insertion order
    fn list_rules(&self) -> StoreResult<Vec<Rule>>;

    // Principals

    /// Insert a principal together with its opening balance
    fn insert_principal(&self, principal: &Principal) -> StoreResult<()>;

    fn get_principal(&self, id: &PrincipalId) -> StoreResult<Option<Principal>>;

    fn find_principal_by_key_hash(&self, key_hash: &str) -> StoreResult<Option<Principal>>;

    /// The earliest-created admin, if any
    fn first_admin(&self) -> StoreResult<Option<Principal>>;

    /// Subtract `cost` only if the balance covers it.
    ///
    /// Returns the new balance, or `None` when the balance was too low. The
    /// check and the write are one statement, so concurrent debits against
    /// the same database can never drive a balance negative.
    fn debit_credits(&self, id: &PrincipalId, cost: u64) -> StoreResult<Option<u64>>;

    // Submissions

    /// Persist a new pending submission
    fn insert_submission(&self, submission: &CommandSubmission) -> StoreResult<()>;

    /// Write a submission's terminal state.
    ///
    /// Only a pending row is updated; returns false if it was already final.
    fn finish_submission(&self, submission: &CommandSubmission) -> StoreResult<bool>;

    fn get_submission(&self, id: &SubmissionId) -> StoreResult<Option<CommandSubmission>>;

    /// A principal's submissions, most recent first, at most `limit`
    fn list_submissions_for(
        &self,
        principal_id: &PrincipalId,
        limit: usize,
    ) -> StoreResult<Vec<CommandSubmission>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
