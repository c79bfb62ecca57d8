//! Store double for exercising failure paths

use std::sync::atomic::{AtomicBool, Ordering};
use turnstile_api::{AuditEntry, CommandSubmission, Principal, Rule};
use turnstile_store::{SqliteStore, Store, StoreError, StoreResult};
use turnstile_util::{PrincipalId, SubmissionId};

/// In-memory store whose writes can be switched off one kind at a time
pub struct FlakyStore {
    inner: SqliteStore,
    fail_audit: AtomicBool,
    fail_finish: AtomicBool,
    fail_debit: AtomicBool,
    fail_create: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            fail_audit: AtomicBool::new(false),
            fail_finish: AtomicBool::new(false),
            fail_debit: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
        }
    }

    pub fn set_fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_finish(&self, fail: bool) {
        self.fail_finish.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_debit(&self, fail: bool) {
        self.fail_debit.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }
}

impl Store for FlakyStore {
    fn append_audit(&self, entry: AuditEntry) -> StoreResult<i64> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Database("disk I/O error".into()));
        }
        self.inner.append_audit(entry)
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        self.inner.recent_audits(limit)
    }

    fn insert_rule(&self, rule: &Rule) -> StoreResult<()> {
        self.inner.insert_rule(rule)
    }

    fn list_rules(&self) -> StoreResult<Vec<Rule>> {
        self.inner.list_rules()
    }

    fn insert_principal(&self, principal: &Principal) -> StoreResult<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StoreError::Database("database is locked".into()));
        }
        self.inner.insert_principal(principal)
    }

    fn get_principal(&self, id: &PrincipalId) -> StoreResult<Option<Principal>> {
        self.inner.get_principal(id)
    }

    fn find_principal_by_key_hash(&self, key_hash: &str) -> StoreResult<Option<Principal>> {
        self.inner.find_principal_by_key_hash(key_hash)
    }

    fn first_admin(&self) -> StoreResult<Option<Principal>> {
        self.inner.first_admin()
    }

    fn debit_credits(&self, id: &PrincipalId, cost: u64) -> StoreResult<Option<u64>> {
        if self.fail_debit.load(Ordering::SeqCst) {
            return Err(StoreError::Database("database is locked".into()));
        }
        self.inner.debit_credits(id, cost)
    }

    fn insert_submission(&self, submission: &CommandSubmission) -> StoreResult<()> {
        self.inner.insert_submission(submission)
    }

    fn finish_submission(&self, submission: &CommandSubmission) -> StoreResult<bool> {
        if self.fail_finish.load(Ordering::SeqCst) {
            return Err(StoreError::Database("database is locked".into()));
        }
        self.inner.finish_submission(submission)
    }

    fn get_submission(&self, id: &SubmissionId) -> StoreResult<Option<CommandSubmission>> {
        self.inner.get_submission(id)
    }

    fn list_submissions_for(
        &self,
        principal_id: &PrincipalId,
        limit: usize,
    ) -> StoreResult<Vec<CommandSubmission>> {
        self.inner.list_submissions_for(principal_id, limit)
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }
}
