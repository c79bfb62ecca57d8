//! SQLite-based store implementation

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};
use turnstile_api::{AuditEntry, CommandSubmission, Principal, Role, Rule, SubmissionStatus};
use turnstile_util::{PrincipalId, SubmissionId};

use crate::rows::{
    decode_credits, encode_credits, encode_time, AuditRow, PrincipalRow, RuleRow, SubmissionRow,
};
use crate::{Store, StoreError, StoreResult};

/// How long a writer waits on another process holding the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PRINCIPAL_COLUMNS: &str = "id, name, role, credit_balance, api_key_hash";
const SUBMISSION_COLUMNS: &str = "id, principal_id, command_text, status, result, created_at, \
                                  state, rejection_json, cost_charged, finished_at";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS principals (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                credit_balance INTEGER NOT NULL CHECK (credit_balance >= 0),
                api_key_hash TEXT NOT NULL UNIQUE
            );

            -- Rules are evaluated in rowid order
            CREATE TABLE IF NOT EXISTS rules (
                id TEXT PRIMARY KEY,
                pattern TEXT NOT NULL,
                action TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                principal_id TEXT NOT NULL,
                command_text TEXT NOT NULL,
                status TEXT NOT NULL,
                result TEXT,
                created_at TEXT NOT NULL,
                state TEXT NOT NULL,
                rejection_json TEXT,
                cost_charged INTEGER NOT NULL DEFAULT 0,
                finished_at TEXT
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                actor_id TEXT,
                action TEXT NOT NULL,
                details TEXT,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_submissions_principal ON submissions(principal_id);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn append_audit(&self, mut entry: AuditEntry) -> StoreResult<i64> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO audit_log (actor_id, action, details, timestamp) VALUES (?, ?, ?, ?)",
            params![
                entry.actor_id.map(|id| id.to_string()),
                entry.action.as_str(),
                entry.details,
                encode_time(&entry.timestamp)
            ],
        )?;

        entry.id = conn.last_insert_rowid();
        debug!(entry_id = entry.id, action = %entry.action, "Audit entry appended");

        Ok(entry.id)
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, actor_id, action, details, timestamp FROM audit_log \
             ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([i64::try_from(limit).unwrap_or(i64::MAX)], AuditRow::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    fn insert_rule(&self, rule: &Rule) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO rules (id, pattern, action, created_by, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                rule.id.to_string(),
                rule.pattern,
                rule.action.as_str(),
                rule.created_by.to_string(),
                encode_time(&rule.created_at)
            ],
        )?;

        debug!(rule_id = %rule.id, pattern = %rule.pattern, "Rule inserted");
        Ok(())
    }

    fn list_rules(&self) -> StoreResult<Vec<Rule>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, pattern, action, created_by, created_at FROM rules ORDER BY rowid ASC",
        )?;

        let rows = stmt.query_map([], RuleRow::from_row)?;

        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?.into_rule()?);
        }
        Ok(rules)
    }

    fn insert_principal(&self, principal: &Principal) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO principals (id, name, role, credit_balance, api_key_hash) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                principal.id.to_string(),
                principal.name,
                principal.role.as_str(),
                encode_credits(principal.credit_balance)?,
                principal.api_key_hash
            ],
        )?;

        debug!(principal_id = %principal.id, name = %principal.name, "Principal inserted");
        Ok(())
    }

    fn get_principal(&self, id: &PrincipalId) -> StoreResult<Option<Principal>> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM principals WHERE id = ?", PRINCIPAL_COLUMNS),
                [id.to_string()],
                PrincipalRow::from_row,
            )
            .optional()?;

        row.map(PrincipalRow::into_principal).transpose()
    }

    fn find_principal_by_key_hash(&self, key_hash: &str) -> StoreResult<Option<Principal>> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM principals WHERE api_key_hash = ?", PRINCIPAL_COLUMNS),
                [key_hash],
                PrincipalRow::from_row,
            )
            .optional()?;

        row.map(PrincipalRow::into_principal).transpose()
    }

    fn first_admin(&self) -> StoreResult<Option<Principal>> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM principals WHERE role = ? ORDER BY rowid ASC LIMIT 1",
                    PRINCIPAL_COLUMNS
                ),
                [Role::Admin.as_str()],
                PrincipalRow::from_row,
            )
            .optional()?;

        row.map(PrincipalRow::into_principal).transpose()
    }

    fn debit_credits(&self, id: &PrincipalId, cost: u64) -> StoreResult<Option<u64>> {
        let conn = self.conn()?;
        let cost = encode_credits(cost)?;

        let balance: Option<i64> = conn
            .query_row(
                "UPDATE principals SET credit_balance = credit_balance - ?1 \
                 WHERE id = ?2 AND credit_balance >= ?1 RETURNING credit_balance",
                params![cost, id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match balance {
            Some(balance) => {
                debug!(principal_id = %id, cost, balance, "Credits debited");
                Ok(Some(decode_credits(balance)?))
            }
            None => {
                let exists: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM principals WHERE id = ?",
                        [id.to_string()],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Err(StoreError::NotFound(format!("principal {}", id)));
                }
                Ok(None)
            }
        }
    }

    fn insert_submission(&self, submission: &CommandSubmission) -> StoreResult<()> {
        let conn = self.conn()?;
        let rejection_json = submission
            .rejection
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            &format!(
                "INSERT INTO submissions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                SUBMISSION_COLUMNS
            ),
            params![
                submission.id.to_string(),
                submission.principal_id.to_string(),
                submission.command_text,
                submission.status.as_str(),
                submission.result,
                encode_time(&submission.created_at),
                submission.state.as_str(),
                rejection_json,
                encode_credits(submission.cost_charged)?,
                submission.finished_at.as_ref().map(encode_time),
            ],
        )?;

        debug!(submission_id = %submission.id, "Submission recorded");
        Ok(())
    }

    fn finish_submission(&self, submission: &CommandSubmission) -> StoreResult<bool> {
        let conn = self.conn()?;
        let rejection_json = submission
            .rejection
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let changed = conn.execute(
            "UPDATE submissions SET status = ?, result = ?, state = ?, rejection_json = ?, \
             cost_charged = ?, finished_at = ? WHERE id = ? AND status = ?",
            params![
                submission.status.as_str(),
                submission.result,
                submission.state.as_str(),
                rejection_json,
                encode_credits(submission.cost_charged)?,
                submission.finished_at.as_ref().map(encode_time),
                submission.id.to_string(),
                SubmissionStatus::Pending.as_str(),
            ],
        )?;

        if changed == 0 {
            warn!(submission_id = %submission.id, "Submission already finalized");
        }
        Ok(changed > 0)
    }

    fn get_submission(&self, id: &SubmissionId) -> StoreResult<Option<CommandSubmission>> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM submissions WHERE id = ?", SUBMISSION_COLUMNS),
                [id.to_string()],
                SubmissionRow::from_row,
            )
            .optional()?;

        row.map(SubmissionRow::into_submission).transpose()
    }

    fn list_submissions_for(
        &self,
        principal_id: &PrincipalId,
        limit: usize,
    ) -> StoreResult<Vec<CommandSubmission>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM submissions WHERE principal_id = ? ORDER BY rowid DESC LIMIT ?",
            SUBMISSION_COLUMNS
        ))?;

        let rows = stmt.query_map(
            params![principal_id.to_string(), i64::try_from(limit).unwrap_or(i64::MAX)],
            SubmissionRow::from_row,
        )?;

        let mut submissions = Vec::new();
        for row in rows {
            submissions.push(row?.into_submission()?);
        }
        Ok(submissions)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
