//! Conversions between stored columns and API types

use chrono::{DateTime, Local};
use rusqlite::Row;
use std::str::FromStr;
use turnstile_api::{
    AuditEntry, CommandSubmission, PipelineState, Principal, RejectionReason, Rule,
};

use crate::{StoreError, StoreResult};

pub(crate) fn encode_time(ts: &DateTime<Local>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn decode_time(s: &str) -> StoreResult<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{}': {}", s, e)))
}

pub(crate) fn encode_credits(value: u64) -> StoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("credit value {} out of range", value)))
}

pub(crate) fn decode_credits(value: i64) -> StoreResult<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative credit value {}", value)))
}

fn parse<T>(kind: &str, s: &str) -> StoreResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    s.parse()
        .map_err(|e: T::Err| StoreError::Serialization(format!("bad {} '{}': {}", kind, s, e)))
}

/// `id, pattern, action, created_by, created_at`
pub(crate) struct RuleRow {
    id: String,
    pattern: String,
    action: String,
    created_by: String,
    created_at: String,
}

impl RuleRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            pattern: row.get(1)?,
            action: row.get(2)?,
            created_by: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    pub(crate) fn into_rule(self) -> StoreResult<Rule> {
        Ok(Rule {
            id: parse("rule id", &self.id)?,
            pattern: self.pattern,
            action: parse("rule action", &self.action)?,
            created_by: parse("principal id", &self.created_by)?,
            created_at: decode_time(&self.created_at)?,
        })
    }
}

/// `id, name, role, credit_balance, api_key_hash`
pub(crate) struct PrincipalRow {
    id: String,
    name: String,
    role: String,
    credit_balance: i64,
    api_key_hash: String,
}

impl PrincipalRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            credit_balance: row.get(3)?,
            api_key_hash: row.get(4)?,
        })
    }

    pub(crate) fn into_principal(self) -> StoreResult<Principal> {
        Ok(Principal {
            id: parse("principal id", &self.id)?,
            name: self.name,
            role: parse("role", &self.role)?,
            credit_balance: decode_credits(self.credit_balance)?,
            api_key_hash: self.api_key_hash,
        })
    }
}

/// `id, principal_id, command_text, status, result, created_at, state,
/// rejection_json, cost_charged, finished_at`
pub(crate) struct SubmissionRow {
    id: String,
    principal_id: String,
    command_text: String,
    status: String,
    result: Option<String>,
    created_at: String,
    state: String,
    rejection_json: Option<String>,
    cost_charged: i64,
    finished_at: Option<String>,
}

impl SubmissionRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            principal_id: row.get(1)?,
            command_text: row.get(2)?,
            status: row.get(3)?,
            result: row.get(4)?,
            created_at: row.get(5)?,
            state: row.get(6)?,
            rejection_json: row.get(7)?,
            cost_charged: row.get(8)?,
            finished_at: row.get(9)?,
        })
    }

    pub(crate) fn into_submission(self) -> StoreResult<CommandSubmission> {
        let rejection: Option<RejectionReason> = match self.rejection_json {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        let state: PipelineState = parse("pipeline state", &self.state)?;

        Ok(CommandSubmission {
            id: parse("submission id", &self.id)?,
            principal_id: parse("principal id", &self.principal_id)?,
            command_text: self.command_text,
            status: parse("submission status", &self.status)?,
            result: self.result,
            created_at: decode_time(&self.created_at)?,
            state,
            rejection,
            cost_charged: decode_credits(self.cost_charged)?,
            finished_at: self.finished_at.as_deref().map(decode_time).transpose()?,
        })
    }
}

/// `id, actor_id, action, details, timestamp`
pub(crate) struct AuditRow {
    id: i64,
    actor_id: Option<String>,
    action: String,
    details: Option<String>,
    timestamp: String,
}

impl AuditRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            actor_id: row.get(1)?,
            action: row.get(2)?,
            details: row.get(3)?,
            timestamp: row.get(4)?,
        })
    }

    pub(crate) fn into_entry(self) -> StoreResult<AuditEntry> {
        Ok(AuditEntry {
            id: self.id,
            actor_id: self
                .actor_id
                .as_deref()
                .map(|s| parse("principal id", s))
                .transpose()?,
            action: parse("audit action", &self.action)?,
            details: self.details,
            timestamp: decode_time(&self.timestamp)?,
        })
    }
}
