//! Append-only audit log with operator escalation

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};
use turnstile_api::{AuditAction, AuditEntry};
use turnstile_store::Store;
use turnstile_util::{GatewayError, PrincipalId, Result};

/// Records decisions. A failed write never fails the caller; it is logged
/// at error level under `turnstile::audit` and counted instead.
pub struct AuditLog {
    store: Arc<dyn Store>,
    failures: AtomicU64,
    last_failure: Mutex<Option<String>>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            failures: AtomicU64::new(0),
            last_failure: Mutex::new(None),
        }
    }

    /// Append one entry. Returns the stored id, or `None` if the write failed.
    pub fn append(
        &self,
        actor_id: Option<PrincipalId>,
        action: AuditAction,
        details: Value,
    ) -> Option<i64> {
        let details = match details {
            Value::Null => None,
            other => Some(other.to_string()),
        };
        let entry = AuditEntry::new(actor_id, action, details);

        match self.store.append_audit(entry) {
            Ok(id) => {
                debug!(entry_id = id, action = %action, "Audit entry recorded");
                Some(id)
            }
            Err(e) => {
                let total = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                error!(
                    target: "turnstile::audit",
                    action = %action,
                    actor_id = ?actor_id,
                    error = %e,
                    failures = total,
                    "AUDIT WRITE FAILED: decision not recorded"
                );
                *self
                    .last_failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) =
                    Some(format!("{}: {}", action, e));
                None
            }
        }
    }

    /// Most recent entries first
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        self.store
            .recent_audits(limit)
            .map_err(|e| GatewayError::store(e.to_string()))
    }

    /// Number of writes that failed since startup
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn last_failure(&self) -> Option<String> {
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
