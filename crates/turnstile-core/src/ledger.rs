//! Per-principal credit ledger

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};
use turnstile_api::Principal;
use turnstile_store::{Store, StoreError};
use turnstile_util::{GatewayError, PrincipalId};

/// Why a debit did not happen
#[derive(Debug, Error)]
pub enum DebitError {
    #[error("Insufficient credits: balance {balance}, cost {cost}")]
    InsufficientCredits { balance: u64, cost: u64 },

    #[error("Principal not found: {0}")]
    PrincipalNotFound(PrincipalId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<DebitError> for GatewayError {
    fn from(e: DebitError) -> Self {
        match e {
            DebitError::PrincipalNotFound(id) => GatewayError::PrincipalNotFound(id),
            other => GatewayError::store(other.to_string()),
        }
    }
}

/// Tracks balances and serializes debits per principal.
///
/// Debits for one principal are strictly sequential; different principals
/// never wait on each other. The lock covers only the synchronous store
/// update, so it is never held while a command runs.
pub struct CreditLedger {
    store: Arc<dyn Store>,
    locks: Mutex<HashMap<PrincipalId, Arc<Mutex<()>>>>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn principal_lock(&self, id: &PrincipalId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(*id).or_default())
    }

    /// Subtract `cost` if the balance covers it, returning the new balance
    pub fn check_and_debit(&self, id: &PrincipalId, cost: u64) -> Result<u64, DebitError> {
        let lock = self.principal_lock(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        match self.store.debit_credits(id, cost) {
            Ok(Some(balance)) => {
                debug!(principal_id = %id, cost, balance, "Debit applied");
                Ok(balance)
            }
            Ok(None) => {
                let balance = self.balance_locked(id)?;
                debug!(principal_id = %id, cost, balance, "Debit refused");
                Err(DebitError::InsufficientCredits { balance, cost })
            }
            Err(StoreError::NotFound(_)) => Err(DebitError::PrincipalNotFound(*id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Open an account holding `amount` credits. The only way a balance grows.
    ///
    /// The principal row and its grant are one write: a failure leaves
    /// nothing behind.
    pub fn grant(&self, mut principal: Principal, amount: u64) -> Result<Principal, DebitError> {
        let lock = self.principal_lock(&principal.id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        principal.credit_balance = amount;
        self.store.insert_principal(&principal)?;
        info!(principal_id = %principal.id, amount, "Credits granted");
        Ok(principal)
    }

    pub fn balance(&self, id: &PrincipalId) -> Result<u64, DebitError> {
        let lock = self.principal_lock(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.balance_locked(id)
    }

    fn balance_locked(&self, id: &PrincipalId) -> Result<u64, DebitError> {
        self.store
            .get_principal(id)?
            .map(|p| p.credit_balance)
            .ok_or(DebitError::PrincipalNotFound(*id))
    }
}
