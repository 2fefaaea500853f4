//! Transaction and balance cores
//!
//! The algorithms that move money: per-account serialized balance updates
//! and the credit/debit/transfer envelope executing inside store
//! transactions.

pub mod balances;
pub mod locks;
pub mod transactions;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::cache::{keys, Cache};
use crate::counters::ErrorClass;
use crate::money::Amount;
use crate::store::StoreError;

pub use balances::BalanceCore;
pub use locks::AccountLocks;
pub use transactions::TransactionCore;

/// Error taxonomy for core operations. The deepest component identifies the
/// kind; wrappers add context without losing it.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Amount,
        requested: Amount,
    },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => CoreError::NotFound("resource"),
            StoreError::Conflict(msg) => CoreError::Conflict(msg),
            StoreError::Integrity(msg) => CoreError::Internal(msg),
            StoreError::Unavailable(msg) => CoreError::Unavailable(msg),
        }
    }
}

impl CoreError {
    /// Whether a worker should re-attempt the job. Validation-shaped and
    /// funds-shaped failures are deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Unavailable(_) | CoreError::Internal(_))
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            CoreError::Validation(_)
            | CoreError::NotFound(_)
            | CoreError::Forbidden(_)
            | CoreError::Conflict(_) => ErrorClass::Validation,
            CoreError::InsufficientFunds { .. } => ErrorClass::InsufficientBalance,
            CoreError::Unavailable(_) | CoreError::Internal(_) => ErrorClass::System,
        }
    }
}

/// Read through the cache, treating any backend error as a miss.
pub(crate) async fn cache_get(cache: &dyn Cache, key: &str) -> Option<String> {
    match cache.get(key).await {
        Ok(value) => value,
        Err(err) => {
            debug!(key, error = %err, "cache read failed, treating as miss");
            None
        }
    }
}

/// Best-effort cache population.
pub(crate) async fn cache_put(
    cache: &dyn Cache,
    key: &str,
    value: &str,
    ttl: std::time::Duration,
) {
    if let Err(err) = cache.set(key, value, ttl).await {
        debug!(key, error = %err, "cache write failed, skipping");
    }
}

/// Invalidate every cached view of a user's balance after a commit: the
/// balance entry itself and all transaction listings.
pub(crate) async fn invalidate_balance_keys(cache: &dyn Cache, user_id: Uuid) {
    if let Err(err) = cache.delete(&keys::balance(user_id)).await {
        debug!(%user_id, error = %err, "balance cache invalidation failed");
    }
    if let Err(err) = cache.delete_prefix(&keys::transactions_prefix(user_id)).await {
        debug!(%user_id, error = %err, "listing cache invalidation failed");
    }
}

/// Invalidate the cached copy of a single ledger entry.
pub(crate) async fn invalidate_entry_key(cache: &dyn Cache, entry_id: Uuid) {
    if let Err(err) = cache.delete(&keys::transaction(entry_id)).await {
        debug!(%entry_id, error = %err, "entry cache invalidation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(CoreError::Unavailable("db down".into()).is_retryable());
        assert!(CoreError::Internal("boom".into()).is_retryable());
        assert!(!CoreError::Validation("bad amount".into()).is_retryable());
        assert!(!CoreError::InsufficientFunds {
            available: Amount::ZERO,
            requested: Amount::from_minor(100),
        }
        .is_retryable());
        assert!(!CoreError::NotFound("transaction").is_retryable());
    }

    #[test]
    fn error_classes() {
        assert_eq!(
            CoreError::Validation("x".into()).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            CoreError::InsufficientFunds {
                available: Amount::ZERO,
                requested: Amount::from_minor(1),
            }
            .class(),
            ErrorClass::InsufficientBalance
        );
        assert_eq!(
            CoreError::Unavailable("x".into()).class(),
            ErrorClass::System
        );
    }
}
