//! Durable ledger store
//!
//! Capability boundary over the five persistent tables (users, balances,
//! transactions, balance_history, audit_logs). Satisfied by the PostgreSQL
//! implementation and an in-memory double for tests.
//!
//! Read operations never require a transaction. Writes touching multiple
//! rows go through [`StoreTx`]; dropping a transaction without committing
//! rolls every staged mutation back.

pub mod memory;
pub mod postgres;
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AuditRecord, Balance, BalanceHistory, EntryStatus, EntryType, LedgerEntry, UserRole,
};
use crate::money::Amount;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::Database(db) => StoreError::Integrity(db.message().to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Integrity(err.to_string()),
        }
    }
}

/// Filters for listing ledger entries. Limits are clamped to `[1, 100]`
/// (default 50) and offsets to `>= 0` at construction.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    pub limit: i64,
    pub offset: i64,
    pub kind: Option<EntryType>,
    pub status: Option<EntryStatus>,
}

impl EntryFilter {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(50).clamp(1, 100),
            offset: offset.unwrap_or(0).max(0),
            kind: None,
            status: None,
        }
    }

    pub fn with_kind(mut self, kind: Option<EntryType>) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_status(mut self, status: Option<EntryStatus>) -> Self {
        self.status = status;
        self
    }
}

/// Pagination plus optional date window for balance history listings.
#[derive(Debug, Clone)]
pub struct HistoryFilter {
    pub limit: i64,
    pub offset: i64,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(50).clamp(1, 100),
            offset: offset.unwrap_or(0).max(0),
            start: None,
            end: None,
        }
    }

    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

/// Transactional handle. Either `commit` or `rollback` must be called;
/// dropping the handle rolls back.
#[async_trait]
pub trait StoreTx: Send {
    /// Insert a pending ledger entry.
    async fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    /// Read the balance row with a row lock, creating a zero row on demand.
    async fn lock_balance(&mut self, user_id: Uuid) -> Result<Balance, StoreError>;

    /// Expression-level atomic update: `amount := amount + delta`. Returns
    /// the row after the update. The non-negativity CHECK constraint is the
    /// database-side backstop.
    async fn adjust_balance(&mut self, user_id: Uuid, delta: Amount) -> Result<Balance, StoreError>;

    /// Append one balance history row.
    async fn insert_history(&mut self, row: &BalanceHistory) -> Result<(), StoreError>;

    /// Compare-and-set status update. Fails with `Conflict` when the row is
    /// not currently in `from`.
    async fn set_entry_status(
        &mut self,
        id: Uuid,
        from: EntryStatus,
        to: EntryStatus,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    // --- users ---

    async fn create_user(&self, user: &crate::models::User) -> Result<(), StoreError>;

    async fn get_user(&self, id: Uuid) -> Result<crate::models::User, StoreError>;

    async fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<crate::models::User>, StoreError>;

    /// Soft delete: sets `deleted_at`, keeps the row for ledger integrity.
    async fn soft_delete_user(&self, id: Uuid) -> Result<(), StoreError>;

    async fn set_user_role(&self, id: Uuid, role: UserRole) -> Result<(), StoreError>;

    // --- balances ---

    /// Read a balance, creating a zero row on first access so downstream
    /// algorithms can assume existence.
    async fn get_or_create_balance(&self, user_id: Uuid) -> Result<Balance, StoreError>;

    // --- ledger entries ---

    async fn get_entry(&self, id: Uuid) -> Result<LedgerEntry, StoreError>;

    /// Entries where `user_id` is sender or receiver, newest first.
    async fn list_entries(
        &self,
        user_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Best-effort terminal record of a failed attempt, written outside any
    /// transaction after a rollback.
    async fn insert_failed_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError>;

    // --- balance history ---

    async fn list_history(
        &self,
        user_id: Uuid,
        filter: &HistoryFilter,
    ) -> Result<Vec<BalanceHistory>, StoreError>;

    /// Latest history row with `created_at <= ts`, if any.
    async fn history_at(
        &self,
        user_id: Uuid,
        ts: DateTime<Utc>,
    ) -> Result<Option<BalanceHistory>, StoreError>;

    // --- audit ---

    async fn insert_audit(&self, record: &AuditRecord) -> Result<(), StoreError>;

    /// Retention job hook; returns the number of purged rows.
    async fn purge_audit_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    // --- health ---

    async fn ping(&self) -> Result<(), StoreError>;
}
