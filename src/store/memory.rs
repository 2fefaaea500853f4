//! In-memory store double
//!
//! Backs the invariant and scenario tests without a database. A single
//! process-wide mutex is held for the lifetime of each transaction, which
//! gives the double serializable semantics; mutations are staged on a
//! snapshot and only become visible on commit, so a dropped transaction
//! rolls back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{EntryFilter, HistoryFilter, Store, StoreError, StoreTx};
use crate::models::{
    AuditRecord, Balance, BalanceHistory, EntryStatus, LedgerEntry, User, UserRole,
};
use crate::money::Amount;

#[derive(Default, Clone)]
struct MemState {
    users: HashMap<Uuid, User>,
    balances: HashMap<Uuid, Balance>,
    entries: HashMap<Uuid, LedgerEntry>,
    history: Vec<BalanceHistory>,
    audit: Vec<AuditRecord>,
}

/// In-memory [`Store`] implementation for tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemState>>,
    fail_begins: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `begin` fail with `Unavailable`. Used to
    /// exercise the worker retry path.
    pub fn inject_unavailable(&self, n: usize) {
        self.fail_begins.store(n, Ordering::SeqCst);
    }

    /// Number of audit records currently stored (test helper).
    pub async fn audit_len(&self) -> usize {
        self.state.lock().await.audit.len()
    }

    /// Audit records currently stored (test helper).
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.state.lock().await.audit.clone()
    }

    /// All history rows for a user in insertion order (test helper).
    pub async fn history_for(&self, user_id: Uuid) -> Vec<BalanceHistory> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect()
    }

    /// All ledger entries (test helper).
    pub async fn all_entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.entries.values().cloned().collect()
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemState>,
    staged: MemState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        if self.staged.entries.contains_key(&entry.id) {
            return Err(StoreError::Conflict(format!(
                "duplicate entry id {}",
                entry.id
            )));
        }
        self.staged.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn lock_balance(&mut self, user_id: Uuid) -> Result<Balance, StoreError> {
        Ok(self
            .staged
            .balances
            .entry(user_id)
            .or_insert_with(|| Balance::zero(user_id))
            .clone())
    }

    async fn adjust_balance(&mut self, user_id: Uuid, delta: Amount) -> Result<Balance, StoreError> {
        let balance = self
            .staged
            .balances
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound)?;

        let new_amount = balance
            .amount
            .checked_add(delta)
            .ok_or_else(|| StoreError::Integrity("balance overflow".to_string()))?;
        if new_amount.is_negative() {
            // Mirrors the CHECK (amount >= 0) constraint
            return Err(StoreError::Integrity(
                "balance check constraint violated".to_string(),
            ));
        }

        balance.amount = new_amount;
        balance.last_updated_at = Utc::now();
        Ok(balance.clone())
    }

    async fn insert_history(&mut self, row: &BalanceHistory) -> Result<(), StoreError> {
        self.staged.history.push(row.clone());
        Ok(())
    }

    async fn set_entry_status(
        &mut self,
        id: Uuid,
        from: EntryStatus,
        to: EntryStatus,
    ) -> Result<(), StoreError> {
        from.transition_to(to)
            .map_err(|e| StoreError::Integrity(e.to_string()))?;

        let entry = self.staged.entries.get_mut(&id).ok_or(StoreError::NotFound)?;
        if entry.status != from {
            return Err(StoreError::Conflict(format!(
                "entry {id} is no longer in status {from}"
            )));
        }
        entry.status = to;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let staged = std::mem::take(&mut self.staged);
        *self.guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Staged state is simply discarded
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        if self
            .fail_begins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }

        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let email = user.email.to_lowercase();
        if state
            .users
            .values()
            .any(|u| u.username == user.username || u.email.to_lowercase() == email)
        {
            return Err(StoreError::Conflict(
                "username or email already taken".to_string(),
            ));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StoreError> {
        self.state
            .lock()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn soft_delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if user.deleted_at.is_some() {
            return Err(StoreError::NotFound);
        }
        user.deleted_at = Some(Utc::now());
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_user_role(&self, id: Uuid, role: UserRole) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn get_or_create_balance(&self, user_id: Uuid) -> Result<Balance, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .balances
            .entry(user_id)
            .or_insert_with(|| Balance::zero(user_id))
            .clone())
    }

    async fn get_entry(&self, id: Uuid) -> Result<LedgerEntry, StoreError> {
        self.state
            .lock()
            .await
            .entries
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_entries(
        &self,
        user_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .values()
            .filter(|e| e.involves(user_id))
            .filter(|e| filter.kind.is_none_or(|k| e.kind == k))
            .filter(|e| filter.status.is_none_or(|s| e.status == s))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(entries
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn insert_failed_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .entries
            .insert(entry.id, entry.clone());
        Ok(())
    }

    async fn list_history(
        &self,
        user_id: Uuid,
        filter: &HistoryFilter,
    ) -> Result<Vec<BalanceHistory>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<BalanceHistory> = state
            .history
            .iter()
            .filter(|h| h.user_id == user_id)
            .filter(|h| filter.start.is_none_or(|s| h.created_at >= s))
            .filter(|h| filter.end.is_none_or(|e| h.created_at <= e))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(rows
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn history_at(
        &self,
        user_id: Uuid,
        ts: DateTime<Utc>,
    ) -> Result<Option<BalanceHistory>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.user_id == user_id && h.created_at <= ts)
            .max_by_key(|h| h.created_at)
            .cloned())
    }

    async fn insert_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.state.lock().await.audit.push(record.clone());
        Ok(())
    }

    async fn purge_audit_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.audit.len();
        state.audit.retain(|r| r.created_at >= cutoff);
        Ok((before - state.audit.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_makes_mutations_visible() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let entry = LedgerEntry::deposit(user, Amount::from_minor(500), "");

        let mut tx = store.begin().await.unwrap();
        tx.insert_entry(&entry).await.unwrap();
        tx.lock_balance(user).await.unwrap();
        tx.adjust_balance(user, Amount::from_minor(500)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_entry(entry.id).await.unwrap().id, entry.id);
        assert_eq!(
            store.get_or_create_balance(user).await.unwrap().amount,
            Amount::from_minor(500)
        );
    }

    #[tokio::test]
    async fn dropped_tx_discards_mutations() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let entry = LedgerEntry::deposit(user, Amount::from_minor(500), "");

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_entry(&entry).await.unwrap();
            tx.lock_balance(user).await.unwrap();
            tx.adjust_balance(user, Amount::from_minor(500)).await.unwrap();
        }

        assert!(matches!(
            store.get_entry(entry.id).await,
            Err(StoreError::NotFound)
        ));
        assert_eq!(
            store.get_or_create_balance(user).await.unwrap().amount,
            Amount::ZERO
        );
    }

    #[tokio::test]
    async fn negative_balance_rejected() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.lock_balance(user).await.unwrap();
        let err = tx
            .adjust_balance(user, Amount::from_minor(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = MemoryStore::new();
        let a = User::new("alice", "alice@example.com", "d", UserRole::Customer);
        let b = User::new("alice", "other@example.com", "d", UserRole::Customer);
        let c = User::new("carol", "ALICE@EXAMPLE.COM", "d", UserRole::Customer);

        store.create_user(&a).await.unwrap();
        assert!(matches!(
            store.create_user(&b).await,
            Err(StoreError::Conflict(_))
        ));
        // Email uniqueness is case-insensitive
        assert!(matches!(
            store.create_user(&c).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn injected_outage_fails_begin_once() {
        let store = MemoryStore::new();
        store.inject_unavailable(1);

        assert!(matches!(
            store.begin().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.begin().await.is_ok());
    }
}
