//! Credit, debit and transfer primitives
//!
//! Every mutation follows the same envelope: validate, open a store
//! transaction, insert a pending ledger row, mutate balances under row
//! locks, append history, complete the ledger row, commit. Any failure
//! before commit rolls the whole transaction back; a terminal `failed` row
//! is then written best-effort. Cache invalidation and audit records happen
//! after commit, outside the transaction.

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    cache_get, cache_put, invalidate_balance_keys, invalidate_entry_key, AccountLocks, CoreError,
};
use crate::audit::AuditTrail;
use crate::cache::{keys, Cache, ENTITY_TTL, LISTING_TTL};
use crate::models::{BalanceHistory, ChangeType, EntryStatus, LedgerEntry};
use crate::money::Amount;
use crate::store::{EntryFilter, Store, StoreError, StoreTx};

pub struct TransactionCore {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    locks: Arc<AccountLocks>,
    audit: Arc<AuditTrail>,
}

impl TransactionCore {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        locks: Arc<AccountLocks>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            store,
            cache,
            locks,
            audit,
        }
    }

    /// Add money to an account.
    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: Amount,
        reference: &str,
    ) -> Result<LedgerEntry, CoreError> {
        let entry = LedgerEntry::deposit(user_id, amount, reference);
        entry.validate().map_err(CoreError::Validation)?;

        let lock = self.locks.lock_for(user_id);
        let _guard = lock.write().await;

        let result = self
            .apply_single(&entry, user_id, amount, ChangeType::Credit)
            .await;
        self.finish(entry, &[user_id], "CREDIT", result).await
    }

    /// Remove money from an account. Sufficiency is re-checked inside the
    /// transaction; any earlier check is advisory.
    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: Amount,
        reference: &str,
    ) -> Result<LedgerEntry, CoreError> {
        let entry = LedgerEntry::withdraw(user_id, amount, reference);
        entry.validate().map_err(CoreError::Validation)?;

        let delta = amount
            .checked_neg()
            .ok_or_else(|| CoreError::Internal("amount negation overflow".to_string()))?;

        let lock = self.locks.lock_for(user_id);
        let _guard = lock.write().await;

        let result = self
            .apply_single(&entry, user_id, delta, ChangeType::Debit)
            .await;
        self.finish(entry, &[user_id], "DEBIT", result).await
    }

    /// Move money between two accounts atomically: one ledger row, two
    /// history rows, both balance effects in one durable snapshot.
    pub async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: Amount,
        reference: &str,
    ) -> Result<LedgerEntry, CoreError> {
        let entry = LedgerEntry::transfer(from, to, amount, reference);
        entry.validate().map_err(CoreError::Validation)?;

        // Ascending-id acquisition rules out in-process deadlock
        let (first, second) = self.locks.pair_ordered(from, to);
        let _g1 = first.write().await;
        let _g2 = second.write().await;

        let result = self.apply_transfer(&entry, from, to, amount).await;
        self.finish(entry, &[from, to], "TRANSFER", result).await
    }

    /// Single ledger entry, read through the cache.
    pub async fn get_entry(&self, id: Uuid) -> Result<LedgerEntry, CoreError> {
        let key = keys::transaction(id);
        if let Some(cached) = cache_get(self.cache.as_ref(), &key).await {
            match serde_json::from_str::<LedgerEntry>(&cached) {
                Ok(entry) => return Ok(entry),
                Err(err) => debug!(%id, error = %err, "cached entry undecodable, rereading"),
            }
        }

        let entry = self.store.get_entry(id).await.map_err(|err| match err {
            StoreError::NotFound => CoreError::NotFound("transaction"),
            other => other.into(),
        })?;

        if let Ok(json) = serde_json::to_string(&entry) {
            cache_put(self.cache.as_ref(), &key, &json, ENTITY_TTL).await;
        }
        Ok(entry)
    }

    /// Single entry with the caller-is-a-party authorization filter. Admin
    /// bypass is decided by the submission layer, which calls
    /// [`get_entry`](Self::get_entry) directly instead.
    pub async fn get_entry_for(&self, id: Uuid, caller: Uuid) -> Result<LedgerEntry, CoreError> {
        let entry = self.get_entry(id).await?;
        if !entry.involves(caller) {
            return Err(CoreError::Forbidden(
                "transaction belongs to another user".to_string(),
            ));
        }
        Ok(entry)
    }

    /// Listing of a user's entries, newest first, cached per filter
    /// combination.
    pub async fn get_history(
        &self,
        user_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Vec<LedgerEntry>, CoreError> {
        let key = keys::transactions(
            user_id,
            filter.limit,
            filter.offset,
            filter.kind.map(|k| k.as_str()),
            filter.status.map(|s| s.as_str()),
        );

        if let Some(cached) = cache_get(self.cache.as_ref(), &key).await {
            match serde_json::from_str::<Vec<LedgerEntry>>(&cached) {
                Ok(entries) => return Ok(entries),
                Err(err) => debug!(%user_id, error = %err, "cached listing undecodable, rereading"),
            }
        }

        let entries = self.store.list_entries(user_id, filter).await?;
        if let Ok(json) = serde_json::to_string(&entries) {
            cache_put(self.cache.as_ref(), &key, &json, LISTING_TTL).await;
        }
        Ok(entries)
    }

    /// Advisory pre-enqueue check used by the submission layer for early
    /// rejection. The authoritative check runs inside the transaction.
    pub async fn can_cover(&self, user_id: Uuid, amount: Amount) -> Result<bool, CoreError> {
        let balance = self.store.get_or_create_balance(user_id).await?;
        Ok(balance.has_sufficient(amount))
    }

    // --- envelope internals ---

    async fn apply_single(
        &self,
        entry: &LedgerEntry,
        account: Uuid,
        delta: Amount,
        change_type: ChangeType,
    ) -> Result<(), CoreError> {
        let mut tx = self.store.begin().await?;

        let result = async {
            tx.insert_entry(entry).await?;

            let before = tx.lock_balance(account).await?;
            if delta.is_negative() && !before.has_sufficient(delta.abs()) {
                return Err(CoreError::InsufficientFunds {
                    available: before.amount,
                    requested: delta.abs(),
                });
            }
            before
                .amount
                .checked_add(delta)
                .ok_or_else(|| CoreError::Internal("balance overflow".to_string()))?;

            let after = tx.adjust_balance(account, delta).await?;
            tx.insert_history(&BalanceHistory::record(
                account,
                before.amount,
                after.amount,
                change_type,
                Some(entry.id),
            ))
            .await?;

            tx.set_entry_status(entry.id, EntryStatus::Pending, EntryStatus::Completed)
                .await?;
            Ok(())
        }
        .await;

        Self::settle(tx, result).await
    }

    async fn apply_transfer(
        &self,
        entry: &LedgerEntry,
        from: Uuid,
        to: Uuid,
        amount: Amount,
    ) -> Result<(), CoreError> {
        let debit_delta = amount
            .checked_neg()
            .ok_or_else(|| CoreError::Internal("amount negation overflow".to_string()))?;

        let mut tx = self.store.begin().await?;

        let result = async {
            tx.insert_entry(entry).await?;

            // Row locks in ascending id order, mirroring the advisory locks
            let (first, second) = if from <= to { (from, to) } else { (to, from) };
            let first_balance = tx.lock_balance(first).await?;
            let second_balance = tx.lock_balance(second).await?;

            let (from_before, to_before) = if first == from {
                (first_balance, second_balance)
            } else {
                (second_balance, first_balance)
            };

            if !from_before.has_sufficient(amount) {
                return Err(CoreError::InsufficientFunds {
                    available: from_before.amount,
                    requested: amount,
                });
            }
            to_before
                .amount
                .checked_add(amount)
                .ok_or_else(|| CoreError::Internal("balance overflow".to_string()))?;

            let from_after = tx.adjust_balance(from, debit_delta).await?;
            let to_after = tx.adjust_balance(to, amount).await?;

            tx.insert_history(&BalanceHistory::record(
                from,
                from_before.amount,
                from_after.amount,
                ChangeType::TransferOut,
                Some(entry.id),
            ))
            .await?;
            tx.insert_history(&BalanceHistory::record(
                to,
                to_before.amount,
                to_after.amount,
                ChangeType::TransferIn,
                Some(entry.id),
            ))
            .await?;

            tx.set_entry_status(entry.id, EntryStatus::Pending, EntryStatus::Completed)
                .await?;
            Ok(())
        }
        .await;

        Self::settle(tx, result).await
    }

    async fn settle(tx: Box<dyn StoreTx>, result: Result<(), CoreError>) -> Result<(), CoreError> {
        match result {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Post-transaction bookkeeping: on success invalidate caches, audit,
    /// and return the completed entry; on failure write the best-effort
    /// `failed` row, audit, and surface the error.
    async fn finish(
        &self,
        mut entry: LedgerEntry,
        touched: &[Uuid],
        action: &str,
        result: Result<(), CoreError>,
    ) -> Result<LedgerEntry, CoreError> {
        match result {
            Ok(()) => {
                entry.status = EntryStatus::Completed;

                for user in touched {
                    invalidate_balance_keys(self.cache.as_ref(), *user).await;
                }
                invalidate_entry_key(self.cache.as_ref(), entry.id).await;

                self.audit
                    .transaction_activity(
                        &entry,
                        &format!("{action}_COMPLETED"),
                        &format!("{action} successful"),
                    )
                    .await;

                info!(
                    entry_id = %entry.id,
                    kind = %entry.kind,
                    amount = %entry.amount,
                    "transaction completed"
                );
                Ok(entry)
            }
            Err(err) => {
                // The pending row was rolled back with the transaction;
                // record the attempt as a fresh terminal row.
                entry.status = EntryStatus::Failed;
                if let Err(write_err) = self.store.insert_failed_entry(&entry).await {
                    warn!(
                        entry_id = %entry.id,
                        error = %write_err,
                        "could not record failed transaction"
                    );
                }

                self.audit
                    .transaction_activity(&entry, &format!("{action}_FAILED"), &err.to_string())
                    .await;

                error!(
                    entry_id = %entry.id,
                    kind = %entry.kind,
                    amount = %entry.amount,
                    error = %err,
                    "transaction failed"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<MemoryCache>,
        core: TransactionCore,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let audit = Arc::new(AuditTrail::new(store.clone()));
        let core = TransactionCore::new(
            store.clone(),
            cache.clone(),
            Arc::new(AccountLocks::new()),
            audit,
        );
        Fixture { store, cache, core }
    }

    #[tokio::test]
    async fn credit_happy_path() {
        let f = fixture();
        let alice = Uuid::new_v4();

        let entry = f
            .core
            .credit(alice, Amount::from_minor(10_000), "salary")
            .await
            .unwrap();

        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.to_user_id, Some(alice));
        assert_eq!(entry.from_user_id, None);

        let stored = f.store.get_entry(entry.id).await.unwrap();
        assert_eq!(stored.status, EntryStatus::Completed);

        let balance = f.store.get_or_create_balance(alice).await.unwrap();
        assert_eq!(balance.amount, Amount::from_minor(10_000));

        let history = f.store.history_for(alice).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].previous_amount, Amount::ZERO);
        assert_eq!(history[0].new_amount, Amount::from_minor(10_000));
        assert_eq!(history[0].change_type, ChangeType::Credit);
        assert_eq!(history[0].transaction_id, Some(entry.id));

        let audits = f.store.audit_records().await;
        assert!(audits.iter().any(|r| r.action == "CREDIT_COMPLETED"));
    }

    #[tokio::test]
    async fn debit_insufficient_leaves_failed_row_only() {
        let f = fixture();
        let bob = Uuid::new_v4();
        f.core
            .credit(bob, Amount::from_minor(1_000), "")
            .await
            .unwrap();

        let err = f
            .core
            .debit(bob, Amount::from_minor(2_500), "")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));

        // Balance and history untouched by the failed attempt
        let balance = f.store.get_or_create_balance(bob).await.unwrap();
        assert_eq!(balance.amount, Amount::from_minor(1_000));
        assert_eq!(f.store.history_for(bob).await.len(), 1);

        // One completed credit, one failed withdrawal
        let entries = f.store.all_entries().await;
        assert_eq!(entries.len(), 2);
        let failed: Vec<_> = entries
            .iter()
            .filter(|e| e.status == EntryStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].kind, crate::models::EntryType::Withdraw);
    }

    #[tokio::test]
    async fn validation_failure_writes_no_row() {
        let f = fixture();
        let user = Uuid::new_v4();

        let err = f.core.credit(user, Amount::ZERO, "").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(f.store.all_entries().await.is_empty());

        let err = f
            .core
            .transfer(user, user, Amount::from_minor(100), "")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(f.store.all_entries().await.is_empty());
    }

    #[tokio::test]
    async fn transfer_moves_both_balances_atomically() {
        let f = fixture();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        f.core.credit(a, Amount::from_minor(50_000), "").await.unwrap();

        let entry = f
            .core
            .transfer(a, b, Amount::from_minor(20_000), "rent")
            .await
            .unwrap();

        assert_eq!(
            f.store.get_or_create_balance(a).await.unwrap().amount,
            Amount::from_minor(30_000)
        );
        assert_eq!(
            f.store.get_or_create_balance(b).await.unwrap().amount,
            Amount::from_minor(20_000)
        );

        let a_history = f.store.history_for(a).await;
        let out_row = a_history
            .iter()
            .find(|h| h.change_type == ChangeType::TransferOut)
            .unwrap();
        assert_eq!(out_row.change_amount, Amount::from_minor(-20_000));
        assert_eq!(out_row.transaction_id, Some(entry.id));

        let b_history = f.store.history_for(b).await;
        assert_eq!(b_history.len(), 1);
        assert_eq!(b_history[0].change_type, ChangeType::TransferIn);
        assert_eq!(b_history[0].change_amount, Amount::from_minor(20_000));
    }

    #[tokio::test]
    async fn transfer_insufficient_touches_nothing() {
        let f = fixture();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        f.core.credit(a, Amount::from_minor(100), "").await.unwrap();

        let err = f
            .core
            .transfer(a, b, Amount::from_minor(500), "")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));

        assert_eq!(
            f.store.get_or_create_balance(a).await.unwrap().amount,
            Amount::from_minor(100)
        );
        assert_eq!(
            f.store.get_or_create_balance(b).await.unwrap().amount,
            Amount::ZERO
        );
        assert_eq!(f.store.history_for(b).await.len(), 0);
    }

    #[tokio::test]
    async fn entry_cache_round_trip() {
        let f = fixture();
        let user = Uuid::new_v4();
        let entry = f
            .core
            .credit(user, Amount::from_minor(777), "")
            .await
            .unwrap();

        let first = f.core.get_entry(entry.id).await.unwrap();
        let second = f.core.get_entry(entry.id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.amount, second.amount);
        assert_eq!(f.cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn authorization_filter() {
        let f = fixture();
        let (owner, stranger) = (Uuid::new_v4(), Uuid::new_v4());
        let entry = f
            .core
            .credit(owner, Amount::from_minor(100), "")
            .await
            .unwrap();

        assert!(f.core.get_entry_for(entry.id, owner).await.is_ok());
        assert!(matches!(
            f.core.get_entry_for(entry.id, stranger).await,
            Err(CoreError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn listing_cache_invalidated_by_commit() {
        let f = fixture();
        let user = Uuid::new_v4();
        f.core.credit(user, Amount::from_minor(100), "").await.unwrap();

        let filter = EntryFilter::new(None, None);
        assert_eq!(f.core.get_history(user, &filter).await.unwrap().len(), 1);

        // New commit must invalidate the cached listing
        f.core.credit(user, Amount::from_minor(200), "").await.unwrap();
        assert_eq!(f.core.get_history(user, &filter).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unavailable_store_surfaces_retryable_error() {
        let f = fixture();
        let user = Uuid::new_v4();
        f.store.inject_unavailable(1);

        let err = f
            .core
            .credit(user, Amount::from_minor(100), "")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unavailable(_)));
        assert!(err.is_retryable());
    }
}
