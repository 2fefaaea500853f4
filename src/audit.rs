//! Audit trail writer
//!
//! Append-only records of money movements and account changes. Audit write
//! failures are logged and never abort the calling operation.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::models::{AuditRecord, LedgerEntry};
use crate::store::Store;

pub struct AuditTrail {
    store: Arc<dyn Store>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record activity on a ledger entry, e.g. `CREDIT_COMPLETED`.
    pub async fn transaction_activity(&self, entry: &LedgerEntry, action: &str, details: &str) {
        let record = AuditRecord::new(
            "transaction",
            entry.id.to_string(),
            action,
            format!(
                "{} {} {}: {}",
                entry.kind, entry.amount, entry.status, details
            ),
            entry.from_user_id.or(entry.to_user_id),
        );
        self.write(record).await;
    }

    /// Record a direct balance adjustment on one account.
    pub async fn balance_activity(&self, user_id: Uuid, action: &str, details: &str) {
        let record = AuditRecord::new("balance", user_id.to_string(), action, details, Some(user_id));
        self.write(record).await;
    }

    /// Record activity on a user row (role change, soft delete).
    pub async fn user_activity(&self, user_id: Uuid, action: &str, details: &str) {
        let record = AuditRecord::new("user", user_id.to_string(), action, details, Some(user_id));
        self.write(record).await;
    }

    pub async fn system_activity(&self, action: &str, details: &str) {
        let record = AuditRecord::new("system", "system", action, details, None);
        self.write(record).await;
    }

    /// Retention job: drop records older than `days` days. Returns the
    /// number purged (zero if the store refused).
    pub async fn purge_older_than_days(&self, days: i64) -> u64 {
        let cutoff = Utc::now() - Duration::days(days);
        match self.store.purge_audit_older_than(cutoff).await {
            Ok(purged) => {
                if purged > 0 {
                    tracing::info!(purged, days, "purged audit records");
                }
                purged
            }
            Err(err) => {
                warn!(error = %err, "audit purge failed");
                0
            }
        }
    }

    async fn write(&self, record: AuditRecord) {
        if let Err(err) = self.store.insert_audit(&record).await {
            warn!(
                action = %record.action,
                entity = %record.entity_id,
                error = %err,
                "audit write failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Amount;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn records_transaction_activity() {
        let store = Arc::new(MemoryStore::new());
        let trail = AuditTrail::new(store.clone());

        let entry = LedgerEntry::deposit(Uuid::new_v4(), Amount::from_minor(1000), "");
        trail
            .transaction_activity(&entry, "CREDIT_COMPLETED", "Credit successful")
            .await;

        let records = store.audit_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "CREDIT_COMPLETED");
        assert_eq!(records[0].entity_type, "transaction");
        assert_eq!(records[0].user_id, entry.to_user_id);
    }

    #[tokio::test]
    async fn purge_removes_old_records() {
        let store = Arc::new(MemoryStore::new());
        let trail = AuditTrail::new(store.clone());

        trail.system_activity("STARTUP", "first boot").await;
        // Fresh records survive a 30-day retention pass
        assert_eq!(trail.purge_older_than_days(30).await, 0);
        assert_eq!(store.audit_len().await, 1);

        // A zero-day retention wipes everything written before "now"
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(trail.purge_older_than_days(0).await, 1);
        assert_eq!(store.audit_len().await, 0);
    }
}
