//! Lock-free transaction aggregates
//!
//! Updated once per terminal job outcome plus a pending gauge maintained by
//! the worker pool. Snapshot reads load each field independently: the
//! reported snapshot is not atomic across fields, per-field monotonicity is
//! the contract. The serialization DTO is separate from the aggregate so no
//! locking happens while marshalling.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use crate::models::EntryType;
use crate::money::Amount;

/// Classification of terminal failures for error accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    InsufficientBalance,
    System,
}

#[derive(Debug)]
pub struct TransactionCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    pending: AtomicI64,

    transfer_count: AtomicU64,
    deposit_count: AtomicU64,
    withdraw_count: AtomicU64,

    // Minor units, to avoid floating point drift
    total_amount_processed: AtomicI64,
    largest: AtomicI64,
    smallest: AtomicI64,

    // Nanoseconds
    avg_processing_time: AtomicU64,
    fastest: AtomicU64,
    slowest: AtomicU64,

    validation_errors: AtomicU64,
    insufficient_balance_errors: AtomicU64,
    system_errors: AtomicU64,

    retry_count: AtomicU64,
}

impl Default for TransactionCounters {
    fn default() -> Self {
        Self {
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            pending: AtomicI64::new(0),
            transfer_count: AtomicU64::new(0),
            deposit_count: AtomicU64::new(0),
            withdraw_count: AtomicU64::new(0),
            total_amount_processed: AtomicI64::new(0),
            largest: AtomicI64::new(0),
            smallest: AtomicI64::new(i64::MAX),
            avg_processing_time: AtomicU64::new(0),
            fastest: AtomicU64::new(u64::MAX),
            slowest: AtomicU64::new(0),
            validation_errors: AtomicU64::new(0),
            insufficient_balance_errors: AtomicU64::new(0),
            system_errors: AtomicU64::new(0),
            retry_count: AtomicU64::new(0),
        }
    }
}

impl TransactionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a terminal outcome for one job.
    pub fn record_terminal(
        &self,
        kind: EntryType,
        amount: Amount,
        elapsed: Duration,
        error: Option<ErrorClass>,
    ) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_sub(1, Ordering::Relaxed);

        match kind {
            EntryType::Transfer => self.transfer_count.fetch_add(1, Ordering::Relaxed),
            EntryType::Deposit => self.deposit_count.fetch_add(1, Ordering::Relaxed),
            EntryType::Withdraw => self.withdraw_count.fetch_add(1, Ordering::Relaxed),
            EntryType::Payment | EntryType::Refund => 0,
        };

        match error {
            None => {
                self.successful.fetch_add(1, Ordering::Relaxed);
                self.record_amount(amount);
                self.record_processing_time(elapsed);
            }
            Some(class) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                match class {
                    ErrorClass::Validation => {
                        self.validation_errors.fetch_add(1, Ordering::Relaxed)
                    }
                    ErrorClass::InsufficientBalance => self
                        .insufficient_balance_errors
                        .fetch_add(1, Ordering::Relaxed),
                    ErrorClass::System => self.system_errors.fetch_add(1, Ordering::Relaxed),
                };
            }
        }
    }

    fn record_amount(&self, amount: Amount) {
        let minor = amount.minor_units();
        self.total_amount_processed
            .fetch_add(minor, Ordering::Relaxed);

        let _ = self
            .largest
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (minor > current).then_some(minor)
            });
        let _ = self
            .smallest
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (minor < current).then_some(minor)
            });
    }

    fn record_processing_time(&self, elapsed: Duration) {
        let nanos = elapsed.as_nanos().min(u64::MAX as u128) as u64;

        // Rolling mean over the successful count; n was just incremented
        let n = self.successful.load(Ordering::Relaxed).max(1);
        let _ = self
            .avg_processing_time
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some((current * (n - 1) + nanos) / n)
            });

        let _ = self
            .fastest
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (nanos < current).then_some(nanos)
            });
        let _ = self
            .slowest
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (nanos > current).then_some(nanos)
            });
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let successful = self.successful.load(Ordering::Relaxed);
        let success_rate = if total > 0 {
            successful as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let smallest = self.smallest.load(Ordering::Relaxed);
        let fastest = self.fastest.load(Ordering::Relaxed);

        CountersSnapshot {
            total_transactions: total,
            successful_transactions: successful,
            failed_transactions: self.failed.load(Ordering::Relaxed),
            pending_transactions: self.pending.load(Ordering::Relaxed).max(0),
            success_rate,
            transfer_count: self.transfer_count.load(Ordering::Relaxed),
            deposit_count: self.deposit_count.load(Ordering::Relaxed),
            withdraw_count: self.withdraw_count.load(Ordering::Relaxed),
            total_amount_processed: Amount::from_minor(
                self.total_amount_processed.load(Ordering::Relaxed),
            ),
            largest_transaction: Amount::from_minor(self.largest.load(Ordering::Relaxed)),
            smallest_transaction: Amount::from_minor(if smallest == i64::MAX {
                0
            } else {
                smallest
            }),
            average_processing_time_ms: self.avg_processing_time.load(Ordering::Relaxed) as f64
                / 1_000_000.0,
            fastest_transaction_ms: if fastest == u64::MAX {
                0.0
            } else {
                fastest as f64 / 1_000_000.0
            },
            slowest_transaction_ms: self.slowest.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            insufficient_balance_errors: self
                .insufficient_balance_errors
                .load(Ordering::Relaxed),
            system_errors: self.system_errors.load(Ordering::Relaxed),
            retry_count: self.retry_count.load(Ordering::Relaxed),
        }
    }
}

/// Serialization DTO, detached from the atomics.
#[derive(Debug, Clone, Serialize)]
pub struct CountersSnapshot {
    pub total_transactions: u64,
    pub successful_transactions: u64,
    pub failed_transactions: u64,
    pub pending_transactions: i64,
    pub success_rate: f64,
    pub transfer_count: u64,
    pub deposit_count: u64,
    pub withdraw_count: u64,
    pub total_amount_processed: Amount,
    pub largest_transaction: Amount,
    pub smallest_transaction: Amount,
    pub average_processing_time_ms: f64,
    pub fastest_transaction_ms: f64,
    pub slowest_transaction_ms: f64,
    pub validation_errors: u64,
    pub insufficient_balance_errors: u64,
    pub system_errors: u64,
    pub retry_count: u64,
}
