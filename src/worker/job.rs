//! Jobs and their results

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::models::EntryType;
use crate::money::Amount;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff ceiling for retried jobs.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// What a job does and which accounts it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Credit { to: Uuid },
    Debit { from: Uuid },
    Transfer { from: Uuid, to: Uuid },
}

impl JobKind {
    pub fn entry_type(&self) -> EntryType {
        match self {
            JobKind::Credit { .. } => EntryType::Deposit,
            JobKind::Debit { .. } => EntryType::Withdraw,
            JobKind::Transfer { .. } => EntryType::Transfer,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Credit { .. } => "credit",
            JobKind::Debit { .. } => "debit",
            JobKind::Transfer { .. } => "transfer",
        }
    }
}

/// An in-memory unit of work owned by exactly one worker while processed.
/// Discarded after a terminal outcome or exhausted retries.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub amount: Amount,
    pub reference: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn credit(to: Uuid, amount: Amount, reference: impl Into<String>) -> Self {
        Self::new(JobKind::Credit { to }, amount, reference)
    }

    pub fn debit(from: Uuid, amount: Amount, reference: impl Into<String>) -> Self {
        Self::new(JobKind::Debit { from }, amount, reference)
    }

    pub fn transfer(from: Uuid, to: Uuid, amount: Amount, reference: impl Into<String>) -> Self {
        Self::new(JobKind::Transfer { from, to }, amount, reference)
    }

    fn new(kind: JobKind, amount: Amount, reference: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            amount,
            reference: reference.into(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            enqueued_at: Utc::now(),
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Quadratic backoff: `retry_count² seconds`, capped at 30s.
    pub fn backoff(&self) -> Duration {
        let secs = u64::from(self.retry_count).saturating_mul(u64::from(self.retry_count));
        Duration::from_secs(secs).min(MAX_BACKOFF)
    }
}

/// Outcome published to the results sink after each processing attempt.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: Uuid,
    pub success: bool,
    pub error: Option<String>,
    pub processing_time: Duration,
    pub retry_count: u32,
}
