//! Fixed-size worker pool over a bounded job queue

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::job::{Job, JobResult};
use crate::core::TransactionCore;
use crate::counters::TransactionCounters;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub queue_size: usize,
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            queue_size: 100,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SubmitError {
    #[error("job queue is full")]
    QueueFull,

    #[error("worker pool is shut down")]
    Shutdown,
}

/// Gauges for the health surface.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub queued_jobs: usize,
}

struct PoolShared {
    core: Arc<TransactionCore>,
    counters: Arc<TransactionCounters>,
    job_tx: StdMutex<Option<mpsc::Sender<Job>>>,
    results_tx: StdMutex<Option<mpsc::Sender<JobResult>>>,
    shutting_down: AtomicBool,
    queue_size: usize,
    worker_count: usize,
}

impl PoolShared {
    fn job_sender(&self) -> Option<mpsc::Sender<Job>> {
        self.job_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn result_sender(&self) -> Option<mpsc::Sender<JobResult>> {
        self.results_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Fixed-size pool of workers consuming a bounded FIFO queue. Submission is
/// non-blocking: a full queue fails immediately with [`SubmitError::QueueFull`].
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    results_task: StdMutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    pub fn new(
        core: Arc<TransactionCore>,
        counters: Arc<TransactionCounters>,
        config: WorkerPoolConfig,
    ) -> Self {
        let queue_size = config.queue_size.max(1);
        let (job_tx, job_rx) = mpsc::channel::<Job>(queue_size);
        let (results_tx, results_rx) = mpsc::channel::<JobResult>(queue_size);

        let shared = Arc::new(PoolShared {
            core,
            counters,
            job_tx: StdMutex::new(Some(job_tx)),
            results_tx: StdMutex::new(Some(results_tx)),
            shutting_down: AtomicBool::new(false),
            queue_size,
            worker_count: config.worker_count,
        });

        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let shared = shared.clone();
            let job_rx = job_rx.clone();
            workers.push(tokio::spawn(worker_loop(worker_id + 1, shared, job_rx)));
        }

        let results_task = tokio::spawn(result_loop(results_rx));

        info!(
            worker_count = config.worker_count,
            queue_size, "worker pool started"
        );

        Self {
            shared,
            workers: StdMutex::new(workers),
            results_task: StdMutex::new(Some(results_task)),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Enqueue a job without blocking. Increments the pending gauge on
    /// success.
    pub fn submit(&self, job: Job) -> Result<(), SubmitError> {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return Err(SubmitError::Shutdown);
        }
        let sender = self.shared.job_sender().ok_or(SubmitError::Shutdown)?;

        match sender.try_send(job) {
            Ok(()) => {
                self.shared.counters.record_submitted();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                debug!(job_id = %job.id, "job queue full, rejecting submission");
                Err(SubmitError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SubmitError::Shutdown),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let queued = self
            .shared
            .job_sender()
            .map(|tx| self.shared.queue_size - tx.capacity())
            .unwrap_or(0);

        PoolStats {
            worker_count: self.shared.worker_count,
            queue_capacity: self.shared.queue_size,
            queued_jobs: queued,
        }
    }

    /// Graceful shutdown: stop accepting jobs, let the workers drain the
    /// queue, and wait up to the configured timeout for in-flight work.
    /// Returns `false` when the timeout expired and pending work was
    /// abandoned.
    pub async fn shutdown(&self) -> bool {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return true;
        }
        info!("worker pool shutting down");

        // Closing the submission side lets workers run the queue dry and
        // exit once every outstanding sender (including retry timers) is
        // gone.
        self.shared
            .job_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let workers: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        let drain = tokio::spawn(async move {
            for worker in workers {
                let _ = worker.await;
            }
        });

        let drained = match tokio::time::timeout(self.shutdown_timeout, drain).await {
            Ok(_) => {
                info!("worker pool drained");
                true
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "worker pool shutdown timed out, abandoning in-flight jobs"
                );
                false
            }
        };

        // Close the results sink and let the logger task finish.
        self.shared
            .results_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let results_task = self
            .results_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = results_task {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }

        drained
    }
}

async fn worker_loop(worker_id: usize, shared: Arc<PoolShared>, job_rx: Arc<Mutex<mpsc::Receiver<Job>>>) {
    debug!(worker_id, "worker started");
    loop {
        let job = {
            let mut rx = job_rx.lock().await;
            rx.recv().await
        };
        match job {
            Some(job) => process_job(&shared, job).await,
            None => break,
        }
    }
    debug!(worker_id, "worker stopped");
}

async fn process_job(shared: &Arc<PoolShared>, job: Job) {
    let started = Instant::now();
    debug!(
        job_id = %job.id,
        kind = job.kind.name(),
        amount = %job.amount,
        retry_count = job.retry_count,
        "processing job"
    );

    let outcome = match job.kind {
        super::job::JobKind::Credit { to } => {
            shared.core.credit(to, job.amount, &job.reference).await
        }
        super::job::JobKind::Debit { from } => {
            shared.core.debit(from, job.amount, &job.reference).await
        }
        super::job::JobKind::Transfer { from, to } => {
            shared
                .core
                .transfer(from, to, job.amount, &job.reference)
                .await
        }
    };
    let elapsed = started.elapsed();

    let result = JobResult {
        job_id: job.id,
        success: outcome.is_ok(),
        error: outcome.as_ref().err().map(|e| e.to_string()),
        processing_time: elapsed,
        retry_count: job.retry_count,
    };

    match outcome {
        Ok(_) => {
            shared
                .counters
                .record_terminal(job.kind.entry_type(), job.amount, elapsed, None);
        }
        Err(err) if err.is_retryable() && job.can_retry() => {
            schedule_retry(shared.clone(), job, &err.to_string());
        }
        Err(err) => {
            shared.counters.record_terminal(
                job.kind.entry_type(),
                job.amount,
                elapsed,
                Some(err.class()),
            );
        }
    }

    publish_result(shared, result);
}

fn schedule_retry(shared: Arc<PoolShared>, mut job: Job, cause: &str) {
    job.retry_count += 1;
    let backoff = job.backoff();

    // The sender clone keeps the queue open until the timer resolves; if
    // shutdown begins in between, the retry is dropped when it fires.
    let Some(sender) = shared.job_sender() else {
        abandon_retry(&shared, &job, "pool shut down before retry was scheduled");
        return;
    };

    info!(
        job_id = %job.id,
        kind = job.kind.name(),
        retry_count = job.retry_count,
        backoff_secs = backoff.as_secs(),
        cause,
        "scheduling retry"
    );

    tokio::spawn(async move {
        tokio::time::sleep(backoff).await;

        if shared.shutting_down.load(Ordering::SeqCst) {
            abandon_retry(&shared, &job, "pool shutting down, retry dropped");
            return;
        }

        match sender.try_send(job.clone()) {
            Ok(()) => shared.counters.record_retry(),
            Err(mpsc::error::TrySendError::Full(job)) => {
                abandon_retry(&shared, &job, "queue full, retry dropped");
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                abandon_retry(&shared, &job, "queue closed, retry dropped");
            }
        }
    });
}

fn abandon_retry(shared: &Arc<PoolShared>, job: &Job, reason: &str) {
    warn!(job_id = %job.id, retry_count = job.retry_count, reason, "retry abandoned");
    // The job reaches no further attempt, so close out its pending slot.
    shared.counters.record_terminal(
        job.kind.entry_type(),
        job.amount,
        Duration::ZERO,
        Some(crate::counters::ErrorClass::System),
    );
}

fn publish_result(shared: &Arc<PoolShared>, result: JobResult) {
    let Some(sender) = shared.result_sender() else {
        return;
    };
    if let Err(mpsc::error::TrySendError::Full(result)) = sender.try_send(result) {
        warn!(job_id = %result.job_id, "results sink full, result dropped");
    }
}

async fn result_loop(mut results_rx: mpsc::Receiver<JobResult>) {
    while let Some(result) = results_rx.recv().await {
        if result.success {
            info!(
                job_id = %result.job_id,
                processing_time_ms = result.processing_time.as_millis() as u64,
                retry_count = result.retry_count,
                "job succeeded"
            );
        } else {
            error!(
                job_id = %result.job_id,
                error = result.error.as_deref().unwrap_or("unknown"),
                retry_count = result.retry_count,
                "job failed"
            );
        }
    }
}
