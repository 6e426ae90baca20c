//! Dispatch Queue: a durable, at-least-once job buffer with concurrency
//! and rate limits.
//!
//! `DispatchQueue` is policy-light: the store decides what "ready" means
//! and owns retry/backoff bookkeeping; callers (the Worker Pool) stay dumb
//! and just claim, execute, and ack/fail.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::QueueError;
use crate::model::{HealthCheckJob, Priority};

/// Options accompanying an `enqueue` call.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOpts {
    pub priority: Priority,
    /// Application-supplied job id. When absent the queue mints one.
    pub job_id: Option<String>,
}

impl EnqueueOpts {
    pub fn scheduled(job_id: String) -> Self {
        Self {
            priority: Priority::SCHEDULED,
            job_id: Some(job_id),
        }
    }

    pub fn force_check(job_id: String) -> Self {
        Self {
            priority: Priority::FORCE_CHECK,
            job_id: Some(job_id),
        }
    }
}

/// Classification of job failures for retry decisions, mirroring the
/// teacher's `FailureKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// May be transient; the queue should retry with backoff.
    Retryable,
    /// Permanent; the queue should dead-letter immediately.
    NonRetryable,
}

/// A job claimed by a worker, ready for execution.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub queue_job_id: Uuid,
    pub job: HealthCheckJob,
    pub attempt: i32,
}

/// Durable, at-least-once job buffer. Implementations must survive process
/// restart: in-flight jobs not acknowledged are redelivered.
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Append a job.
    async fn enqueue(&self, job: HealthCheckJob, opts: EnqueueOpts) -> Result<Uuid, QueueError>;

    /// Claim up to `limit` ready jobs for `worker_id`. The store is
    /// responsible for `FOR UPDATE SKIP LOCKED`-style atomic claiming so
    /// that no two workers claim the same job.
    async fn claim_ready(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>, QueueError>;

    /// Acknowledge successful completion. Acknowledgement occurs iff the
    /// handler returns without raising.
    async fn ack(&self, queue_job_id: Uuid) -> Result<(), QueueError>;

    /// Record a handler failure. Retryable failures get exponential backoff
    /// up to `attempts = 3` total; beyond that (or for non-retryable
    /// failures) the job moves to the failed/dead-letter set.
    async fn fail(&self, queue_job_id: Uuid, error: &str, kind: FailureKind) -> Result<(), QueueError>;
}

/// A `DispatchQueue` that rejects all enqueues. Useful for components that
/// don't need background execution.
pub struct NoOpDispatchQueue;

#[async_trait]
impl DispatchQueue for NoOpDispatchQueue {
    async fn enqueue(&self, _job: HealthCheckJob, _opts: EnqueueOpts) -> Result<Uuid, QueueError> {
        Err(QueueError::Backend(
            "no dispatch queue configured".to_string(),
        ))
    }

    async fn claim_ready(&self, _worker_id: &str, _limit: i64) -> Result<Vec<ClaimedJob>, QueueError> {
        Ok(Vec::new())
    }

    async fn ack(&self, _queue_job_id: Uuid) -> Result<(), QueueError> {
        Ok(())
    }

    async fn fail(&self, _queue_job_id: Uuid, _error: &str, _kind: FailureKind) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Default retry attempt ceiling (`attempts = 3` total).
pub const MAX_ATTEMPTS: i32 = 3;

/// Exponential backoff starting at 1000ms, doubling per attempt, matching
/// `seesaw-job-postgres`'s `2^attempt` schedule but capped far below its
/// one-hour ceiling since health-check retries are short-lived.
pub fn backoff_for_attempt(attempt: i32) -> std::time::Duration {
    let secs = 1u64.checked_shl(attempt.max(0) as u32).unwrap_or(u64::MAX);
    std::time::Duration::from_secs(secs.min(60))
}
