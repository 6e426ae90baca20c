use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linkpulse_core::{
    backoff_for_attempt, ClaimedJob, DispatchQueue, EnqueueOpts, FailureKind, HealthCheckJob,
    Priority, QueueError, MAX_ATTEMPTS,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobStatus {
    Pending,
    Running,
    Succeeded,
    DeadLetter,
}

#[derive(Debug, Clone)]
struct Entry {
    id: Uuid,
    job: HealthCheckJob,
    priority: Priority,
    status: JobStatus,
    attempt: i32,
    run_at: DateTime<Utc>,
    enqueued_seq: u64,
}

/// In-memory `DispatchQueue`: a `Vec` of entries claimed in priority/run_at
/// order. Retry/backoff math matches `linkpulse_core::backoff_for_attempt`
/// and the `MAX_ATTEMPTS` ceiling so tests exercise the same retry policy
/// the Postgres-backed queue does.
#[derive(Default)]
pub struct InMemoryDispatchQueue {
    entries: Mutex<Vec<Entry>>,
    next_seq: Mutex<u64>,
}

impl InMemoryDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.status == JobStatus::Pending)
            .count()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.status == JobStatus::DeadLetter)
            .count()
    }
}

#[async_trait]
impl DispatchQueue for InMemoryDispatchQueue {
    async fn enqueue(&self, job: HealthCheckJob, opts: EnqueueOpts) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let mut seq_guard = self.next_seq.lock().unwrap();
        let seq = *seq_guard;
        *seq_guard += 1;
        drop(seq_guard);

        self.entries.lock().unwrap().push(Entry {
            id,
            job,
            priority: opts.priority,
            status: JobStatus::Pending,
            attempt: 1,
            run_at: Utc::now(),
            enqueued_seq: seq,
        });
        Ok(id)
    }

    async fn claim_ready(&self, _worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>, QueueError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();

        let mut ready_ids: Vec<Uuid> = entries
            .iter()
            .filter(|e| e.status == JobStatus::Pending && e.run_at <= now)
            .map(|e| e.id)
            .collect();

        ready_ids.sort_by_key(|id| {
            let e = entries.iter().find(|e| e.id == *id).unwrap();
            (e.priority, e.run_at, e.enqueued_seq)
        });
        ready_ids.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(ready_ids.len());
        for id in ready_ids {
            let entry = entries.iter_mut().find(|e| e.id == id).unwrap();
            entry.status = JobStatus::Running;
            claimed.push(ClaimedJob {
                queue_job_id: entry.id,
                job: entry.job.clone(),
                attempt: entry.attempt,
            });
        }
        Ok(claimed)
    }

    async fn ack(&self, queue_job_id: Uuid) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == queue_job_id)
            .ok_or_else(|| QueueError::NotFound(queue_job_id.to_string()))?;
        entry.status = JobStatus::Succeeded;
        Ok(())
    }

    async fn fail(&self, queue_job_id: Uuid, _error: &str, kind: FailureKind) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == queue_job_id)
            .ok_or_else(|| QueueError::NotFound(queue_job_id.to_string()))?;

        if kind == FailureKind::Retryable && entry.attempt < MAX_ATTEMPTS {
            entry.status = JobStatus::Pending;
            entry.run_at = Utc::now()
                + chrono::Duration::from_std(backoff_for_attempt(entry.attempt - 1)).unwrap();
            entry.attempt += 1;
        } else {
            entry.status = JobStatus::DeadLetter;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpulse_core::Environment;

    fn job() -> HealthCheckJob {
        HealthCheckJob {
            link_id: Uuid::new_v4(),
            external_url_id: "u1".into(),
            external_user_id: "usr1".into(),
            long_url: "https://example.com".into(),
            short_url: "https://s.example/1".into(),
            environment: Environment::Prod,
        }
    }

    #[tokio::test]
    async fn claim_respects_priority_order() {
        let queue = InMemoryDispatchQueue::new();
        queue.enqueue(job(), EnqueueOpts::scheduled("sched-1".into())).await.unwrap();
        queue.enqueue(job(), EnqueueOpts::force_check("force-1".into())).await.unwrap();

        let claimed = queue.claim_ready("w1", 10).await.unwrap();
        assert_eq!(claimed.len(), 2);
        // force-check (priority 0) claims before the scheduled job (priority 10).
        assert_eq!(claimed[0].job.external_url_id, "u1");
    }

    #[tokio::test]
    async fn exhausted_retries_dead_letter() {
        let queue = InMemoryDispatchQueue::new();
        let id = queue.enqueue(job(), EnqueueOpts::default()).await.unwrap();

        for _ in 0..MAX_ATTEMPTS {
            queue.claim_ready("w1", 10).await.unwrap();
            queue.fail(id, "boom", FailureKind::Retryable).await.unwrap();
        }

        assert_eq!(queue.dead_letter_count(), 1);
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn non_retryable_failure_dead_letters_immediately() {
        let queue = InMemoryDispatchQueue::new();
        let id = queue.enqueue(job(), EnqueueOpts::default()).await.unwrap();
        queue.claim_ready("w1", 10).await.unwrap();
        queue.fail(id, "permanent", FailureKind::NonRetryable).await.unwrap();

        assert_eq!(queue.dead_letter_count(), 1);
    }
}
