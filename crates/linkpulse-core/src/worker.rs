//! Worker Pool: a bounded set of concurrent consumers draining the Dispatch
//! Queue, each running a job through the Probe Engine and fanning the result
//! out to the Sink Adapters.

use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::ProbeResult;
use crate::probe::ProbeEngine;
use crate::queue::{ClaimedJob, DispatchQueue, FailureKind};
use crate::repository::MonitorRepository;
use crate::sinks::{HistoryRecord, HistorySinkRegistry, StateSink};

type Limiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Tunables for the pool: how many jobs run concurrently and how fast the
/// pool is allowed to pull from the queue.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub claim_batch_size: i64,
    pub poll_interval: Duration,
    pub rate_limit_max: u32,
    pub rate_limit_per: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            claim_batch_size: 10,
            poll_interval: Duration::from_millis(500),
            rate_limit_max: 100,
            rate_limit_per: Duration::from_secs(1),
        }
    }
}

/// Drains a [`DispatchQueue`], running each job through a [`ProbeEngine`] and
/// writing the outcome to a [`StateSink`] and a [`HistorySinkRegistry`].
///
/// Both sink writes are best-effort: a failing sink is logged and the job
/// still acks, since the probe itself succeeded and re-running it would not
/// repair a sink outage.
pub struct WorkerPool<R, Q, S> {
    worker_id: String,
    repository: Arc<R>,
    queue: Arc<Q>,
    probe: ProbeEngine,
    state_sink: Arc<S>,
    history_sinks: Arc<dyn HistorySinkRegistry>,
    config: WorkerConfig,
    limiter: Arc<Limiter>,
}

impl<R, Q, S> WorkerPool<R, Q, S>
where
    R: MonitorRepository + 'static,
    Q: DispatchQueue + 'static,
    S: StateSink + 'static,
{
    pub fn new(
        worker_id: impl Into<String>,
        repository: Arc<R>,
        queue: Arc<Q>,
        probe: ProbeEngine,
        state_sink: Arc<S>,
        history_sinks: Arc<dyn HistorySinkRegistry>,
        config: WorkerConfig,
    ) -> Self {
        let quota = Quota::with_period(
            config
                .rate_limit_per
                .checked_div(config.rate_limit_max.max(1))
                .unwrap_or(config.rate_limit_per),
        )
        .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)))
        .allow_burst(config.rate_limit_max.try_into().unwrap_or(nonzero!(1u32)));

        Self {
            worker_id: worker_id.into(),
            repository,
            queue,
            probe,
            state_sink,
            history_sinks,
            config,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Run the claim/execute loop until `shutdown` fires. New claims stop as
    /// soon as shutdown is requested; jobs already claimed are allowed to
    /// finish before the pool returns.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut interval = tokio::time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.clone().poll_once(&permits).await;
                }
                _ = shutdown.cancelled() => {
                    info!(worker_id = %self.worker_id, "worker pool draining in-flight jobs before exit");
                    let _ = permits.acquire_many(self.config.concurrency as u32).await;
                    break;
                }
            }
        }
    }

    async fn poll_once(self: Arc<Self>, permits: &Arc<Semaphore>) {
        let available = permits.available_permits() as i64;
        if available == 0 {
            return;
        }

        let limit = self.config.claim_batch_size.min(available);
        let claimed = match self.queue.claim_ready(&self.worker_id, limit).await {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(worker_id = %self.worker_id, error = %err, "claim_ready failed");
                return;
            }
        };

        for job in claimed {
            let permit = match Arc::clone(permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let pool = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                pool.execute(job).await;
            });
        }
    }

    /// Run a single claimed job end-to-end: rate limit, liveness re-check,
    /// probe, sink writes, ack/fail.
    async fn execute(&self, claimed: ClaimedJob) {
        self.limiter.until_ready().await;

        let ClaimedJob {
            queue_job_id,
            job,
            attempt,
        } = claimed;

        match self.repository.is_active(job.link_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(monitor_id = %job.link_id, "monitor deactivated since scheduling; acking without probing");
                self.ack(queue_job_id).await;
                return;
            }
            Err(err) => {
                warn!(monitor_id = %job.link_id, error = %err, "liveness re-check failed; probing anyway");
            }
        }

        let result = self.probe.probe(&job.long_url).await;
        let checked_at = chrono::Utc::now();

        if let Err(err) = self
            .state_sink
            .record_observation(job.link_id, &result, checked_at)
            .await
        {
            warn!(monitor_id = %job.link_id, error = %err, "state sink write failed, continuing");
        }

        let history_sink = self.history_sinks.sink_for(job.environment);
        let record = build_history_record(&job, &result, checked_at);
        if let Err(err) = history_sink.record(record).await {
            warn!(monitor_id = %job.link_id, error = %err, "history sink write failed, continuing");
        }

        if result.is_well_formed() {
            self.ack(queue_job_id).await;
        } else {
            // A malformed classification means the Probe Engine itself
            // misbehaved, not the target URL; retry the job rather than
            // persist a nonsensical observation (already done above, best
            // effort) silently.
            let message = format!("malformed probe result (attempt {attempt})");
            self.fail(queue_job_id, &message).await;
        }
    }

    async fn ack(&self, queue_job_id: Uuid) {
        if let Err(err) = self.queue.ack(queue_job_id).await {
            warn!(queue_job_id = %queue_job_id, error = %err, "ack failed");
        }
    }

    async fn fail(&self, queue_job_id: Uuid, message: &str) {
        if let Err(err) = self
            .queue
            .fail(queue_job_id, message, FailureKind::Retryable)
            .await
        {
            warn!(queue_job_id = %queue_job_id, error = %err, "fail failed");
        }
    }
}

fn build_history_record(
    job: &crate::model::HealthCheckJob,
    result: &ProbeResult,
    checked_at: chrono::DateTime<chrono::Utc>,
) -> HistoryRecord {
    HistoryRecord {
        shared_secret: String::new(),
        url_id: job.external_url_id.clone(),
        user_id: job.external_user_id.clone(),
        short_url: job.short_url.clone(),
        long_url: job.long_url.clone(),
        status_code: result.status_code,
        latency_ms: result.latency_ms,
        is_healthy: result.is_healthy,
        health_status: result.health_status.to_string(),
        error_message: result.error_message.clone(),
        checked_at_epoch_ms: checked_at.timestamp_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{QueueError, RepositoryError, SinkError};
    use crate::model::{Environment, HealthCheckJob, HealthStatus, Monitor};
    use crate::repository::{RegisterMonitor, RegisterOutcome};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct AlwaysActiveRepository;

    #[async_trait]
    impl MonitorRepository for AlwaysActiveRepository {
        async fn register(&self, _input: RegisterMonitor) -> Result<RegisterOutcome, RepositoryError> {
            unimplemented!()
        }
        async fn get(&self, _id: Uuid) -> Result<Option<Monitor>, RepositoryError> {
            unimplemented!()
        }
        async fn deactivate(&self, _id: Uuid) -> Result<bool, RepositoryError> {
            unimplemented!()
        }
        async fn select_eligible(
            &self,
            _batch_size: i64,
            _now: chrono::DateTime<chrono::Utc>,
        ) -> Result<Vec<Monitor>, RepositoryError> {
            unimplemented!()
        }
        async fn try_lease(
            &self,
            _id: Uuid,
            _now: chrono::DateTime<chrono::Utc>,
            _lock_duration_ms: i64,
        ) -> Result<bool, RepositoryError> {
            unimplemented!()
        }
        async fn commit_schedule(
            &self,
            _id: Uuid,
            _now: chrono::DateTime<chrono::Utc>,
            _interval_ms: i64,
        ) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn release_lease(&self, _id: Uuid) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn is_active(&self, _id: Uuid) -> Result<bool, RepositoryError> {
            Ok(true)
        }
    }

    struct InactiveRepository;

    #[async_trait]
    impl MonitorRepository for InactiveRepository {
        async fn register(&self, _input: RegisterMonitor) -> Result<RegisterOutcome, RepositoryError> {
            unimplemented!()
        }
        async fn get(&self, _id: Uuid) -> Result<Option<Monitor>, RepositoryError> {
            unimplemented!()
        }
        async fn deactivate(&self, _id: Uuid) -> Result<bool, RepositoryError> {
            unimplemented!()
        }
        async fn select_eligible(
            &self,
            _batch_size: i64,
            _now: chrono::DateTime<chrono::Utc>,
        ) -> Result<Vec<Monitor>, RepositoryError> {
            unimplemented!()
        }
        async fn try_lease(
            &self,
            _id: Uuid,
            _now: chrono::DateTime<chrono::Utc>,
            _lock_duration_ms: i64,
        ) -> Result<bool, RepositoryError> {
            unimplemented!()
        }
        async fn commit_schedule(
            &self,
            _id: Uuid,
            _now: chrono::DateTime<chrono::Utc>,
            _interval_ms: i64,
        ) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn release_lease(&self, _id: Uuid) -> Result<(), RepositoryError> {
            unimplemented!()
        }
        async fn is_active(&self, _id: Uuid) -> Result<bool, RepositoryError> {
            Ok(false)
        }
    }

    struct RecordingQueue {
        acked: Mutex<Vec<Uuid>>,
        failed: Mutex<Vec<Uuid>>,
    }

    impl RecordingQueue {
        fn new() -> Self {
            Self {
                acked: Mutex::new(Vec::new()),
                failed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DispatchQueue for RecordingQueue {
        async fn enqueue(
            &self,
            _job: HealthCheckJob,
            _opts: crate::queue::EnqueueOpts,
        ) -> Result<Uuid, QueueError> {
            Ok(Uuid::new_v4())
        }
        async fn claim_ready(&self, _worker_id: &str, _limit: i64) -> Result<Vec<ClaimedJob>, QueueError> {
            Ok(Vec::new())
        }
        async fn ack(&self, queue_job_id: Uuid) -> Result<(), QueueError> {
            self.acked.lock().unwrap().push(queue_job_id);
            Ok(())
        }
        async fn fail(&self, queue_job_id: Uuid, _error: &str, _kind: FailureKind) -> Result<(), QueueError> {
            self.failed.lock().unwrap().push(queue_job_id);
            Ok(())
        }
    }

    struct RecordingStateSink {
        observations: Mutex<Vec<ProbeResult>>,
    }

    #[async_trait]
    impl StateSink for RecordingStateSink {
        async fn record_observation(
            &self,
            _monitor_id: Uuid,
            result: &ProbeResult,
            _checked_at: chrono::DateTime<chrono::Utc>,
        ) -> Result<(), SinkError> {
            self.observations.lock().unwrap().push(result.clone());
            Ok(())
        }
    }

    struct NoOpHistorySink;

    #[async_trait]
    impl crate::sinks::HistorySink for NoOpHistorySink {
        async fn record(&self, _record: HistoryRecord) -> Result<(), SinkError> {
            Ok(())
        }
    }

    struct SingleHistorySinkRegistry(Arc<dyn crate::sinks::HistorySink>);

    impl HistorySinkRegistry for SingleHistorySinkRegistry {
        fn sink_for(&self, _environment: Environment) -> Arc<dyn crate::sinks::HistorySink> {
            self.0.clone()
        }
    }

    fn job() -> HealthCheckJob {
        HealthCheckJob {
            link_id: Uuid::new_v4(),
            external_url_id: "u1".into(),
            external_user_id: "usr1".into(),
            long_url: "https://example.invalid".into(),
            short_url: "https://s.example/1".into(),
            environment: Environment::Prod,
        }
    }

    #[tokio::test]
    async fn deactivated_monitor_acks_without_probing() {
        let queue = Arc::new(RecordingQueue::new());
        let state_sink = Arc::new(RecordingStateSink {
            observations: Mutex::new(Vec::new()),
        });
        let pool = WorkerPool::new(
            "worker-1",
            Arc::new(InactiveRepository),
            queue.clone(),
            ProbeEngine::new(reqwest::Client::new(), Default::default()),
            state_sink.clone(),
            Arc::new(SingleHistorySinkRegistry(Arc::new(NoOpHistorySink))),
            WorkerConfig::default(),
        );

        let queue_job_id = Uuid::new_v4();
        pool.execute(ClaimedJob {
            queue_job_id,
            job: job(),
            attempt: 1,
        })
        .await;

        assert_eq!(queue.acked.lock().unwrap().as_slice(), &[queue_job_id]);
        assert!(state_sink.observations.lock().unwrap().is_empty());
    }

    #[test]
    fn history_record_carries_probe_fields() {
        let probe_job = job();
        let result = ProbeResult {
            status_code: 200,
            latency_ms: 42,
            is_healthy: true,
            health_status: HealthStatus::Up,
            error_message: None,
        };
        let checked_at = chrono::Utc::now();
        let record = build_history_record(&probe_job, &result, checked_at);
        assert_eq!(record.url_id, "u1");
        assert_eq!(record.latency_ms, 42);
        assert!(record.is_healthy);
    }
}
