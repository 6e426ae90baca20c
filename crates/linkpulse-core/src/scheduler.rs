//! Scheduler: a periodic leader-less ticker that converts due Monitor rows
//! into queued Jobs while guaranteeing at-most-one in-flight probe per
//! monitor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::model::HealthCheckJob;
use crate::queue::{DispatchQueue, EnqueueOpts};
use crate::repository::MonitorRepository;

/// Tunables, defaulting to the values used when the corresponding
/// environment variables are unset.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub batch_size: i64,
    pub lock_duration_ms: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10_000),
            batch_size: 500,
            lock_duration_ms: 30_000,
        }
    }
}

/// The periodic ticker. `running` is a process-local flag; it resets on
/// restart since it is never persisted.
pub struct Scheduler<R, Q> {
    repository: Arc<R>,
    queue: Arc<Q>,
    config: SchedulerConfig,
    running: AtomicBool,
}

/// Summary of one tick, for the caller to log/emit as metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub selected: usize,
    pub queued: usize,
}

impl<R, Q> Scheduler<R, Q>
where
    R: MonitorRepository + 'static,
    Q: DispatchQueue + 'static,
{
    pub fn new(repository: Arc<R>, queue: Arc<Q>, config: SchedulerConfig) -> Self {
        Self {
            repository,
            queue,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Run the ticker until `shutdown` fires. Each tick completes in full
    /// even if shutdown is signalled mid-tick.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.clone().tick().await;
                }
                _ = shutdown.cancelled() => {
                    info!("scheduler ticker stopping on shutdown signal");
                    break;
                }
            }
        }
    }

    /// One tick: reentrancy guard, select batch, enqueue + lease per row.
    /// Never panics or propagates to the caller — all failures are logged
    /// and the next tick retries.
    pub async fn tick(self: Arc<Self>) -> TickOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("scheduler tick skipped: previous tick still running");
            return TickOutcome::default();
        }

        let start = Instant::now();
        let outcome = self.run_tick_body().await;
        let tick_duration_ms = start.elapsed().as_millis();

        info!(
            queued = outcome.queued,
            selected = outcome.selected,
            tick_duration_ms,
            "scheduler tick complete"
        );

        self.running.store(false, Ordering::Release);
        outcome
    }

    async fn run_tick_body(&self) -> TickOutcome {
        let now = Utc::now();

        let batch = match self
            .repository
            .select_eligible(self.config.batch_size, now)
            .await
        {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, "scheduler batch read failed; next tick retries");
                return TickOutcome::default();
            }
        };

        let selected = batch.len();
        let mut queued = 0usize;

        for monitor in batch {
            // Lease first: if we crash or the enqueue fails before the
            // lease is committed to a `next_check_at` advance, the lease
            // simply expires and the monitor becomes re-eligible. Leasing
            // before enqueueing and rolling back on enqueue failure avoids
            // rapid re-dispatch that an enqueue-first ordering would risk.
            let leased = match self
                .repository
                .try_lease(monitor.id, now, self.config.lock_duration_ms)
                .await
            {
                Ok(leased) => leased,
                Err(err) => {
                    warn!(monitor_id = %monitor.id, error = %err, "lease acquisition failed; abandoning rest of batch");
                    break;
                }
            };

            if !leased {
                // Raced with another replica or the monitor was deactivated
                // between selection and now; skip it, no harm done.
                continue;
            }

            let job = HealthCheckJob::from_monitor(&monitor);
            let job_id = job.job_id(now.timestamp_millis());
            let enqueue_result = self
                .queue
                .enqueue(job, EnqueueOpts::scheduled(job_id))
                .await;

            match enqueue_result {
                Ok(_) => {
                    if let Err(err) = self
                        .repository
                        .commit_schedule(monitor.id, now, monitor.interval_ms)
                        .await
                    {
                        warn!(monitor_id = %monitor.id, error = %err, "failed to advance next_check_at after enqueue");
                    }
                    queued += 1;
                }
                Err(err) => {
                    warn!(monitor_id = %monitor.id, error = %err, "enqueue failed; releasing lease and abandoning rest of batch");
                    if let Err(release_err) = self.repository.release_lease(monitor.id).await {
                        warn!(monitor_id = %monitor.id, error = %release_err, "failed to release lease after enqueue failure");
                    }
                    // Remainder of the batch is abandoned for this tick.
                    break;
                }
            }
        }

        TickOutcome { selected, queued }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{QueueError, RepositoryError};
    use crate::model::{Environment, Monitor};
    use crate::queue::ClaimedJob;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeRepository {
        monitors: Mutex<Vec<Monitor>>,
        fail_select: bool,
    }

    fn sample_monitor(now: chrono::DateTime<Utc>) -> Monitor {
        Monitor {
            id: Uuid::new_v4(),
            external_url_id: "u1".into(),
            external_user_id: "usr1".into(),
            long_url: "https://example.com".into(),
            short_url: "https://s.example/1".into(),
            environment: Environment::Prod,
            interval_ms: 60_000,
            next_check_at: now,
            scheduler_locked_until: None,
            is_active: true,
            current_status: crate::model::HealthStatus::Pending,
            last_checked_at: None,
            last_status_code: None,
            last_latency_ms: None,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[async_trait]
    impl MonitorRepository for FakeRepository {
        async fn register(
            &self,
            _input: crate::repository::RegisterMonitor,
        ) -> Result<crate::repository::RegisterOutcome, RepositoryError> {
            unimplemented!("not exercised by scheduler tests")
        }

        async fn get(&self, _id: Uuid) -> Result<Option<Monitor>, RepositoryError> {
            unimplemented!("not exercised by scheduler tests")
        }

        async fn deactivate(&self, _id: Uuid) -> Result<bool, RepositoryError> {
            unimplemented!("not exercised by scheduler tests")
        }

        async fn select_eligible(
            &self,
            batch_size: i64,
            _now: chrono::DateTime<Utc>,
        ) -> Result<Vec<Monitor>, RepositoryError> {
            if self.fail_select {
                return Err(RepositoryError::Backend("boom".into()));
            }
            let monitors = self.monitors.lock().unwrap();
            Ok(monitors.iter().take(batch_size as usize).cloned().collect())
        }

        async fn try_lease(
            &self,
            id: Uuid,
            now: chrono::DateTime<Utc>,
            lock_duration_ms: i64,
        ) -> Result<bool, RepositoryError> {
            let mut monitors = self.monitors.lock().unwrap();
            if let Some(m) = monitors.iter_mut().find(|m| m.id == id) {
                if !m.is_eligible(now) {
                    return Ok(false);
                }
                m.scheduler_locked_until = Some(now + chrono::Duration::milliseconds(lock_duration_ms));
                Ok(true)
            } else {
                Ok(false)
            }
        }

        async fn commit_schedule(
            &self,
            id: Uuid,
            now: chrono::DateTime<Utc>,
            interval_ms: i64,
        ) -> Result<(), RepositoryError> {
            let mut monitors = self.monitors.lock().unwrap();
            if let Some(m) = monitors.iter_mut().find(|m| m.id == id) {
                m.next_check_at = now + chrono::Duration::milliseconds(interval_ms);
            }
            Ok(())
        }

        async fn release_lease(&self, id: Uuid) -> Result<(), RepositoryError> {
            let mut monitors = self.monitors.lock().unwrap();
            if let Some(m) = monitors.iter_mut().find(|m| m.id == id) {
                m.scheduler_locked_until = None;
            }
            Ok(())
        }

        async fn is_active(&self, id: Uuid) -> Result<bool, RepositoryError> {
            let monitors = self.monitors.lock().unwrap();
            Ok(monitors.iter().find(|m| m.id == id).map(|m| m.is_active).unwrap_or(false))
        }
    }

    struct FakeQueue {
        enqueued: Mutex<Vec<HealthCheckJob>>,
        fail_enqueue: bool,
    }

    #[async_trait]
    impl DispatchQueue for FakeQueue {
        async fn enqueue(&self, job: HealthCheckJob, _opts: EnqueueOpts) -> Result<Uuid, QueueError> {
            if self.fail_enqueue {
                return Err(QueueError::Backend("enqueue boom".into()));
            }
            self.enqueued.lock().unwrap().push(job);
            Ok(Uuid::new_v4())
        }

        async fn claim_ready(&self, _worker_id: &str, _limit: i64) -> Result<Vec<ClaimedJob>, QueueError> {
            Ok(Vec::new())
        }

        async fn ack(&self, _queue_job_id: Uuid) -> Result<(), QueueError> {
            Ok(())
        }

        async fn fail(&self, _queue_job_id: Uuid, _error: &str, _kind: crate::queue::FailureKind) -> Result<(), QueueError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn tick_enqueues_eligible_monitors_and_advances_schedule() {
        let now = Utc::now();
        let monitor = sample_monitor(now);
        let id = monitor.id;
        let repo = Arc::new(FakeRepository {
            monitors: Mutex::new(vec![monitor]),
            fail_select: false,
        });
        let queue = Arc::new(FakeQueue {
            enqueued: Mutex::new(Vec::new()),
            fail_enqueue: false,
        });
        let scheduler = Arc::new(Scheduler::new(repo.clone(), queue.clone(), SchedulerConfig::default()));

        let outcome = scheduler.tick().await;
        assert_eq!(outcome.selected, 1);
        assert_eq!(outcome.queued, 1);
        assert_eq!(queue.enqueued.lock().unwrap().len(), 1);

        let monitors = repo.monitors.lock().unwrap();
        let updated = monitors.iter().find(|m| m.id == id).unwrap();
        assert!(updated.next_check_at > now);
        assert!(updated.scheduler_locked_until.is_some());
    }

    #[tokio::test]
    async fn tick_releases_lease_on_enqueue_failure() {
        let now = Utc::now();
        let monitor = sample_monitor(now);
        let id = monitor.id;
        let repo = Arc::new(FakeRepository {
            monitors: Mutex::new(vec![monitor]),
            fail_select: false,
        });
        let queue = Arc::new(FakeQueue {
            enqueued: Mutex::new(Vec::new()),
            fail_enqueue: true,
        });
        let scheduler = Arc::new(Scheduler::new(repo.clone(), queue.clone(), SchedulerConfig::default()));

        let outcome = scheduler.tick().await;
        assert_eq!(outcome.queued, 0);

        let monitors = repo.monitors.lock().unwrap();
        let updated = monitors.iter().find(|m| m.id == id).unwrap();
        // next_check_at untouched, lease released -> immediately re-eligible.
        assert_eq!(updated.next_check_at, now);
        assert!(updated.scheduler_locked_until.is_none());
    }

    #[tokio::test]
    async fn tick_returns_empty_outcome_on_select_failure() {
        let repo = Arc::new(FakeRepository {
            monitors: Mutex::new(Vec::new()),
            fail_select: true,
        });
        let queue = Arc::new(FakeQueue {
            enqueued: Mutex::new(Vec::new()),
            fail_enqueue: false,
        });
        let scheduler = Arc::new(Scheduler::new(repo, queue, SchedulerConfig::default()));

        let outcome = scheduler.tick().await;
        assert_eq!(outcome, TickOutcome::default());
    }

    #[tokio::test]
    async fn reentrant_tick_is_skipped() {
        let now = Utc::now();
        let repo = Arc::new(FakeRepository {
            monitors: Mutex::new(vec![sample_monitor(now)]),
            fail_select: false,
        });
        let queue = Arc::new(FakeQueue {
            enqueued: Mutex::new(Vec::new()),
            fail_enqueue: false,
        });
        let scheduler = Arc::new(Scheduler::new(repo, queue, SchedulerConfig::default()));

        scheduler.running.store(true, Ordering::Release);
        let outcome = scheduler.clone().tick().await;
        assert_eq!(outcome, TickOutcome::default());
    }
}
