use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use linkpulse_core::{
    Monitor, MonitorRepository, ProbeResult, RegisterMonitor, RegisterOutcome, RepositoryError,
    SinkError, StateSink,
};
use uuid::Uuid;

/// In-memory `MonitorRepository` + `StateSink`, backed by a `HashMap` keyed
/// by id plus a secondary index on `external_url_id` for register
/// idempotency (P6).
#[derive(Default)]
pub struct InMemoryMonitorStore {
    monitors: Mutex<HashMap<Uuid, Monitor>>,
}

impl InMemoryMonitorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a monitor directly, bypassing `register` — useful for scheduler
    /// and worker pool tests that don't exercise the Admin API surface.
    pub fn seed(&self, monitor: Monitor) {
        self.monitors.lock().unwrap().insert(monitor.id, monitor);
    }

    pub fn snapshot(&self, id: Uuid) -> Option<Monitor> {
        self.monitors.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl MonitorRepository for InMemoryMonitorStore {
    async fn register(&self, input: RegisterMonitor) -> Result<RegisterOutcome, RepositoryError> {
        let mut monitors = self.monitors.lock().unwrap();
        if let Some(existing) = monitors
            .values()
            .find(|m| m.external_url_id == input.external_url_id)
        {
            return Ok(RegisterOutcome::AlreadyRegistered(existing.id));
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let monitor = Monitor {
            id,
            external_url_id: input.external_url_id,
            external_user_id: input.external_user_id,
            long_url: input.long_url,
            short_url: input.short_url,
            environment: input.environment.unwrap_or_default(),
            interval_ms: input.interval_ms.unwrap_or(60_000),
            next_check_at: now,
            scheduler_locked_until: None,
            is_active: true,
            current_status: linkpulse_core::HealthStatus::Pending,
            last_checked_at: None,
            last_status_code: None,
            last_latency_ms: None,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        };
        monitors.insert(id, monitor);
        Ok(RegisterOutcome::Created(id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Monitor>, RepositoryError> {
        Ok(self.monitors.lock().unwrap().get(&id).cloned())
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let mut monitors = self.monitors.lock().unwrap();
        if let Some(m) = monitors.get_mut(&id) {
            m.is_active = false;
            m.updated_at = Utc::now();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn select_eligible(
        &self,
        batch_size: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Monitor>, RepositoryError> {
        let monitors = self.monitors.lock().unwrap();
        let mut eligible: Vec<Monitor> = monitors
            .values()
            .filter(|m| m.is_eligible(now))
            .cloned()
            .collect();
        eligible.sort_by(|a, b| a.next_check_at.cmp(&b.next_check_at).then(a.id.cmp(&b.id)));
        eligible.truncate(batch_size.max(0) as usize);
        Ok(eligible)
    }

    async fn try_lease(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lock_duration_ms: i64,
    ) -> Result<bool, RepositoryError> {
        let mut monitors = self.monitors.lock().unwrap();
        match monitors.get_mut(&id) {
            Some(m) if m.is_eligible(now) => {
                m.scheduler_locked_until = Some(now + Duration::milliseconds(lock_duration_ms));
                m.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit_schedule(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        interval_ms: i64,
    ) -> Result<(), RepositoryError> {
        let mut monitors = self.monitors.lock().unwrap();
        if let Some(m) = monitors.get_mut(&id) {
            m.next_check_at = now + Duration::milliseconds(interval_ms);
            m.updated_at = now;
        }
        Ok(())
    }

    async fn release_lease(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut monitors = self.monitors.lock().unwrap();
        if let Some(m) = monitors.get_mut(&id) {
            m.scheduler_locked_until = None;
        }
        Ok(())
    }

    async fn is_active(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self
            .monitors
            .lock()
            .unwrap()
            .get(&id)
            .map(|m| m.is_active)
            .unwrap_or(false))
    }
}

#[async_trait]
impl StateSink for InMemoryMonitorStore {
    async fn record_observation(
        &self,
        monitor_id: Uuid,
        result: &ProbeResult,
        checked_at: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        let mut monitors = self.monitors.lock().unwrap();
        if let Some(m) = monitors.get_mut(&monitor_id) {
            m.last_checked_at = Some(checked_at);
            m.current_status = result.health_status;
            m.last_status_code = Some(result.status_code);
            m.last_latency_ms = Some(result.latency_ms as i32);
            m.scheduler_locked_until = None;
            m.consecutive_failures = if result.is_healthy {
                0
            } else {
                m.consecutive_failures + 1
            };
            m.updated_at = checked_at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_input() -> RegisterMonitor {
        RegisterMonitor {
            external_url_id: "u1".into(),
            external_user_id: "usr1".into(),
            long_url: "https://example.com".into(),
            short_url: "https://s.example/1".into(),
            interval_ms: None,
            environment: None,
        }
    }

    #[tokio::test]
    async fn register_is_idempotent_on_external_url_id() {
        let store = InMemoryMonitorStore::new();
        let first = store.register(register_input()).await.unwrap();
        let second = store.register(register_input()).await.unwrap();

        let RegisterOutcome::Created(id) = first else {
            panic!("expected Created");
        };
        assert_eq!(second, RegisterOutcome::AlreadyRegistered(id));
    }

    #[tokio::test]
    async fn deactivated_monitor_is_excluded_from_select_eligible() {
        let store = InMemoryMonitorStore::new();
        let RegisterOutcome::Created(id) = store.register(register_input()).await.unwrap() else {
            panic!("expected Created");
        };

        store.deactivate(id).await.unwrap();
        let batch = store.select_eligible(10, Utc::now()).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn record_observation_resets_failures_on_healthy_result() {
        let store = InMemoryMonitorStore::new();
        let RegisterOutcome::Created(id) = store.register(register_input()).await.unwrap() else {
            panic!("expected Created");
        };

        let mut monitor = store.snapshot(id).unwrap();
        monitor.consecutive_failures = 3;
        store.seed(monitor);

        let result = ProbeResult {
            status_code: 200,
            latency_ms: 10,
            is_healthy: true,
            health_status: linkpulse_core::HealthStatus::Up,
            error_message: None,
        };
        store.record_observation(id, &result, Utc::now()).await.unwrap();

        assert_eq!(store.snapshot(id).unwrap().consecutive_failures, 0);
    }
}
