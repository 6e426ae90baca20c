//! `monitored_links` row access: the Scheduler's eligibility scan and lease,
//! the Admin API's register/get/deactivate surface, and the Worker Pool's
//! last-observation write, all over one table.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use linkpulse_core::{
    Environment, HealthStatus, Monitor, MonitorRepository, ProbeResult, RegisterMonitor,
    RegisterOutcome, RepositoryError, SinkError, StateSink,
};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgMonitorStore {
    pool: PgPool,
}

impl PgMonitorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_monitor(row: &sqlx::postgres::PgRow) -> Result<Monitor, RepositoryError> {
    let environment: String = row.get("environment");
    let current_status: String = row.get("current_status");

    Ok(Monitor {
        id: row.get("id"),
        external_url_id: row.get("external_url_id"),
        external_user_id: row.get("external_user_id"),
        long_url: row.get("long_url"),
        short_url: row.get("short_url"),
        environment: Environment::from_str(&environment)
            .map_err(RepositoryError::Backend)?,
        interval_ms: row.get("interval_ms"),
        next_check_at: row.get("next_check_at"),
        scheduler_locked_until: row.get("scheduler_locked_until"),
        is_active: row.get("is_active"),
        current_status: HealthStatus::from_str(&current_status)
            .map_err(RepositoryError::Backend)?,
        last_checked_at: row.get("last_checked_at"),
        last_status_code: row.get("last_status_code"),
        last_latency_ms: row.get("last_latency_ms"),
        consecutive_failures: row.get("consecutive_failures"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl MonitorRepository for PgMonitorStore {
    async fn register(&self, input: RegisterMonitor) -> Result<RegisterOutcome, RepositoryError> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let interval_ms = input.interval_ms.unwrap_or(linkpulse_core::MIN_INTERVAL_MS.max(60_000));
        let environment = input.environment.unwrap_or_default();

        let row = sqlx::query(
            r#"
            INSERT INTO monitored_links (
                id, external_url_id, external_user_id, long_url, short_url,
                environment, interval_ms, next_check_at, is_active,
                current_status, consecutive_failures, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, 'pending', 0, $9, $9)
            ON CONFLICT (external_url_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(&input.external_url_id)
        .bind(&input.external_user_id)
        .bind(&input.long_url)
        .bind(&input.short_url)
        .bind(environment.to_string())
        .bind(interval_ms)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Backend(e.to_string()))?;

        if let Some(row) = row {
            return Ok(RegisterOutcome::Created(row.get("id")));
        }

        let existing = sqlx::query("SELECT id FROM monitored_links WHERE external_url_id = $1")
            .bind(&input.external_url_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))?;

        Ok(RegisterOutcome::AlreadyRegistered(existing.get("id")))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Monitor>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM monitored_links WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))?;

        row.as_ref().map(row_to_monitor).transpose()
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE monitored_links SET is_active = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn select_eligible(
        &self,
        batch_size: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Monitor>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM monitored_links
            WHERE is_active
              AND next_check_at <= $1
              AND (scheduler_locked_until IS NULL OR scheduler_locked_until <= $1)
            ORDER BY next_check_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Backend(e.to_string()))?;

        rows.iter().map(row_to_monitor).collect()
    }

    async fn try_lease(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lock_duration_ms: i64,
    ) -> Result<bool, RepositoryError> {
        let locked_until = now + Duration::milliseconds(lock_duration_ms);
        let result = sqlx::query(
            r#"
            UPDATE monitored_links
            SET scheduler_locked_until = $1, updated_at = $2
            WHERE id = $3
              AND is_active
              AND next_check_at <= $2
              AND (scheduler_locked_until IS NULL OR scheduler_locked_until <= $2)
            "#,
        )
        .bind(locked_until)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit_schedule(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        interval_ms: i64,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE monitored_links
            SET next_check_at = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(now + Duration::milliseconds(interval_ms))
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn release_lease(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE monitored_links SET scheduler_locked_until = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn is_active(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT is_active FROM monitored_links WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))?;

        Ok(row.map(|r| r.get("is_active")).unwrap_or(false))
    }
}

/// The State Sink write: `last_*` fields, cleared lease, and a relative
/// increment on `consecutive_failures` so concurrent writers compose.
#[async_trait]
impl StateSink for PgMonitorStore {
    async fn record_observation(
        &self,
        monitor_id: Uuid,
        result: &ProbeResult,
        checked_at: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        sqlx::query(
            r#"
            UPDATE monitored_links
            SET last_checked_at = $1,
                current_status = $2,
                last_status_code = $3,
                last_latency_ms = $4,
                scheduler_locked_until = NULL,
                consecutive_failures = CASE WHEN $5 THEN 0 ELSE consecutive_failures + 1 END,
                updated_at = $1
            WHERE id = $6
            "#,
        )
        .bind(checked_at)
        .bind(result.health_status.to_string())
        .bind(result.status_code)
        .bind(result.latency_ms as i32)
        .bind(result.is_healthy)
        .bind(monitor_id)
        .execute(&self.pool)
        .await
        .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_defaults_interval_when_omitted() {
        let input = RegisterMonitor {
            external_url_id: "u1".into(),
            external_user_id: "usr1".into(),
            long_url: "https://example.com".into(),
            short_url: "https://s.example/1".into(),
            interval_ms: None,
            environment: None,
        };
        assert_eq!(input.interval_ms.unwrap_or(60_000), 60_000);
    }
}
