//! `health_check_jobs`-backed `DispatchQueue`: `FOR UPDATE SKIP LOCKED`
//! claiming, exponential backoff retry, and a dead-letter status for
//! terminal failures. Grounded directly on `seesaw-job-postgres`'s
//! `PgJobStore`, narrowed to `HealthCheckJob`'s fixed shape instead of a
//! generic `job_type`/`payload` pair.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use linkpulse_core::{
    backoff_for_attempt, ClaimedJob, DispatchQueue, EnqueueOpts, Environment, FailureKind,
    HealthCheckJob, QueueError, MAX_ATTEMPTS,
};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgDispatchQueue {
    pool: PgPool,
    lease_ms: i64,
}

impl PgDispatchQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_ms: 60_000,
        }
    }

    pub fn with_lease_ms(pool: PgPool, lease_ms: i64) -> Self {
        Self { pool, lease_ms }
    }
}

#[async_trait]
impl DispatchQueue for PgDispatchQueue {
    async fn enqueue(&self, job: HealthCheckJob, opts: EnqueueOpts) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let job_key = opts
            .job_id
            .unwrap_or_else(|| job.job_id(now.timestamp_millis()));

        sqlx::query(
            r#"
            INSERT INTO health_check_jobs (
                id, job_key, link_id, external_url_id, external_user_id,
                long_url, short_url, environment, priority, status,
                attempt, max_attempts, run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', 1, $10, $11, $11, $11)
            ON CONFLICT (job_key) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(&job_key)
        .bind(job.link_id)
        .bind(&job.external_url_id)
        .bind(&job.external_user_id)
        .bind(&job.long_url)
        .bind(&job.short_url)
        .bind(job.environment.to_string())
        .bind(opts.priority.0)
        .bind(MAX_ATTEMPTS)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(id)
    }

    async fn claim_ready(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>, QueueError> {
        let lease_expires_at = Utc::now() + chrono::Duration::milliseconds(self.lease_ms);

        let rows = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id
                FROM health_check_jobs
                WHERE status = 'pending' AND run_at <= NOW()
                ORDER BY priority ASC, run_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE health_check_jobs
            SET status = 'running', worker_id = $2, lease_expires_at = $3, updated_at = NOW()
            WHERE id IN (SELECT id FROM claimable)
            RETURNING id, link_id, external_url_id, external_user_id, long_url, short_url, environment, attempt
            "#,
        )
        .bind(limit)
        .bind(worker_id)
        .bind(lease_expires_at)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let environment: String = row.get("environment");
                Ok(ClaimedJob {
                    queue_job_id: row.get("id"),
                    attempt: row.get("attempt"),
                    job: HealthCheckJob {
                        link_id: row.get("link_id"),
                        external_url_id: row.get("external_url_id"),
                        external_user_id: row.get("external_user_id"),
                        long_url: row.get("long_url"),
                        short_url: row.get("short_url"),
                        environment: Environment::from_str(&environment)
                            .map_err(QueueError::Backend)?,
                    },
                })
            })
            .collect()
    }

    async fn ack(&self, queue_job_id: Uuid) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE health_check_jobs SET status = 'succeeded', updated_at = NOW() WHERE id = $1",
        )
        .bind(queue_job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn fail(&self, queue_job_id: Uuid, error: &str, kind: FailureKind) -> Result<(), QueueError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let row = sqlx::query(
            "SELECT attempt, max_attempts FROM health_check_jobs WHERE id = $1 FOR UPDATE",
        )
        .bind(queue_job_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?
        .ok_or_else(|| QueueError::NotFound(queue_job_id.to_string()))?;

        let attempt: i32 = row.get("attempt");
        let max_attempts: i32 = row.get("max_attempts");

        if kind == FailureKind::Retryable && attempt < max_attempts {
            let retry_at = Utc::now() + backoff_for_attempt(attempt - 1);
            sqlx::query(
                r#"
                UPDATE health_check_jobs
                SET status = 'pending',
                    run_at = $1,
                    attempt = attempt + 1,
                    error_message = $2,
                    error_kind = 'retryable',
                    worker_id = NULL,
                    lease_expires_at = NULL,
                    updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(retry_at)
            .bind(error)
            .bind(queue_job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        } else {
            sqlx::query(
                r#"
                UPDATE health_check_jobs
                SET status = 'dead_letter',
                    error_message = $1,
                    error_kind = $2,
                    updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(error)
            .bind(match kind {
                FailureKind::Retryable => "retryable",
                FailureKind::NonRetryable => "non_retryable",
            })
            .bind(queue_job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }
}

impl PgDispatchQueue {
    /// Requeue jobs whose lease has expired without an ack/fail — the
    /// worker that claimed them crashed or hung. Mirrors
    /// `PgJobStore::reclaim_expired`; call periodically alongside the
    /// Scheduler tick.
    pub async fn reclaim_expired(&self) -> Result<u64, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE health_check_jobs
            SET status = 'pending', worker_id = NULL, lease_expires_at = NULL, updated_at = NOW()
            WHERE status = 'running' AND lease_expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
