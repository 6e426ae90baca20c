//! Monitor repository: the relational store backing both the Scheduler's
//! eligibility scan / lease acquisition and the Admin API's CRUD surface.
//!
//! Kept separate from [`crate::sinks::StateSink`] (the last-observation
//! write after a probe) even though one Postgres implementation backs both,
//! because the Scheduler and the Admin API only ever need this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::model::{Environment, Monitor};

/// Fields accepted by `POST /monitors/register`. `interval_ms` and
/// `environment` both fall back to defaults when the caller omits them.
#[derive(Debug, Clone)]
pub struct RegisterMonitor {
    pub external_url_id: String,
    pub external_user_id: String,
    pub long_url: String,
    pub short_url: String,
    pub interval_ms: Option<i64>,
    pub environment: Option<Environment>,
}

/// Outcome of a register call: `{success, linkId}` for a new monitor, or
/// `{success, message: "Already registered"}` when the natural key already
/// exists.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    Created(Uuid),
    AlreadyRegistered(Uuid),
}

#[async_trait]
pub trait MonitorRepository: Send + Sync {
    /// Upsert on the natural key `external_url_id` with `onConflictDoNothing`:
    /// two sequential registers with equal `external_url_id` yield exactly
    /// one row.
    async fn register(&self, input: RegisterMonitor) -> Result<RegisterOutcome, RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<Monitor>, RepositoryError>;

    /// Soft delete (`is_active = false`). Never physically removes a row.
    async fn deactivate(&self, id: Uuid) -> Result<bool, RepositoryError>;

    /// Up to `batch_size` eligible monitors, ordered ascending by
    /// `next_check_at` so the oldest-overdue monitor dequeues first. The
    /// batch bound is enforced by the caller passing the limit.
    async fn select_eligible(
        &self,
        batch_size: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Monitor>, RepositoryError>;

    /// Atomically acquire the scheduling lease for `id`, conditioned on the
    /// monitor still being eligible. Returns `true` iff the lease was
    /// acquired (another process may have already leased or deactivated it
    /// between selection and this call).
    async fn try_lease(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lock_duration_ms: i64,
    ) -> Result<bool, RepositoryError>;

    /// Advance `next_check_at` after a successful enqueue. The lease taken
    /// by `try_lease` is left in place; it is cleared by the Worker Pool's
    /// State Sink write on probe completion, or expires on its own if the
    /// worker never finishes.
    async fn commit_schedule(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        interval_ms: i64,
    ) -> Result<(), RepositoryError>;

    /// Release a lease taken by `try_lease` without advancing
    /// `next_check_at`, used when the enqueue that was supposed to follow
    /// the lease failed. Leaves the monitor immediately re-eligible rather
    /// than stuck until the lease naturally expires.
    async fn release_lease(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// Re-check `is_active` at dequeue time, tolerating deactivation that
    /// happened between scheduler selection and worker execution.
    async fn is_active(&self, id: Uuid) -> Result<bool, RepositoryError>;
}
