//! Domain types shared by the Scheduler, Worker Pool, and Sink Adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which History Sink instance a monitor's observations are forwarded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Prod
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Dev => write!(f, "dev"),
            Environment::Prod => write!(f, "prod"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// The last-observed health of a monitor. `Pending` only holds before the
/// first probe completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Pending,
    Up,
    Degraded,
    Down,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Pending => "pending",
            HealthStatus::Up => "up",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Down => "down",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(HealthStatus::Pending),
            "up" => Ok(HealthStatus::Up),
            "degraded" => Ok(HealthStatus::Degraded),
            "down" => Ok(HealthStatus::Down),
            other => Err(format!("unknown health status: {other}")),
        }
    }
}

/// A persisted row describing one URL to probe on a cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct Monitor {
    pub id: Uuid,
    pub external_url_id: String,
    pub external_user_id: String,

    pub long_url: String,
    pub short_url: String,
    pub environment: Environment,

    pub interval_ms: i64,
    pub next_check_at: DateTime<Utc>,
    pub scheduler_locked_until: Option<DateTime<Utc>>,
    pub is_active: bool,

    pub current_status: HealthStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_status_code: Option<i32>,
    pub last_latency_ms: Option<i32>,
    pub consecutive_failures: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// A monitor is eligible for scheduling iff active, due, and not leased.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.next_check_at <= now
            && self
                .scheduler_locked_until
                .map(|locked_until| locked_until <= now)
                .unwrap_or(true)
    }
}

/// Minimum allowed polling interval (`interval_ms >= 1000`).
pub const MIN_INTERVAL_MS: i64 = 1000;

/// Immutable queue payload carrying probe inputs for one job.
///
/// Job identity in the queue is `"{link_id}-{enqueue_epoch_ms}"` so that
/// force-checks can be enqueued alongside scheduled checks without colliding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckJob {
    pub link_id: Uuid,
    pub external_url_id: String,
    pub external_user_id: String,
    pub long_url: String,
    pub short_url: String,
    pub environment: Environment,
}

impl HealthCheckJob {
    pub fn from_monitor(monitor: &Monitor) -> Self {
        Self {
            link_id: monitor.id,
            external_url_id: monitor.external_url_id.clone(),
            external_user_id: monitor.external_user_id.clone(),
            long_url: monitor.long_url.clone(),
            short_url: monitor.short_url.clone(),
            environment: monitor.environment,
        }
    }

    /// `"{linkId}-{enqueue_epoch_ms}"`, unique per enqueue even for the same
    /// monitor (scheduled ticks and force-checks do not collide).
    pub fn job_id(&self, enqueue_epoch_ms: i64) -> String {
        format!("{}-{}", self.link_id, enqueue_epoch_ms)
    }
}

/// In-memory-only result of one probe attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub status_code: i32,
    pub latency_ms: i64,
    pub is_healthy: bool,
    pub health_status: HealthStatus,
    pub error_message: Option<String>,
}

impl ProbeResult {
    /// Classification totality: exactly one of up/degraded/down, and
    /// `is_healthy` agrees with the chosen status.
    pub fn is_well_formed(&self) -> bool {
        match self.health_status {
            HealthStatus::Up | HealthStatus::Degraded => self.is_healthy,
            HealthStatus::Down => !self.is_healthy,
            HealthStatus::Pending => false,
        }
    }
}

/// Relative priority for dispatch. Lower sorts sooner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub i32);

impl Priority {
    /// Default priority used by scheduled ticks.
    pub const SCHEDULED: Priority = Priority(10);
    /// High priority used by `POST /monitors/:id/force-check`.
    pub const FORCE_CHECK: Priority = Priority(0);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::SCHEDULED
    }
}
