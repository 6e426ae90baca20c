//! Sink Adapters: two write-only, independently failable adapters fed by
//! the Worker Pool after every probe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::SinkError;
use crate::model::{Environment, ProbeResult};

/// Relational row update keyed by monitor id.
///
/// Implementations must clear `scheduler_locked_until`, set
/// `current_status`/`last_*` from the result, and update
/// `consecutive_failures` via a relative increment so concurrent writers
/// compose.
#[async_trait]
pub trait StateSink: Send + Sync {
    async fn record_observation(
        &self,
        monitor_id: Uuid,
        result: &ProbeResult,
        checked_at: DateTime<Utc>,
    ) -> Result<(), SinkError>;
}

/// Payload sent to the remote `linkHealth.recordHealthCheck` mutation.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub shared_secret: String,
    pub url_id: String,
    pub user_id: String,
    pub short_url: String,
    pub long_url: String,
    pub status_code: i32,
    pub latency_ms: i64,
    pub is_healthy: bool,
    pub health_status: String,
    pub error_message: Option<String>,
    /// Epoch milliseconds. The History Sink must be idempotent on
    /// `{url_id, checked_at}` since delivery is at-least-once and may be
    /// out of order.
    pub checked_at_epoch_ms: i64,
}

/// One RPC per result, routed to the client instance selected by the job's
/// `environment`.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, record: HistoryRecord) -> Result<(), SinkError>;
}

/// Resolves the per-environment `HistorySink` instance (one per `dev`/`prod`).
pub trait HistorySinkRegistry: Send + Sync {
    fn sink_for(&self, environment: Environment) -> std::sync::Arc<dyn HistorySink>;
}
