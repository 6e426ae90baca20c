//! Domain crate: types, traits, and the Scheduler/Worker Pool/Probe Engine
//! logic shared by every backend (Postgres, in-memory, HTTP) and by the
//! server binary that wires them together.

pub mod error;
pub mod model;
pub mod probe;
pub mod queue;
pub mod repository;
pub mod scheduler;
pub mod sinks;
pub mod worker;

pub use error::{ProbeError, QueueError, RepositoryError, SinkError};
pub use model::{
    Environment, HealthCheckJob, HealthStatus, Monitor, Priority, ProbeResult, MIN_INTERVAL_MS,
};
pub use probe::{ProbeConfig, ProbeEngine};
pub use queue::{backoff_for_attempt, ClaimedJob, DispatchQueue, EnqueueOpts, FailureKind, NoOpDispatchQueue, MAX_ATTEMPTS};
pub use repository::{MonitorRepository, RegisterMonitor, RegisterOutcome};
pub use scheduler::{Scheduler, SchedulerConfig, TickOutcome};
pub use sinks::{HistoryRecord, HistorySink, HistorySinkRegistry, StateSink};
pub use worker::{WorkerConfig, WorkerPool};
