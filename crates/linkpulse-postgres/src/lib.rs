//! PostgreSQL adapters for the scheduling-and-execution engine.
//!
//! Two independent pieces share one `PgPool`:
//! - [`PgMonitorStore`] implements both `MonitorRepository` (the Scheduler's
//!   eligibility scan and lease) and `StateSink` (the Worker Pool's
//!   last-observation write) over a single `monitored_links` table.
//! - [`PgDispatchQueue`] implements `DispatchQueue` over a `health_check_jobs`
//!   table using `FOR UPDATE SKIP LOCKED` claiming, the same pattern
//!   `seesaw-job-postgres` uses for its generic `jobs` table.

mod migrations;
mod monitors;
mod queue;

pub use migrations::MIGRATIONS_SQL;
pub use monitors::PgMonitorStore;
pub use queue::PgDispatchQueue;
