//! In-memory fakes for the core traits, so Scheduler/Worker Pool/Admin API
//! tests don't require a live Postgres instance. Mirrors the role
//! `seesaw-testing` plays for the teacher's coordination layer, narrowed to
//! this crate's four trait seams.

mod history;
mod monitors;
mod queue;

pub use history::{RecordingHistorySink, StaticHistorySinkRegistry};
pub use monitors::InMemoryMonitorStore;
pub use queue::InMemoryDispatchQueue;
