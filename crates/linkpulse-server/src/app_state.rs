use std::sync::Arc;

use linkpulse_core::{DispatchQueue, MonitorRepository};

/// Shared Admin API state, handed to every handler via `axum::extract::State`.
/// Held as trait objects rather than concrete Postgres types so the router
/// can be exercised against in-memory fakes in tests.
#[derive(Clone)]
pub struct AppState {
    pub monitors: Arc<dyn MonitorRepository>,
    pub queue: Arc<dyn DispatchQueue>,
    pub api_secret: Option<Arc<str>>,
    pub is_production: bool,
}

impl AppState {
    pub fn monitors(&self) -> &(dyn MonitorRepository) {
        self.monitors.as_ref()
    }

    pub fn queue(&self) -> &(dyn DispatchQueue) {
        self.queue.as_ref()
    }
}
