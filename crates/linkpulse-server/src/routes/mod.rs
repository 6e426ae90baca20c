mod health;
mod monitors;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::auth::require_bearer_auth;

/// Builds the full Admin API router. The vestigial `GET /` handler from the
/// source (logs, returns `undefined`) is intentionally not reproduced
/// (spec.md §9).
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/monitors/register", post(monitors::register))
        .route("/monitors/batch", post(monitors::register_batch))
        .route("/monitors/:id/force-check", post(monitors::force_check))
        .route("/monitors/:id", delete(monitors::deactivate_monitor))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_auth));

    let public = Router::new()
        .route("/health", get(health::health_handler))
        .route("/monitors/:id", get(monitors::get_monitor));

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
