use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    timestamp: String,
}

/// `GET /health`. Unauthenticated; reports liveness only, not readiness —
/// there's no `SELECT 1` here because a degraded Postgres shouldn't make the
/// Admin API fail health checks and get recycled mid-incident.
pub async fn health_handler(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "linkpulse",
        timestamp: Utc::now().to_rfc3339(),
    })
}
