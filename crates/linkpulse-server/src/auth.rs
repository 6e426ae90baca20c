//! Bearer-token auth for the mutating Admin API routes. A missing
//! `MONITORING_API_SECRET` is tolerated outside production (spec.md §6/§7);
//! a present secret is enforced everywhere, and any other auth failure is a
//! plain `401`.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::app_state::AppState;

pub async fn require_bearer_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    match &state.api_secret {
        Some(expected) => {
            let provided = request
                .headers()
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            let authorized = provided
                .map(|v| v == format!("Bearer {expected}"))
                .unwrap_or(false);

            if authorized {
                Ok(next.run(request).await)
            } else {
                tracing::warn!("admin API request rejected: missing or mismatched bearer token");
                Err(StatusCode::UNAUTHORIZED)
            }
        }
        None if state.is_production => {
            tracing::warn!("admin API request rejected: MONITORING_API_SECRET unset in production");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("MONITORING_API_SECRET not set; allowing unauthenticated admin request");
            Ok(next.run(request).await)
        }
    }
}
