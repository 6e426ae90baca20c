use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use linkpulse_core::{
    EnqueueOpts, Environment, HealthCheckJob, RegisterMonitor, RegisterOutcome, RepositoryError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;

/// `POST /monitors/register` and the per-item shape inside
/// `POST /monitors/batch`'s array body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMonitorBody {
    pub convex_url_id: String,
    pub convex_user_id: String,
    pub long_url: String,
    pub short_url: String,
    pub interval_ms: Option<i64>,
    pub environment: Option<Environment>,
}

impl From<RegisterMonitorBody> for RegisterMonitor {
    fn from(body: RegisterMonitorBody) -> Self {
        RegisterMonitor {
            external_url_id: body.convex_url_id,
            external_user_id: body.convex_user_id,
            long_url: body.long_url,
            short_url: body.short_url,
            interval_ms: body.interval_ms,
            // The register endpoint fills `environment` unconditionally so
            // no Job downstream ever carries a missing one.
            environment: Some(body.environment.unwrap_or_default()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

fn register_response(outcome: RegisterOutcome) -> RegisterResponse {
    match outcome {
        RegisterOutcome::Created(id) => RegisterResponse {
            success: true,
            link_id: Some(id),
            message: None,
        },
        RegisterOutcome::AlreadyRegistered(id) => RegisterResponse {
            success: true,
            link_id: Some(id),
            message: Some("Already registered"),
        },
    }
}

fn map_repository_error(err: RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
        RepositoryError::Backend(reason) => {
            tracing::error!(%reason, "monitor repository backend error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterMonitorBody>,
) -> Result<Json<RegisterResponse>, StatusCode> {
    let outcome = state
        .monitors()
        .register(body.into())
        .await
        .map_err(map_repository_error)?;
    Ok(Json(register_response(outcome)))
}

pub async fn register_batch(
    State(state): State<AppState>,
    Json(bodies): Json<Vec<RegisterMonitorBody>>,
) -> Result<Json<Vec<RegisterResponse>>, StatusCode> {
    let mut responses = Vec::with_capacity(bodies.len());
    for body in bodies {
        let outcome = state
            .monitors()
            .register(body.into())
            .await
            .map_err(map_repository_error)?;
        responses.push(register_response(outcome));
    }
    Ok(Json(responses))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorResponse {
    pub link_id: Uuid,
    pub convex_url_id: String,
    pub convex_user_id: String,
    pub long_url: String,
    pub short_url: String,
    pub environment: Environment,
    pub interval_ms: i64,
    pub is_active: bool,
    pub current_status: String,
    pub last_checked_at: Option<chrono::DateTime<Utc>>,
    pub last_status_code: Option<i32>,
    pub last_latency_ms: Option<i32>,
    pub consecutive_failures: i32,
}

impl From<linkpulse_core::Monitor> for MonitorResponse {
    fn from(m: linkpulse_core::Monitor) -> Self {
        Self {
            link_id: m.id,
            convex_url_id: m.external_url_id,
            convex_user_id: m.external_user_id,
            long_url: m.long_url,
            short_url: m.short_url,
            environment: m.environment,
            interval_ms: m.interval_ms,
            is_active: m.is_active,
            current_status: m.current_status.to_string(),
            last_checked_at: m.last_checked_at,
            last_status_code: m.last_status_code,
            last_latency_ms: m.last_latency_ms,
            consecutive_failures: m.consecutive_failures,
        }
    }
}

pub async fn get_monitor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MonitorResponse>, StatusCode> {
    let monitor = state
        .monitors()
        .get(id)
        .await
        .map_err(map_repository_error)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(monitor.into()))
}

pub async fn deactivate_monitor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let deactivated = state.monitors().deactivate(id).await.map_err(map_repository_error)?;
    if deactivated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// Enqueues a `Priority::FORCE_CHECK` job directly; never touches
/// `next_check_at`, since a force-check is out-of-band from the scheduled
/// cadence (spec.md §4.3 / §9).
pub async fn force_check(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let monitor = state
        .monitors()
        .get(id)
        .await
        .map_err(map_repository_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let job = HealthCheckJob::from_monitor(&monitor);
    let job_id = job.job_id(Utc::now().timestamp_millis());
    state
        .queue()
        .enqueue(job, EnqueueOpts::force_check(job_id))
        .await
        .map_err(|err| {
            tracing::error!(%err, "failed to enqueue force-check job");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(StatusCode::ACCEPTED)
}
