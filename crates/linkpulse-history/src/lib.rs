//! History Sink: one RPC per probe result, forwarded to whichever remote
//! instance the job's `environment` selects (`dev` or `prod`). The sink
//! must treat every transport error as transient — spec.md §4.5 requires
//! the Worker Pool to proceed regardless of this adapter's outcome.

use std::sync::Arc;

use async_trait::async_trait;
use linkpulse_core::{Environment, HistoryRecord, HistorySink, HistorySinkRegistry, SinkError};
use serde::Serialize;

/// Wire payload for the `linkHealth.recordHealthCheck` remote mutation.
/// Field names match the remote's camelCase convention; the response body
/// is opaque and not deserialized.
#[derive(Debug, Serialize)]
struct RecordHealthCheckPayload {
    #[serde(rename = "sharedSecret")]
    shared_secret: String,
    #[serde(rename = "urlId")]
    url_id: String,
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "shortUrl")]
    short_url: String,
    #[serde(rename = "longUrl")]
    long_url: String,
    #[serde(rename = "statusCode")]
    status_code: i32,
    #[serde(rename = "latencyMs")]
    latency_ms: i64,
    #[serde(rename = "isHealthy")]
    is_healthy: bool,
    #[serde(rename = "healthStatus")]
    health_status: String,
    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(rename = "checkedAt")]
    checked_at: i64,
}

impl From<HistoryRecord> for RecordHealthCheckPayload {
    fn from(record: HistoryRecord) -> Self {
        Self {
            shared_secret: record.shared_secret,
            url_id: record.url_id,
            user_id: record.user_id,
            short_url: record.short_url,
            long_url: record.long_url,
            status_code: record.status_code,
            latency_ms: record.latency_ms,
            is_healthy: record.is_healthy,
            health_status: record.health_status,
            error_message: record.error_message,
            checked_at: record.checked_at_epoch_ms,
        }
    }
}

/// One client per History Sink endpoint (`CONVEX_URL_DEV` / `CONVEX_URL_PROD`).
/// Owns the endpoint URL and the shared secret so callers never have to
/// thread either through the Worker Pool.
pub struct ConvexHistorySink {
    client: reqwest::Client,
    endpoint: String,
    shared_secret: String,
}

impl ConvexHistorySink {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, shared_secret: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            shared_secret: shared_secret.into(),
        }
    }
}

#[async_trait]
impl HistorySink for ConvexHistorySink {
    async fn record(&self, mut record: HistoryRecord) -> Result<(), SinkError> {
        record.shared_secret = self.shared_secret.clone();
        let payload = RecordHealthCheckPayload::from(record);

        let response = self
            .client
            .post(format!("{}/linkHealth.recordHealthCheck", self.endpoint.trim_end_matches('/')))
            .json(&payload)
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::Rejected(format!(
                "history sink returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Resolves `dev`/`prod` to the matching client built at startup. Missing
/// optional configuration (an environment with no configured endpoint)
/// degrades to a sink that logs and reports success — spec.md §7 treats a
/// missing History Sink as "warn and continue with degraded behavior", not
/// a fatal boot error.
pub struct EnvironmentHistorySinkRegistry {
    dev: Arc<dyn HistorySink>,
    prod: Arc<dyn HistorySink>,
}

impl EnvironmentHistorySinkRegistry {
    pub fn new(dev: Arc<dyn HistorySink>, prod: Arc<dyn HistorySink>) -> Self {
        Self { dev, prod }
    }
}

impl HistorySinkRegistry for EnvironmentHistorySinkRegistry {
    fn sink_for(&self, environment: Environment) -> Arc<dyn HistorySink> {
        match environment {
            Environment::Dev => self.dev.clone(),
            Environment::Prod => self.prod.clone(),
        }
    }
}

/// A `HistorySink` that logs and reports success without sending anything.
/// Used when an environment's `CONVEX_URL_*` is unset at boot.
pub struct NoOpHistorySink {
    environment_label: &'static str,
}

impl NoOpHistorySink {
    pub fn new(environment_label: &'static str) -> Self {
        Self { environment_label }
    }
}

#[async_trait]
impl HistorySink for NoOpHistorySink {
    async fn record(&self, record: HistoryRecord) -> Result<(), SinkError> {
        tracing::warn!(
            environment = self.environment_label,
            url_id = %record.url_id,
            "history sink not configured; observation dropped"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpulse_core::HistoryRecord;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_record() -> HistoryRecord {
        HistoryRecord {
            shared_secret: String::new(),
            url_id: "url-1".into(),
            user_id: "user-1".into(),
            short_url: "https://s.example/1".into(),
            long_url: "https://example.com".into(),
            status_code: 200,
            latency_ms: 42,
            is_healthy: true,
            health_status: "up".into(),
            error_message: None,
            checked_at_epoch_ms: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn posts_payload_and_injects_shared_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/linkHealth.recordHealthCheck"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = ConvexHistorySink::new(reqwest::Client::new(), server.uri(), "top-secret");
        sink.record(sample_record()).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_reported_as_sink_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/linkHealth.recordHealthCheck"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = ConvexHistorySink::new(reqwest::Client::new(), server.uri(), "top-secret");
        let err = sink.record(sample_record()).await.unwrap_err();
        assert!(matches!(err, SinkError::Rejected(_)));
    }

    #[tokio::test]
    async fn noop_sink_reports_success() {
        let sink = NoOpHistorySink::new("dev");
        assert!(sink.record(sample_record()).await.is_ok());
    }

    #[tokio::test]
    async fn registry_routes_by_environment() {
        let dev_server = MockServer::start().await;
        let prod_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&dev_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&prod_server)
            .await;

        let registry = EnvironmentHistorySinkRegistry::new(
            Arc::new(ConvexHistorySink::new(reqwest::Client::new(), dev_server.uri(), "s")),
            Arc::new(ConvexHistorySink::new(reqwest::Client::new(), prod_server.uri(), "s")),
        );

        registry
            .sink_for(Environment::Dev)
            .record(sample_record())
            .await
            .unwrap();
        registry
            .sink_for(Environment::Prod)
            .record(sample_record())
            .await
            .unwrap();
    }
}
