use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use linkpulse_core::{Environment, HistoryRecord, HistorySink, HistorySinkRegistry, SinkError};

/// A `HistorySink` that records every call instead of sending it anywhere.
#[derive(Default)]
pub struct RecordingHistorySink {
    records: Mutex<Vec<HistoryRecord>>,
    fail_next: Mutex<bool>,
}

impl RecordingHistorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `record` call returns `Err` instead of recording. Used to
    /// exercise "History Sink error does not fail the job" (spec.md §7).
    pub fn fail_next_call(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistorySink for RecordingHistorySink {
    async fn record(&self, record: HistoryRecord) -> Result<(), SinkError> {
        let mut fail_next = self.fail_next.lock().unwrap();
        if *fail_next {
            *fail_next = false;
            return Err(SinkError::Unavailable("forced test failure".into()));
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// A registry that routes every environment to the same sink, for tests
/// that don't care about per-environment routing.
pub struct StaticHistorySinkRegistry(Arc<dyn HistorySink>);

impl StaticHistorySinkRegistry {
    pub fn new(sink: Arc<dyn HistorySink>) -> Self {
        Self(sink)
    }
}

impl HistorySinkRegistry for StaticHistorySinkRegistry {
    fn sink_for(&self, _environment: Environment) -> Arc<dyn HistorySink> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> HistoryRecord {
        HistoryRecord {
            shared_secret: "s".into(),
            url_id: "u1".into(),
            user_id: "usr1".into(),
            short_url: "https://s.example/1".into(),
            long_url: "https://example.com".into(),
            status_code: 200,
            latency_ms: 10,
            is_healthy: true,
            health_status: "up".into(),
            error_message: None,
            checked_at_epoch_ms: 0,
        }
    }

    #[tokio::test]
    async fn fail_next_call_fails_exactly_once() {
        let sink = RecordingHistorySink::new();
        sink.fail_next_call();
        assert!(sink.record(record()).await.is_err());
        assert!(sink.record(record()).await.is_ok());
        assert_eq!(sink.records().len(), 1);
    }
}
