//! Process-wide resource handles: one `PgPool`, one `reqwest::Client` per
//! History Sink environment, and one shared `reqwest::Client` for probes.
//! Constructed once at boot and held in `Arc`s; nothing here is closed
//! except at process shutdown (spec.md §9's "singleton connection handles"
//! re-architecture, and the fix for the force-check-closes-the-queue bug).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use linkpulse_history::{ConvexHistorySink, EnvironmentHistorySinkRegistry, NoOpHistorySink};
use linkpulse_postgres::{PgDispatchQueue, PgMonitorStore};
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;

pub struct ResourceHandles {
    pub monitor_store: Arc<PgMonitorStore>,
    pub dispatch_queue: Arc<PgDispatchQueue>,
    pub history_sinks: Arc<EnvironmentHistorySinkRegistry>,
    pub probe_client: reqwest::Client,
}

impl ResourceHandles {
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("failed to connect to DATABASE_URL")?;

        sqlx::query(linkpulse_postgres::MIGRATIONS_SQL)
            .execute(&pool)
            .await
            .context("failed to apply schema")?;

        let monitor_store = Arc::new(PgMonitorStore::new(pool.clone()));
        let dispatch_queue = Arc::new(PgDispatchQueue::with_lease_ms(pool, config.lock_duration_ms));

        let history_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build history sink HTTP client")?;

        let dev_sink: Arc<dyn linkpulse_core::HistorySink> = match &config.convex_url_dev {
            Some(url) => Arc::new(ConvexHistorySink::new(
                history_client.clone(),
                url.clone(),
                config.monitoring_shared_secret.clone(),
            )),
            None => {
                tracing::warn!("CONVEX_URL_DEV not set; dev history sink is a no-op");
                Arc::new(NoOpHistorySink::new("dev"))
            }
        };
        let prod_sink: Arc<dyn linkpulse_core::HistorySink> = match &config.convex_url_prod {
            Some(url) => Arc::new(ConvexHistorySink::new(
                history_client.clone(),
                url.clone(),
                config.monitoring_shared_secret.clone(),
            )),
            None => {
                tracing::warn!("CONVEX_URL_PROD not set; prod history sink is a no-op");
                Arc::new(NoOpHistorySink::new("prod"))
            }
        };

        let probe_client = reqwest::Client::builder()
            .timeout(config.check_timeout + Duration::from_secs(1))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("failed to build probe HTTP client")?;

        Ok(Self {
            monitor_store,
            dispatch_queue,
            history_sinks: Arc::new(EnvironmentHistorySinkRegistry::new(dev_sink, prod_sink)),
            probe_client,
        })
    }
}
