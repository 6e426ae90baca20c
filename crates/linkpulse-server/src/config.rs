//! Process configuration, loaded once at boot from environment variables.
//! Mirrors the teacher pack's `Config::from_env` convention: `.env` is
//! loaded (and ignored if absent) before `std::env` is read, required
//! fields use `anyhow::Context`, optional fields fall back to defaults.

use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub convex_url_dev: Option<String>,
    pub convex_url_prod: Option<String>,
    pub monitoring_shared_secret: String,
    pub monitoring_api_secret: Option<String>,
    pub port: u16,

    pub scheduler_interval: Duration,
    pub scheduler_batch_size: i64,
    pub lock_duration_ms: i64,

    pub worker_concurrency: usize,
    pub check_timeout: Duration,
    pub degraded_threshold: Duration,

    pub log_level: String,
    pub sentry_dsn: Option<String>,

    pub run_api: bool,
    pub run_scheduler: bool,
    pub run_worker: bool,

    /// Not gated by an environment flag: `true` unless `RUST_ENV`/`NODE_ENV`
    /// (whichever is set) reads `production`. Governs whether a missing
    /// Admin API bearer secret is a hard `401` or a logged pass-through
    /// (spec.md §6/§7).
    pub is_production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: env_var("DATABASE_URL").context("DATABASE_URL must be set")?,
            convex_url_dev: env_var("CONVEX_URL_DEV").ok(),
            convex_url_prod: env_var("CONVEX_URL_PROD").ok(),
            monitoring_shared_secret: env_var("MONITORING_SHARED_SECRET")
                .unwrap_or_default(),
            monitoring_api_secret: env_var("MONITORING_API_SECRET").ok(),
            port: parse_env_or("PORT", 3001)?,

            scheduler_interval: Duration::from_millis(parse_env_or("SCHEDULER_INTERVAL_MS", 10_000)?),
            scheduler_batch_size: parse_env_or("SCHEDULER_BATCH_SIZE", 500)?,
            lock_duration_ms: 30_000,

            worker_concurrency: parse_env_or("WORKER_CONCURRENCY", 10)?,
            check_timeout: Duration::from_millis(parse_env_or("CHECK_TIMEOUT_MS", 10_000)?),
            degraded_threshold: Duration::from_millis(parse_env_or("DEGRADED_THRESHOLD_MS", 3_000)?),

            log_level: env_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            sentry_dsn: env_var("SENTRY_DSN").ok(),

            run_api: parse_bool_env_or("RUN_API", true),
            run_scheduler: parse_bool_env_or("RUN_SCHEDULER", true),
            run_worker: parse_bool_env_or("RUN_WORKER", true),

            is_production: env_var("RUST_ENV")
                .or_else(|| env_var("NODE_ENV"))
                .map(|v| v == "production")
                .unwrap_or(false),
        })
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} must be a valid number: {e}")),
        None => Ok(default),
    }
}

fn parse_bool_env_or(key: &str, default: bool) -> bool {
    match env_var(key) {
        Some(raw) => !matches!(raw.as_str(), "false" | "0" | "no"),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_env_or_defaults_true_unless_explicitly_falsy() {
        assert!(parse_bool_env_or("NOT_SET_XYZ", true));
    }
}
