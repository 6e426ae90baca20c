//! Schema for the two tables this crate owns. Exposed as a constant rather
//! than a `sqlx::migrate!` directory so the server binary can run it before
//! any `migrations/` convention is established; a real deployment would move
//! this into a dedicated migration runner (spec.md §1 names that out of
//! scope for this crate).
pub const MIGRATIONS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS monitored_links (
    id UUID PRIMARY KEY,
    external_url_id TEXT NOT NULL,
    external_user_id TEXT NOT NULL,

    long_url TEXT NOT NULL,
    short_url TEXT NOT NULL,
    environment TEXT NOT NULL DEFAULT 'prod',

    interval_ms BIGINT NOT NULL,
    next_check_at TIMESTAMPTZ NOT NULL,
    scheduler_locked_until TIMESTAMPTZ,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,

    current_status TEXT NOT NULL DEFAULT 'pending',
    last_checked_at TIMESTAMPTZ,
    last_status_code INTEGER,
    last_latency_ms INTEGER,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,

    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_monitored_links_url_id
    ON monitored_links (external_url_id);
CREATE INDEX IF NOT EXISTS idx_monitored_links_user_id
    ON monitored_links (external_user_id);
CREATE INDEX IF NOT EXISTS idx_monitored_links_eligibility
    ON monitored_links (next_check_at, is_active);

CREATE TABLE IF NOT EXISTS health_check_jobs (
    id UUID PRIMARY KEY,
    job_key TEXT NOT NULL UNIQUE,
    link_id UUID NOT NULL,
    external_url_id TEXT NOT NULL,
    external_user_id TEXT NOT NULL,
    long_url TEXT NOT NULL,
    short_url TEXT NOT NULL,
    environment TEXT NOT NULL,

    priority INTEGER NOT NULL DEFAULT 10,
    status TEXT NOT NULL DEFAULT 'pending',
    attempt INTEGER NOT NULL DEFAULT 1,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    worker_id TEXT,
    lease_expires_at TIMESTAMPTZ,
    error_message TEXT,
    error_kind TEXT,

    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_health_check_jobs_ready
    ON health_check_jobs (priority ASC, run_at ASC)
    WHERE status = 'pending';
CREATE INDEX IF NOT EXISTS idx_health_check_jobs_lease
    ON health_check_jobs (lease_expires_at)
    WHERE status = 'running';
"#;
