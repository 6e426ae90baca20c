//! Role-gated process supervisor. Replaces the source's module-top-level
//! side effects (starting workers/schedulers on import) with explicit
//! instantiation behind `RUN_API`/`RUN_SCHEDULER`/`RUN_WORKER` (spec.md §9).

use std::sync::Arc;

use anyhow::{Context, Result};
use linkpulse_core::{ProbeConfig, ProbeEngine, Scheduler, SchedulerConfig, WorkerConfig, WorkerPool};
use tokio_util::sync::CancellationToken;

use crate::app_state::AppState;
use crate::config::Config;
use crate::resources::ResourceHandles;

pub async fn run(config: Config, resources: ResourceHandles) -> Result<()> {
    let shutdown = CancellationToken::new();
    let mut tasks = tokio::task::JoinSet::new();

    if config.run_api {
        let state = AppState {
            monitors: resources.monitor_store.clone(),
            queue: resources.dispatch_queue.clone(),
            api_secret: config.monitoring_api_secret.clone().map(Into::into),
            is_production: config.is_production,
        };
        let router = crate::routes::router(state);
        let addr = format!("0.0.0.0:{}", config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind Admin API to {addr}"))?;
        tracing::info!(%addr, "Admin API listening");

        let api_shutdown = shutdown.clone();
        tasks.spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { api_shutdown.cancelled().await })
                .await
                .context("Admin API server error")
        });
    }

    if config.run_scheduler {
        let scheduler = Arc::new(Scheduler::new(
            resources.monitor_store.clone(),
            resources.dispatch_queue.clone(),
            SchedulerConfig {
                tick_interval: config.scheduler_interval,
                batch_size: config.scheduler_batch_size,
                lock_duration_ms: config.lock_duration_ms,
            },
        ));
        let scheduler_shutdown = shutdown.clone();
        tasks.spawn(async move {
            scheduler.run(scheduler_shutdown).await;
            Ok(())
        });
    }

    if config.run_scheduler || config.run_worker {
        let reclaim_queue = resources.dispatch_queue.clone();
        let reclaim_shutdown = shutdown.clone();
        tasks.spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match reclaim_queue.reclaim_expired().await {
                            Ok(0) => {}
                            Ok(n) => tracing::warn!(reclaimed = n, "reclaimed jobs with expired leases"),
                            Err(err) => tracing::warn!(%err, "failed to reclaim expired job leases"),
                        }
                    }
                    _ = reclaim_shutdown.cancelled() => break,
                }
            }
            Ok(())
        });
    }

    if config.run_worker {
        let probe = ProbeEngine::new(
            resources.probe_client.clone(),
            ProbeConfig {
                check_timeout: config.check_timeout,
                degraded_threshold: config.degraded_threshold,
            },
        );
        let worker_pool = Arc::new(WorkerPool::new(
            format!("worker-{}", uuid::Uuid::new_v4()),
            resources.monitor_store.clone(),
            resources.dispatch_queue.clone(),
            probe,
            resources.monitor_store.clone(),
            resources.history_sinks.clone(),
            WorkerConfig {
                concurrency: config.worker_concurrency,
                ..WorkerConfig::default()
            },
        ));
        let worker_shutdown = shutdown.clone();
        tasks.spawn(async move {
            worker_pool.run(worker_shutdown).await;
            Ok(())
        });
    }

    if tasks.is_empty() {
        tracing::warn!("no roles enabled (RUN_API/RUN_SCHEDULER/RUN_WORKER all false); exiting");
        return Ok(());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    tokio::select! {
        _ = &mut ctrl_c => {
            tracing::info!("SIGINT received, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received, shutting down");
        }
        Some(result) = tasks.join_next() => {
            if let Ok(Err(err)) = result {
                tracing::error!(%err, "a supervised task exited with an error");
            }
        }
    }

    shutdown.cancel();
    while let Some(result) = tasks.join_next().await {
        if let Ok(Err(err)) = result {
            tracing::error!(%err, "a supervised task exited with an error during shutdown");
        }
    }

    Ok(())
}
