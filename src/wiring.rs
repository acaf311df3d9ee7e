//! Assembles the process-wide collaborators from [`Config`] (explicit
//! dependencies constructed at startup, not ambient singletons) and runs
//! either a one-shot job or the long-lived daemon.

use std::net::SocketAddr;
use std::sync::Arc;

use mirror_common::Config;
use mirror_scheduler::{CronTable, JobContext, JobKind, Worker};
use mirror_upstream::{ExportFetcher, Gate, UpstreamClient};
use tokio_util::sync::CancellationToken;

pub async fn build_job_context(config: &Config) -> anyhow::Result<JobContext> {
    let pool = mirror_db::init_pool(
        &config.database.uri,
        config.tmdb.max_connections,
        config.database.enable_unaccent,
    )
    .await?;

    let gate = Gate::new(config.tmdb.rate_limit, config.tmdb.max_connections);
    let client = Arc::new(UpstreamClient::new(config.tmdb.read_access_token.clone(), gate.clone()));
    let export_fetcher = Arc::new(ExportFetcher::new(gate));

    Ok(JobContext {
        pool,
        client,
        export_fetcher,
        batch_insert: config.tmdb.batch_insert,
        max_connections: config.tmdb.max_connections,
    })
}

/// Runs a single job to completion in-process and returns its JSON report.
/// CLI invocations use this directly rather than going through the
/// scheduler's single-flight lock, which only matters when CRON, CLI, and
/// REST share one long-lived process.
pub async fn run_one_shot(ctx: &JobContext, kind: JobKind) -> mirror_common::Result<serde_json::Value> {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });
    mirror_scheduler::executor::execute(ctx, &kind, &cancel).await
}

/// Runs the long-lived daemon: CRON-scheduled jobs, the worker pool, and
/// (if configured) the REST surface, until SIGTERM or Ctrl-C.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let ctx = build_job_context(&config).await?;
    let notifier = mirror_scheduler::WebhookNotifier::new(&config.webhook);
    let schedule = CronTable::from_config(&config.cron)?;

    let (worker, scheduler) = Worker::new(ctx, notifier, schedule);
    let shutdown = CancellationToken::new();

    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    let server_handle = if config.api.enabled {
        let addr: SocketAddr = ([0, 0, 0, 0], config.api.port).into();
        let app_ctx = mirror_server::AppContext { scheduler, api_key: config.api.api_key.clone() };
        Some(tokio::spawn(mirror_server::serve(addr, app_ctx, shutdown.clone())))
    } else {
        None
    };

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, cancelling in-flight work");
    shutdown.cancel();

    worker_handle.await?;
    if let Some(handle) = server_handle {
        handle.await??;
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
