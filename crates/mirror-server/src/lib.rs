//! An axum surface over [`mirror_scheduler::Scheduler`]: one POST route per
//! job kind, a status lookup route, and an optional `X-API-Key` check.

pub mod auth;
pub mod routes;

use std::net::SocketAddr;

use mirror_scheduler::Scheduler;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use routes::create_router;

#[derive(Clone)]
pub struct AppContext {
    pub scheduler: Scheduler,
    pub api_key: Option<String>,
}

/// Binds and serves the REST surface until `shutdown` is cancelled.
pub async fn serve(addr: SocketAddr, ctx: AppContext, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = create_router(ctx).layer(TraceLayer::new_for_http());

    tracing::info!(%addr, "REST server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("REST server shut down");
    Ok(())
}
