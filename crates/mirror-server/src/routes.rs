//! REST surface: enqueues jobs onto the scheduler and reports status.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use mirror_common::Error;
use mirror_scheduler::JobKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::require_api_key;
use crate::AppContext;

pub fn create_router(ctx: AppContext) -> Router {
    let routes = Router::new()
        .route("/jobs/full-sweep", post(enqueue_full_sweep))
        .route("/jobs/changes-sync", post(enqueue_changes_sync))
        .route("/jobs/missing-ids", post(enqueue_missing_ids))
        .route("/jobs/prune-deleted", post(enqueue_prune_deleted))
        .route("/jobs/create-tables", post(enqueue_create_tables))
        .route("/jobs/test-webhook", post(enqueue_test_webhook))
        .route("/movies/:id", post(enqueue_add_movie))
        .route("/series/:id", post(enqueue_add_series))
        .route("/jobs/:id", get(job_status));

    let routes = if ctx.api_key.is_some() {
        routes.layer(middleware::from_fn_with_state(ctx.clone(), require_api_key))
    } else {
        routes
    };

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .merge(routes)
        .with_state(ctx)
}

async fn index() -> &'static str {
    "tmdb-mirror"
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    id: Uuid,
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn enqueue(ctx: &AppContext, kind: JobKind) -> impl IntoResponse {
    match ctx.scheduler.submit(kind) {
        Ok(job) => {
            let body = EnqueueResponse { id: job.id, kind: job.kind.label() };
            (StatusCode::ACCEPTED, Json(body)).into_response()
        }
        Err(e @ Error::AlreadyRunning(_)) => {
            (StatusCode::CONFLICT, Json(ErrorResponse { error: e.to_string() })).into_response()
        }
        Err(e) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() })).into_response()
        }
    }
}

async fn enqueue_full_sweep(State(ctx): State<AppContext>) -> impl IntoResponse {
    enqueue(&ctx, JobKind::FullSweep)
}

#[derive(Debug, Deserialize, Default)]
struct ForceQuery {
    #[serde(default)]
    force: bool,
}

async fn enqueue_changes_sync(
    State(ctx): State<AppContext>,
    Query(q): Query<ForceQuery>,
) -> impl IntoResponse {
    enqueue(&ctx, JobKind::ChangesSync { force: q.force })
}

async fn enqueue_missing_ids(State(ctx): State<AppContext>) -> impl IntoResponse {
    enqueue(&ctx, JobKind::MissingIds)
}

async fn enqueue_prune_deleted(State(ctx): State<AppContext>) -> impl IntoResponse {
    enqueue(&ctx, JobKind::PruneDeleted)
}

async fn enqueue_create_tables(State(ctx): State<AppContext>) -> impl IntoResponse {
    enqueue(&ctx, JobKind::CreateTables)
}

#[derive(Debug, Deserialize, Default)]
struct TestWebhookRequest {
    #[serde(default)]
    message: String,
}

async fn enqueue_test_webhook(
    State(ctx): State<AppContext>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let message = if body.is_empty() {
        String::new()
    } else {
        serde_json::from_slice::<TestWebhookRequest>(&body).map(|b| b.message).unwrap_or_default()
    };
    enqueue(&ctx, JobKind::TestWebhook { message })
}

async fn enqueue_add_movie(State(ctx): State<AppContext>, Path(id): Path<i64>) -> impl IntoResponse {
    enqueue(&ctx, JobKind::AddMovie { id })
}

async fn enqueue_add_series(State(ctx): State<AppContext>, Path(id): Path<i64>) -> impl IntoResponse {
    enqueue(&ctx, JobKind::AddSeries { id })
}

async fn job_status(State(ctx): State<AppContext>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match ctx.scheduler.get(id) {
        Some(job) => (StatusCode::OK, Json(job)).into_response(),
        None => (StatusCode::NOT_FOUND, Json(ErrorResponse { error: "unknown job id".into() })).into_response(),
    }
}

// Route wiring and status-code mapping are exercised end-to-end against a
// running router in tests/rest_api_test.rs.
