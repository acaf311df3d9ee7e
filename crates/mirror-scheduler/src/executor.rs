//! Runs one job to completion and produces its report payload.

use std::sync::Arc;

use chrono::Utc;
use mirror_common::schema::Family;
use mirror_common::Result;
use mirror_db::ddl;
use mirror_ingest::missing_prune::{missing_ids, prune_deleted, DiffReport};
use mirror_upstream::{record, ExportFetcher, UpstreamClient};
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::job::JobKind;

/// The process-wide collaborators a job needs, constructed once at startup
/// and handed to every execution (no ambient singletons).
#[derive(Clone)]
pub struct JobContext {
    pub pool: PgPool,
    pub client: Arc<UpstreamClient>,
    pub export_fetcher: Arc<ExportFetcher>,
    pub batch_insert: u32,
    pub max_connections: u32,
}

pub async fn execute(ctx: &JobContext, kind: &JobKind, cancel: &CancellationToken) -> Result<Value> {
    match kind {
        JobKind::FullSweep => {
            run_per_family(kind, cancel, |family, cancel| {
                let ctx = ctx.clone();
                async move {
                    let report = mirror_ingest::full_sweep::full_sweep(
                        &ctx.pool,
                        ctx.client.clone(),
                        &ctx.export_fetcher,
                        family,
                        ctx.batch_insert,
                        ctx.max_connections,
                        &cancel,
                    )
                    .await?;
                    Ok(json!({
                        "enumerated": report.enumerated,
                        "fetched": report.fetched,
                        "inserted": report.inserted,
                        "not_found": report.not_found,
                        "errored": report.errored,
                    }))
                }
            })
            .await
        }

        JobKind::ChangesSync { force } => {
            let force = *force;
            run_per_family(kind, cancel, |family, cancel| {
                let ctx = ctx.clone();
                async move {
                    let report = mirror_ingest::reconcile::changes_sync_with_options(
                        &ctx.pool,
                        &ctx.client,
                        family,
                        Utc::now(),
                        force,
                        &cancel,
                    )
                    .await?;
                    Ok(json!({
                        "enumerated": report.enumerated,
                        "fetched": report.fetched,
                        "upserted": report.upserted,
                        "deleted": report.deleted,
                        "errored": report.errored,
                        "skipped": report.skipped,
                    }))
                }
            })
            .await
        }

        JobKind::MissingIds => {
            run_per_family(kind, cancel, |family, cancel| {
                let ctx = ctx.clone();
                async move {
                    let report =
                        missing_ids(&ctx.pool, &ctx.client, &ctx.export_fetcher, family, Utc::now(), &cancel)
                            .await?;
                    Ok(diff_report_json(report))
                }
            })
            .await
        }

        JobKind::PruneDeleted => {
            run_per_family(kind, cancel, |family, cancel| {
                let ctx = ctx.clone();
                async move {
                    let report =
                        prune_deleted(&ctx.pool, &ctx.export_fetcher, family, Utc::now(), &cancel).await?;
                    Ok(diff_report_json(report))
                }
            })
            .await
        }

        JobKind::CreateTables => {
            run_per_family(kind, cancel, |family, _cancel| {
                let ctx = ctx.clone();
                async move {
                    ddl::create_tables(&ctx.pool, family).await?;
                    Ok(json!({"created": true}))
                }
            })
            .await
        }

        JobKind::AddMovie { id } => add_one(ctx, Family::Movie, *id, cancel).await,
        JobKind::AddSeries { id } => add_one(ctx, Family::Series, *id, cancel).await,

        JobKind::TestWebhook { message } => Ok(json!({ "message": message })),
    }
}

fn diff_report_json(report: DiffReport) -> Value {
    json!({
        "considered": report.considered,
        "inserted_or_updated": report.inserted_or_updated,
        "deleted": report.deleted,
        "errored": report.errored,
    })
}

/// Runs `work` once per family named by `kind.families()` and merges the
/// per-family reports keyed by the family's root table name. A fatal error
/// from one family aborts the job before the next family runs.
async fn run_per_family<F, Fut>(kind: &JobKind, cancel: &CancellationToken, mut work: F) -> Result<Value>
where
    F: FnMut(Family, CancellationToken) -> Fut,
    Fut: std::future::Future<Output = Result<Value>>,
{
    let mut merged = serde_json::Map::new();
    for &family in kind.families() {
        let report = work(family, cancel.clone()).await?;
        merged.insert(family.root_table().to_string(), report);
    }
    Ok(Value::Object(merged))
}

async fn add_one(ctx: &JobContext, family: Family, id: i64, cancel: &CancellationToken) -> Result<Value> {
    let mut merged = serde_json::Map::new();
    let outcome = match record::fetch_record(&ctx.client, family, id, cancel).await? {
        Some(body) => {
            let batch = mirror_ingest::normalize::normalize(family, &body)?;
            mirror_ingest::live_write::upsert_into_live(&ctx.pool, family, id, batch).await?;
            json!({"id": id, "inserted_or_updated": 1})
        }
        None => json!({"id": id, "not_found": true}),
    };
    merged.insert(family.root_table().to_string(), outcome);
    Ok(Value::Object(merged))
}
