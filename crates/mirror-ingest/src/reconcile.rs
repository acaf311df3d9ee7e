//! Changes reconciler: adaptive-window `/changes` pull, upserting
//! alive ids into live tables and deleting ids upstream no longer has.

use chrono::Utc;
use mirror_common::schema::Family;
use mirror_common::Result;
use mirror_db::metadata;
use mirror_upstream::{changes, record, UpstreamClient};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::live_write::{delete_record, upsert_into_live};
use crate::normalize::normalize;
use crate::window::{compute_window, should_skip_after_sweep};

/// Per-phase counts reported at job completion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub enumerated: u32,
    pub fetched: u32,
    pub upserted: u32,
    pub deleted: u32,
    pub errored: u32,
    pub skipped: bool,
}

pub async fn changes_sync(
    pool: &PgPool,
    client: &UpstreamClient,
    family: Family,
    now: chrono::DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<SyncReport> {
    changes_sync_with_options(pool, client, family, now, false, cancel).await
}

/// Like [`changes_sync`], but `force` skips the "a full_sweep ran within
/// the last 24h" gate (CLI/REST `--force`).
pub async fn changes_sync_with_options(
    pool: &PgPool,
    client: &UpstreamClient,
    family: Family,
    now: chrono::DateTime<Utc>,
    force: bool,
    cancel: &CancellationToken,
) -> Result<SyncReport> {
    let last_full_sweep = metadata::last_full_sweep_completed_at(pool, family).await?;
    if !force && should_skip_after_sweep(now, last_full_sweep) {
        metadata::set_last_successful_changes_sync(pool, family, now).await?;
        tracing::info!(?family, "changes_sync skipped: full_sweep ran within 24h");
        return Ok(SyncReport { skipped: true, ..Default::default() });
    }

    let last_sync = metadata::last_successful_changes_sync(pool, family).await?;
    let (start, end) = compute_window(now, last_sync);

    let ids = changes::fetch_changed_ids(client, family, start.date_naive(), end.date_naive(), cancel).await?;

    let mut report = SyncReport { enumerated: ids.len() as u32, ..Default::default() };

    for id in ids {
        match record::fetch_record(client, family, id, cancel).await {
            Ok(Some(body)) => {
                report.fetched += 1;
                match normalize(family, &body) {
                    Ok(batch) => match upsert_into_live(pool, family, id, batch).await {
                        Ok(()) => report.upserted += 1,
                        Err(e) => {
                            tracing::warn!(id, error = %e, "failed to upsert record during changes_sync");
                            report.errored += 1;
                        }
                    },
                    Err(e) => {
                        tracing::warn!(id, error = %e, "skipping record with unexpected shape");
                        report.errored += 1;
                    }
                }
            }
            Ok(None) => match delete_record(pool, family, id).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    tracing::warn!(id, error = %e, "failed to delete record during changes_sync");
                    report.errored += 1;
                }
            },
            Err(e) if e.is_fatal_to_job() => return Err(e),
            Err(e) => {
                tracing::warn!(id, error = %e, "failed to fetch record during changes_sync");
                report.errored += 1;
            }
        }
    }

    metadata::set_last_successful_changes_sync(pool, family, now).await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_db::ddl;
    use mirror_upstream::Gate;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn seed_live_movie(pool: &PgPool, id: i64) {
        sqlx::query("INSERT INTO movie (id, title, original_title, status, popularity, vote_average, \
                      vote_count, adult, original_language, runtime, budget, revenue) \
                      VALUES ($1, 'Title', 'Title', 'Released', 0, 0, 0, false, 'en', 0, 0, 0)")
            .bind(id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[sqlx::test]
    async fn upserts_ids_upstream_still_has(pool: PgPool) {
        ddl::create_tables(&pool, Family::Movie).await.unwrap();
        metadata::ensure_table(&pool).await.unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/movie/changes"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"id": 603}],
                "page": 1,
                "total_pages": 1,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/3/movie/603"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 603, "title": "The Matrix"})))
            .mount(&server)
            .await;

        let client = UpstreamClient::with_base_url("token".into(), Gate::new(50, 10), server.uri());
        let report = changes_sync(&pool, &client, Family::Movie, Utc::now(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.enumerated, 1);
        assert_eq!(report.upserted, 1);
        assert!(!report.skipped);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movie WHERE id = 603")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    async fn deletes_ids_upstream_404s_on(pool: PgPool) {
        ddl::create_tables(&pool, Family::Movie).await.unwrap();
        metadata::ensure_table(&pool).await.unwrap();
        seed_live_movie(&pool, 603).await;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/movie/changes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"id": 603}],
                "page": 1,
                "total_pages": 1,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/3/movie/603"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = UpstreamClient::with_base_url("token".into(), Gate::new(50, 10), server.uri());
        let report = changes_sync(&pool, &client, Family::Movie, Utc::now(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.deleted, 1);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movie WHERE id = 603")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[sqlx::test]
    async fn skipped_when_a_full_sweep_ran_within_24h_and_not_forced(pool: PgPool) {
        ddl::create_tables(&pool, Family::Movie).await.unwrap();
        metadata::ensure_table(&pool).await.unwrap();
        let now = Utc::now();
        metadata::set_last_full_sweep_completed_at(&pool, Family::Movie, now - chrono::Duration::hours(1))
            .await
            .unwrap();

        let server = MockServer::start().await;
        let client = UpstreamClient::with_base_url("token".into(), Gate::new(50, 10), server.uri());
        let report = changes_sync(&pool, &client, Family::Movie, now, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.skipped);
        assert_eq!(report.enumerated, 0);
    }
}
