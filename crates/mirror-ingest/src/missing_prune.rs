//! Missing and prune passes: diff the daily export id set `E`
//! against the live root id set `L`.

use std::collections::HashSet;

use mirror_common::schema::Family;
use mirror_common::Result;
use mirror_upstream::{record, ExportFetcher, UpstreamClient};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::live_write::{delete_record, upsert_into_live};
use crate::normalize::normalize;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffReport {
    pub considered: u32,
    pub inserted_or_updated: u32,
    pub deleted: u32,
    pub errored: u32,
}

async fn live_id_set(pool: &PgPool, family: Family) -> Result<HashSet<i64>> {
    let sql = format!("SELECT id FROM {}", family.root_table());
    let rows: Vec<(i64,)> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .map_err(mirror_common::Error::from)?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Fetches the export id set for `family` and diffs it against live.
pub async fn export_diff(
    pool: &PgPool,
    export_fetcher: &ExportFetcher,
    family: Family,
    now: chrono::DateTime<chrono::Utc>,
    cancel: &CancellationToken,
) -> Result<(HashSet<i64>, HashSet<i64>)> {
    let exported = export_fetcher.fetch_id_set(family, now, cancel).await?;
    let live = live_id_set(pool, family).await?;
    Ok((exported, live))
}

/// `missing_ids`: fetches and upserts every id in `E \ L`.
pub async fn missing_ids(
    pool: &PgPool,
    client: &UpstreamClient,
    export_fetcher: &ExportFetcher,
    family: Family,
    now: chrono::DateTime<chrono::Utc>,
    cancel: &CancellationToken,
) -> Result<DiffReport> {
    let (exported, live) = export_diff(pool, export_fetcher, family, now, cancel).await?;
    let missing: Vec<i64> = exported.difference(&live).copied().collect();

    let mut report = DiffReport { considered: missing.len() as u32, ..Default::default() };
    for id in missing {
        match record::fetch_record(client, family, id, cancel).await {
            Ok(Some(body)) => match normalize(family, &body) {
                Ok(batch) => match upsert_into_live(pool, family, id, batch).await {
                    Ok(()) => report.inserted_or_updated += 1,
                    Err(e) => {
                        tracing::warn!(id, error = %e, "missing_ids: upsert failed");
                        report.errored += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!(id, error = %e, "missing_ids: unexpected record shape");
                    report.errored += 1;
                }
            },
            Ok(None) => tracing::debug!(id, "missing_ids: id in export 404'd on fetch, skipping"),
            Err(e) => {
                tracing::warn!(id, error = %e, "missing_ids: fetch failed");
                report.errored += 1;
            }
        }
    }
    Ok(report)
}

/// `prune_deleted`: deletes every id in `L \ E`.
pub async fn prune_deleted(
    pool: &PgPool,
    export_fetcher: &ExportFetcher,
    family: Family,
    now: chrono::DateTime<chrono::Utc>,
    cancel: &CancellationToken,
) -> Result<DiffReport> {
    let (exported, live) = export_diff(pool, export_fetcher, family, now, cancel).await?;
    let orphaned: Vec<i64> = live.difference(&exported).copied().collect();

    let mut report = DiffReport { considered: orphaned.len() as u32, ..Default::default() };
    for id in orphaned {
        match delete_record(pool, family, id).await {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                tracing::warn!(id, error = %e, "prune_deleted: delete failed");
                report.errored += 1;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_db::ddl;
    use mirror_upstream::Gate;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gzip_ndjson(lines: &[&str]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        for line in lines {
            writeln!(encoder, "{line}").unwrap();
        }
        encoder.finish().unwrap()
    }

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
    async fn live_id_set_reads_the_root_table(pool: PgPool) {
        ddl::create_tables(&pool, Family::Movie).await.unwrap();
        seed_live_movie(&pool, 1).await;
        seed_live_movie(&pool, 2).await;

        let ids = live_id_set(&pool, Family::Movie).await.unwrap();
        assert_eq!(ids, HashSet::from([1, 2]));
    }

    #[sqlx::test]
    async fn missing_ids_upserts_every_exported_id_absent_from_live(pool: PgPool) {
        ddl::create_tables(&pool, Family::Movie).await.unwrap();
        seed_live_movie(&pool, 1).await;

        let now = chrono::Utc::now();
        let export_server = MockServer::start().await;
        let today_name = format!("movie_ids_{}.json.gz", now.format("%m_%d_%Y"));
        Mock::given(method("GET"))
            .and(path(format!("/{today_name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_ndjson(&[r#"{"id": 1}"#, r#"{"id": 2}"#])))
            .mount(&export_server)
            .await;

        let record_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/movie/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 2, "title": "Two"})))
            .mount(&record_server)
            .await;

        let export_fetcher = ExportFetcher::with_base_url(Gate::new(50, 10), export_server.uri());
        let client = UpstreamClient::with_base_url("token".into(), Gate::new(50, 10), record_server.uri());
        let cancel = CancellationToken::new();

        let report = missing_ids(&pool, &client, &export_fetcher, Family::Movie, now, &cancel)
            .await
            .unwrap();

        assert_eq!(report.considered, 1);
        assert_eq!(report.inserted_or_updated, 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movie WHERE id = 2")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    async fn prune_deleted_removes_every_live_id_absent_from_the_export(pool: PgPool) {
        ddl::create_tables(&pool, Family::Movie).await.unwrap();
        seed_live_movie(&pool, 1).await;
        seed_live_movie(&pool, 2).await;

        let now = chrono::Utc::now();
        let export_server = MockServer::start().await;
        let today_name = format!("movie_ids_{}.json.gz", now.format("%m_%d_%Y"));
        Mock::given(method("GET"))
            .and(path(format!("/{today_name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_ndjson(&[r#"{"id": 1}"#])))
            .mount(&export_server)
            .await;

        let export_fetcher = ExportFetcher::with_base_url(Gate::new(50, 10), export_server.uri());

        let report = prune_deleted(&pool, &export_fetcher, Family::Movie, now, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.considered, 1);
        assert_eq!(report.deleted, 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movie WHERE id = 2")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movie WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
