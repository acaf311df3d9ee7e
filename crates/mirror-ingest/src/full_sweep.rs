//! Full sweep: rebuilds one family's entire catalog into
//! staging tables via bounded-concurrency record fetches, then swaps.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use mirror_common::schema::Family;
use mirror_common::Result;
use mirror_db::{ddl, metadata};
use mirror_upstream::{record, ExportFetcher, UpstreamClient};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::bulk_loader::BulkLoader;
use crate::normalize::normalize;
use crate::swap::swap;

/// Per-phase counts reported at job completion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub enumerated: u32,
    pub fetched: u32,
    pub inserted: u32,
    pub not_found: u32,
    pub errored: u32,
}

/// Runs one full_sweep: export id set -> bounded-concurrency record fetch
/// -> normalize -> bulk load into staging -> swap. `max_connections` caps
/// how many record fetches are in flight at once inside this job, on top of
/// the process-wide rate limiter/gate each fetch still goes through.
pub async fn full_sweep(
    pool: &PgPool,
    client: Arc<UpstreamClient>,
    export_fetcher: &ExportFetcher,
    family: Family,
    batch_insert: u32,
    max_connections: u32,
    cancel: &CancellationToken,
) -> Result<SweepReport> {
    let now = Utc::now();
    let ids = export_fetcher.fetch_id_set(family, now, cancel).await?;
    let mut report = SweepReport { enumerated: ids.len() as u32, ..Default::default() };

    ddl::truncate_staging(pool, family).await?;

    let mut loader = BulkLoader::new(pool, family, batch_insert);
    let mut in_flight = FuturesUnordered::new();
    let mut ids = ids.into_iter();
    let concurrency = max_connections.max(1) as usize;

    for _ in 0..concurrency {
        if let Some(id) = ids.next() {
            in_flight.push(fetch_and_normalize(client.clone(), family, id, cancel.clone()));
        }
    }

    while let Some(outcome) = in_flight.next().await {
        if let Some(id) = ids.next() {
            in_flight.push(fetch_and_normalize(client.clone(), family, id, cancel.clone()));
        }

        match outcome {
            Ok(Some(batch)) => {
                report.fetched += 1;
                loader.add(batch).await?;
                report.inserted += 1;
            }
            Ok(None) => report.not_found += 1,
            Err(e) => {
                tracing::warn!(error = %e, "full_sweep: record fetch/normalize failed");
                report.errored += 1;
            }
        }
    }

    loader.finish().await?;
    swap(pool, family).await?;
    metadata::set_last_full_sweep_completed_at(pool, family, now).await?;

    Ok(report)
}

async fn fetch_and_normalize(
    client: Arc<UpstreamClient>,
    family: Family,
    id: i64,
    cancel: CancellationToken,
) -> Result<Option<crate::normalize::RowBatch>> {
    match record::fetch_record(&client, family, id, &cancel).await? {
        Some(body) => Ok(Some(normalize(family, &body)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use mirror_db::ddl;
    use mirror_upstream::Gate;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gzip_ndjson(lines: &[&str]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        for line in lines {
            writeln!(encoder, "{line}").unwrap();
        }
        encoder.finish().unwrap()
    }

    #[sqlx::test]
    async fn full_sweep_loads_exported_ids_into_live_tables(pool: PgPool) {
        ddl::create_tables(&pool, Family::Movie).await.unwrap();

        let now = Utc::now();
        let export_server = MockServer::start().await;
        let today_name = format!("movie_ids_{}.json.gz", now.format("%m_%d_%Y"));
        let body = gzip_ndjson(&[r#"{"id": 1}"#, r#"{"id": 2}"#]);
        Mock::given(method("GET"))
            .and(path(format!("/{today_name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&export_server)
            .await;

        let record_server = MockServer::start().await;
        for (id, title) in [(1, "One"), (2, "Two")] {
            Mock::given(method("GET"))
                .and(path(format!("/3/movie/{id}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "id": id,
                    "title": title,
                })))
                .mount(&record_server)
                .await;
        }

        let export_fetcher = ExportFetcher::with_base_url(Gate::new(50, 10), export_server.uri());
        let client = Arc::new(UpstreamClient::with_base_url("token".into(), Gate::new(50, 10), record_server.uri()));
        let cancel = CancellationToken::new();

        let report = full_sweep(&pool, client, &export_fetcher, Family::Movie, 500, 4, &cancel)
            .await
            .unwrap();

        assert_eq!(report.enumerated, 2);
        assert_eq!(report.fetched, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.not_found, 0);
        assert_eq!(report.errored, 0);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movie")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[sqlx::test]
    async fn full_sweep_counts_404s_as_not_found(pool: PgPool) {
        ddl::create_tables(&pool, Family::Movie).await.unwrap();

        let now = Utc::now();
        let export_server = MockServer::start().await;
        let today_name = format!("movie_ids_{}.json.gz", now.format("%m_%d_%Y"));
        let body = gzip_ndjson(&[r#"{"id": 7}"#]);
        Mock::given(method("GET"))
            .and(path(format!("/{today_name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&export_server)
            .await;

        let record_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/movie/7"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&record_server)
            .await;

        let export_fetcher = ExportFetcher::with_base_url(Gate::new(50, 10), export_server.uri());
        let client = Arc::new(UpstreamClient::with_base_url("token".into(), Gate::new(50, 10), record_server.uri()));
        let cancel = CancellationToken::new();

        let report = full_sweep(&pool, client, &export_fetcher, Family::Movie, 500, 4, &cancel)
            .await
            .unwrap();

        assert_eq!(report.enumerated, 1);
        assert_eq!(report.not_found, 1);
        assert_eq!(report.inserted, 0);
    }
}
