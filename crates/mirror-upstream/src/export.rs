//! Daily gzipped id-export files.
//!
//! Export date selection: try today's UTC date first, fall back to
//! yesterday's on 404 (the publish job runs sometime after midnight UTC).

use std::collections::HashSet;
use std::io::Read;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use mirror_common::schema::Family;
use mirror_common::{Error, Result};
use tokio_util::sync::CancellationToken;

use crate::limiter::Gate;

pub struct ExportFetcher {
    http: reqwest::Client,
    gate: Gate,
    base_url: String,
}

fn export_segment(family: Family) -> &'static str {
    match family {
        Family::Movie => "movie",
        Family::Series => "tv_series",
    }
}

impl ExportFetcher {
    pub fn new(gate: Gate) -> Self {
        Self::with_base_url(gate, "http://files.tmdb.org/p/exports".to_string())
    }

    pub fn with_base_url(gate: Gate, base_url: String) -> Self {
        ExportFetcher {
            http: reqwest::Client::new(),
            gate,
            base_url,
        }
    }

    fn url_for(&self, family: Family, date: DateTime<Utc>) -> String {
        format!(
            "{}/{}_ids_{}.json.gz",
            self.base_url,
            export_segment(family),
            date.format("%m_%d_%Y")
        )
    }

    /// Fetches and decodes the id export for `family` as of `now`, trying
    /// today's UTC date and falling back to yesterday's on 404.
    pub async fn fetch_id_set(
        &self,
        family: Family,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<HashSet<i64>> {
        match self.try_fetch(family, now, cancel).await {
            Ok(ids) => Ok(ids),
            Err(Error::NotFound(_)) => {
                self.try_fetch(family, now - chrono::Duration::days(1), cancel).await
            }
            Err(e) => Err(e),
        }
    }

    async fn try_fetch(
        &self,
        family: Family,
        date: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<HashSet<i64>> {
        let url = self.url_for(family, date);
        let _permit = self.gate.acquire(cancel).await?;

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("export fetch failed for {url}: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::not_found(url));
        }
        if !resp.status().is_success() {
            return Err(Error::upstream(format!(
                "unexpected status {} fetching {url}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::upstream(format!("failed reading export body: {e}")))?;

        parse_export(&bytes)
    }
}

/// Decodes a gzipped newline-delimited JSON export into the set of ids it
/// names. Each line is lenient: unknown fields besides `id` are ignored.
fn parse_export(gz_bytes: &[u8]) -> Result<HashSet<i64>> {
    let mut decoder = GzDecoder::new(gz_bytes);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| Error::upstream(format!("failed to gunzip export: {e}")))?;

    let mut ids = HashSet::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| Error::upstream(format!("malformed export line: {e}")))?;
        if let Some(id) = value.get("id").and_then(|v| v.as_i64()) {
            ids.insert(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn parse_export_extracts_ids_and_ignores_extra_fields() {
        let body = gzip_ndjson(&[
            r#"{"id": 603, "original_title": "The Matrix", "popularity": 10.0}"#,
            r#"{"id": 604}"#,
        ]);
        let ids = parse_export(&body).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&603));
        assert!(ids.contains(&604));
    }

    #[test]
    fn parse_export_skips_blank_lines() {
        let body = gzip_ndjson(&[r#"{"id": 1}"#, "", r#"{"id": 2}"#]);
        let ids = parse_export(&body).unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn falls_back_to_yesterday_on_404() {
        let server = MockServer::start().await;
        let now = Utc::now();
        let today_name = format!("movie_ids_{}.json.gz", now.format("%m_%d_%Y"));
        let yesterday = now - chrono::Duration::days(1);
        let yesterday_name = format!("movie_ids_{}.json.gz", yesterday.format("%m_%d_%Y"));

        Mock::given(method("GET"))
            .and(path(format!("/{today_name}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let body = gzip_ndjson(&[r#"{"id": 42}"#]);
        Mock::given(method("GET"))
            .and(path(format!("/{yesterday_name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;

        let fetcher = ExportFetcher::with_base_url(Gate::new(50, 10), server.uri());
        let cancel = CancellationToken::new();
        let ids = fetcher
            .fetch_id_set(Family::Movie, now, &cancel)
            .await
            .unwrap();
        assert_eq!(ids, HashSet::from([42]));
    }
}
