//! `/changes` fetcher: paginates upstream's delta endpoint for
//! a date window and returns the full set of changed ids.

use chrono::NaiveDate;
use mirror_common::schema::Family;
use mirror_common::{Error, Result};
use tokio_util::sync::CancellationToken;

use crate::client::{Fetched, UpstreamClient};

fn changes_segment(family: Family) -> &'static str {
    match family {
        Family::Movie => "movie",
        Family::Series => "tv",
    }
}

/// Paginates `/3/{movie|tv}/changes` across the window `[start, end]`
/// (inclusive, UTC dates) and returns every id upstream reported changed.
/// Pages are walked in the order upstream returns them; the caller may then
/// process ids concurrently.
pub async fn fetch_changed_ids(
    client: &UpstreamClient,
    family: Family,
    start: NaiveDate,
    end: NaiveDate,
    cancel: &CancellationToken,
) -> Result<Vec<i64>> {
    let mut ids = Vec::new();
    let mut page = 1u32;
    loop {
        let path = format!(
            "/3/{}/changes?start_date={}&end_date={}&page={}",
            changes_segment(family),
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
            page
        );
        let body = match client.get(&path, cancel).await? {
            Fetched::Ok(body) => body,
            Fetched::NotFound => {
                return Err(Error::upstream(format!("changes endpoint 404 at {path}")))
            }
        };

        let results = body
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for entry in &results {
            if let Some(id) = entry.get("id").and_then(|v| v.as_i64()) {
                ids.push(id);
            }
        }

        let total_pages = body.get("total_pages").and_then(|v| v.as_u64()).unwrap_or(1);
        if (page as u64) >= total_pages {
            break;
        }
        page += 1;
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::Gate;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn walks_every_page() {
        let server = MockServer::start().await;
        let start = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 7, 2).unwrap();

        Mock::given(method("GET"))
            .and(path("/3/movie/changes"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"id": 1}, {"id": 2}],
                "page": 1,
                "total_pages": 2,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/3/movie/changes"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"id": 3}],
                "page": 2,
                "total_pages": 2,
            })))
            .mount(&server)
            .await;

        let client = UpstreamClient::with_base_url("token".into(), Gate::new(50, 10), server.uri());
        let cancel = CancellationToken::new();
        let ids = fetch_changed_ids(&client, Family::Movie, start, end, &cancel)
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn single_page_stops_immediately() {
        let server = MockServer::start().await;
        let start = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();

        Mock::given(method("GET"))
            .and(path("/3/tv/changes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"id": 99}],
                "page": 1,
                "total_pages": 1,
            })))
            .mount(&server)
            .await;

        let client = UpstreamClient::with_base_url("token".into(), Gate::new(50, 10), server.uri());
        let cancel = CancellationToken::new();
        let ids = fetch_changed_ids(&client, Family::Series, start, end, &cancel)
            .await
            .unwrap();
        assert_eq!(ids, vec![99]);
    }
}
