//! Record fetcher: one `append_to_response` aggregate GET per id.

use mirror_common::schema::Family;
use mirror_common::Result;
use tokio_util::sync::CancellationToken;

use crate::client::{Fetched, UpstreamClient};

fn record_segment(family: Family) -> &'static str {
    match family {
        Family::Movie => "movie",
        Family::Series => "tv",
    }
}

fn dates_append(family: Family) -> &'static str {
    match family {
        Family::Movie => "release_dates",
        Family::Series => "content_ratings",
    }
}

/// Fetches the full aggregate record for one upstream id. Returns `None`
/// when upstream 404s, which callers treat as a skip (add/missing flows)
/// or a delete signal (changes_sync).
pub async fn fetch_record(
    client: &UpstreamClient,
    family: Family,
    id: i64,
    cancel: &CancellationToken,
) -> Result<Option<serde_json::Value>> {
    let path = format!(
        "/3/{}/{}?append_to_response=credits,external_ids,keywords,alternative_titles,videos,{}",
        record_segment(family),
        id,
        dates_append(family),
    );
    match client.get(&path, cancel).await? {
        Fetched::Ok(body) => Ok(Some(body)),
        Fetched::NotFound => Ok(None),
    }
}
