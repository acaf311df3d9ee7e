//! Normalizer: flattens one upstream aggregate record into row
//! batches keyed by destination table, following `mirror_common::schema`'s
//! table descriptors as the contract for what each row must contain.

use std::collections::HashMap;

use chrono::Utc;
use mirror_common::schema::Family;
use mirror_common::{Error, Result};
use serde_json::{Map, Value};

pub type Row = Map<String, Value>;
/// Table name -> rows destined for it.
pub type RowBatch = HashMap<&'static str, Vec<Row>>;

fn push(batch: &mut RowBatch, table: &'static str, row: Row) {
    batch.entry(table).or_default().push(row);
}

fn s(v: &Value, key: &str) -> Value {
    v.get(key).cloned().unwrap_or(Value::Null)
}

fn root_id(record: &Value) -> Result<i64> {
    record
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::internal("upstream record missing integer id"))
}

/// Normalizes one upstream aggregate record (already including
/// `append_to_response` fields) into a [`RowBatch`] for `family`.
pub fn normalize(family: Family, record: &Value) -> Result<RowBatch> {
    match family {
        Family::Movie => normalize_movie(record),
        Family::Series => normalize_series(record),
    }
}

fn empty_str_to_null(v: Value) -> Value {
    match v {
        Value::String(s) if s.is_empty() => Value::Null,
        other => other,
    }
}

fn normalize_movie(record: &Value) -> Result<RowBatch> {
    let mut batch = RowBatch::new();
    let id = root_id(record)?;

    let belongs_to_collection_id = normalize_collection(&mut batch, record);

    let mut movie_row = Row::new();
    movie_row.insert("id".into(), Value::from(id));
    movie_row.insert("title".into(), s(record, "title"));
    movie_row.insert("original_title".into(), s(record, "original_title"));
    movie_row.insert("overview".into(), empty_str_to_null(s(record, "overview")));
    movie_row.insert("release_date".into(), empty_str_to_null(s(record, "release_date")));
    movie_row.insert("runtime".into(), s(record, "runtime"));
    movie_row.insert("budget".into(), s(record, "budget"));
    movie_row.insert("revenue".into(), s(record, "revenue"));
    movie_row.insert("status".into(), s(record, "status"));
    movie_row.insert("tagline".into(), empty_str_to_null(s(record, "tagline")));
    movie_row.insert("popularity".into(), s(record, "popularity"));
    movie_row.insert("vote_average".into(), s(record, "vote_average"));
    movie_row.insert("vote_count".into(), s(record, "vote_count"));
    movie_row.insert("adult".into(), s(record, "adult"));
    movie_row.insert("original_language".into(), s(record, "original_language"));
    movie_row.insert("belongs_to_collection_id".into(), belongs_to_collection_id);
    push(&mut batch, "movie", movie_row);

    normalize_genres(&mut batch, record, id, "movie_genres", "movie_genres_assoc");
    normalize_companies(&mut batch, record, id, "movie_production_companies", "movie_companies_assoc");
    normalize_countries(&mut batch, record, id, "movie_production_countries", "movie_countries_assoc");
    normalize_languages(&mut batch, record, id, "movie_spoken_languages", "movie_languages_assoc");
    normalize_alternative_titles(&mut batch, record, id, "movie_alternative_titles");
    normalize_cast(&mut batch, record, id, "movie_cast_members", "movie_cast_assoc");
    normalize_external_ids(&mut batch, record, id, "movie_external_ids", false);
    normalize_keywords(&mut batch, record, id, "movie_keywords", "movie_keywords_assoc");
    normalize_release_dates(&mut batch, record, id);
    normalize_videos(&mut batch, record, id, "movie_videos");

    Ok(batch)
}

fn normalize_series(record: &Value) -> Result<RowBatch> {
    let mut batch = RowBatch::new();
    let id = root_id(record)?;

    let last_episode_id = normalize_episode_to_air(&mut batch, record, id, "last_episode_to_air", "series_last_episode_to_air");
    let next_episode_id = normalize_episode_to_air(&mut batch, record, id, "next_episode_to_air", "series_next_episode_to_air");

    let mut series_row = Row::new();
    series_row.insert("id".into(), Value::from(id));
    series_row.insert("name".into(), s(record, "name"));
    series_row.insert("original_name".into(), s(record, "original_name"));
    series_row.insert("overview".into(), empty_str_to_null(s(record, "overview")));
    series_row.insert("first_air_date".into(), empty_str_to_null(s(record, "first_air_date")));
    series_row.insert("last_air_date".into(), empty_str_to_null(s(record, "last_air_date")));
    series_row.insert("number_of_episodes".into(), s(record, "number_of_episodes"));
    series_row.insert("number_of_seasons".into(), s(record, "number_of_seasons"));
    series_row.insert("status".into(), s(record, "status"));
    series_row.insert("tagline".into(), empty_str_to_null(s(record, "tagline")));
    series_row.insert("popularity".into(), s(record, "popularity"));
    series_row.insert("vote_average".into(), s(record, "vote_average"));
    series_row.insert("vote_count".into(), s(record, "vote_count"));
    series_row.insert("adult".into(), s(record, "adult"));
    series_row.insert("original_language".into(), s(record, "original_language"));
    series_row.insert("last_episode_to_air_id".into(), last_episode_id);
    series_row.insert("next_episode_to_air_id".into(), next_episode_id);
    push(&mut batch, "series", series_row);

    normalize_genres(&mut batch, record, id, "series_genres", "series_genres_assoc");
    normalize_companies(&mut batch, record, id, "series_production_companies", "series_companies_assoc");
    normalize_countries(&mut batch, record, id, "series_production_countries", "series_countries_assoc");
    normalize_languages(&mut batch, record, id, "series_spoken_languages", "series_languages_assoc");
    normalize_alternative_titles(&mut batch, record, id, "series_alternative_titles");
    normalize_cast(&mut batch, record, id, "series_cast_members", "series_cast_assoc");
    normalize_external_ids(&mut batch, record, id, "series_external_ids", true);
    normalize_keywords(&mut batch, record, id, "series_keywords", "series_keywords_assoc");
    normalize_content_ratings(&mut batch, record, id);
    normalize_videos(&mut batch, record, id, "series_videos");
    normalize_created_by(&mut batch, record, id);
    normalize_networks(&mut batch, record, id);
    normalize_seasons(&mut batch, record, id);

    Ok(batch)
}

fn normalize_collection(batch: &mut RowBatch, record: &Value) -> Value {
    match record.get("belongs_to_collection") {
        None | Some(Value::Null) => Value::Null,
        Some(Value::Object(obj)) => {
            let collection_id = obj.get("id").and_then(Value::as_i64);
            if let Some(collection_id) = collection_id {
                let mut row = Row::new();
                row.insert("id".into(), Value::from(collection_id));
                row.insert("name".into(), s(&Value::Object(obj.clone()), "name"));
                row.insert("poster_path".into(), s(&Value::Object(obj.clone()), "poster_path"));
                row.insert("backdrop_path".into(), s(&Value::Object(obj.clone()), "backdrop_path"));
                push(batch, "movie_collections", row);
                Value::from(collection_id)
            } else {
                Value::Null
            }
        }
        Some(Value::Number(n)) => Value::Number(n.clone()),
        Some(_) => Value::Null,
    }
}

fn normalize_episode_to_air(
    batch: &mut RowBatch,
    record: &Value,
    root: i64,
    field: &str,
    table: &'static str,
) -> Value {
    match record.get(field) {
        None | Some(Value::Null) => Value::Null,
        Some(obj) => {
            let episode_id = obj.get("id").and_then(Value::as_i64);
            let Some(episode_id) = episode_id else { return Value::Null };
            let mut row = Row::new();
            row.insert("id".into(), Value::from(episode_id));
            row.insert("root_id".into(), Value::from(root));
            row.insert("name".into(), s(obj, "name"));
            row.insert("overview".into(), empty_str_to_null(s(obj, "overview")));
            row.insert("air_date".into(), empty_str_to_null(s(obj, "air_date")));
            row.insert("season_number".into(), s(obj, "season_number"));
            row.insert("episode_number".into(), s(obj, "episode_number"));
            push(batch, table, row);
            Value::from(episode_id)
        }
    }
}

fn normalize_genres(batch: &mut RowBatch, record: &Value, root: i64, dim_table: &'static str, assoc_table: &'static str) {
    let Some(genres) = record.get("genres").and_then(Value::as_array) else { return };
    for g in genres {
        let Some(dim_id) = g.get("id").and_then(Value::as_i64) else { continue };
        let mut dim_row = Row::new();
        dim_row.insert("id".into(), Value::from(dim_id));
        dim_row.insert("name".into(), s(g, "name"));
        push(batch, dim_table, dim_row);

        let mut assoc_row = Row::new();
        assoc_row.insert("root_id".into(), Value::from(root));
        assoc_row.insert("dim_id".into(), Value::from(dim_id));
        push(batch, assoc_table, assoc_row);
    }
}

fn normalize_companies(batch: &mut RowBatch, record: &Value, root: i64, dim_table: &'static str, assoc_table: &'static str) {
    let Some(companies) = record.get("production_companies").and_then(Value::as_array) else { return };
    for c in companies {
        let Some(dim_id) = c.get("id").and_then(Value::as_i64) else { continue };
        let mut dim_row = Row::new();
        dim_row.insert("id".into(), Value::from(dim_id));
        dim_row.insert("name".into(), s(c, "name"));
        dim_row.insert("logo_path".into(), s(c, "logo_path"));
        dim_row.insert("origin_country".into(), s(c, "origin_country"));
        push(batch, dim_table, dim_row);

        let mut assoc_row = Row::new();
        assoc_row.insert("root_id".into(), Value::from(root));
        assoc_row.insert("dim_id".into(), Value::from(dim_id));
        push(batch, assoc_table, assoc_row);
    }
}

fn normalize_countries(batch: &mut RowBatch, record: &Value, root: i64, dim_table: &'static str, assoc_table: &'static str) {
    let Some(countries) = record.get("production_countries").and_then(Value::as_array) else { return };
    for c in countries {
        let Some(iso) = c.get("iso_3166_1").and_then(Value::as_str) else { continue };
        let mut dim_row = Row::new();
        dim_row.insert("iso_3166_1".into(), Value::from(iso));
        dim_row.insert("name".into(), s(c, "name"));
        push(batch, dim_table, dim_row);

        let mut assoc_row = Row::new();
        assoc_row.insert("root_id".into(), Value::from(root));
        assoc_row.insert("dim_id".into(), Value::from(iso));
        push(batch, assoc_table, assoc_row);
    }
}

fn normalize_languages(batch: &mut RowBatch, record: &Value, root: i64, dim_table: &'static str, assoc_table: &'static str) {
    let Some(languages) = record.get("spoken_languages").and_then(Value::as_array) else { return };
    for l in languages {
        let Some(iso) = l.get("iso_639_1").and_then(Value::as_str) else { continue };
        let mut dim_row = Row::new();
        dim_row.insert("iso_639_1".into(), Value::from(iso));
        dim_row.insert("name".into(), s(l, "name"));
        push(batch, dim_table, dim_row);

        let mut assoc_row = Row::new();
        assoc_row.insert("root_id".into(), Value::from(root));
        assoc_row.insert("dim_id".into(), Value::from(iso));
        push(batch, assoc_table, assoc_row);
    }
}

fn normalize_alternative_titles(batch: &mut RowBatch, record: &Value, root: i64, table: &'static str) {
    let titles = record
        .get("alternative_titles")
        .and_then(|v| v.get("titles").or_else(|| v.get("results")))
        .and_then(Value::as_array);
    let Some(titles) = titles else { return };
    for (idx, t) in titles.iter().enumerate() {
        let mut row = Row::new();
        // Surrogate id: stable within one build, since alternative titles
        // carry no natural upstream id.
        row.insert("id".into(), Value::from((root * 1_000_000) + idx as i64));
        row.insert("root_id".into(), Value::from(root));
        row.insert("iso_3166_1".into(), s(t, "iso_3166_1"));
        row.insert("title".into(), s(t, "title"));
        row.insert("type".into(), empty_str_to_null(s(t, "type")));
        push(batch, table, row);
    }
}

fn normalize_cast(batch: &mut RowBatch, record: &Value, root: i64, dim_table: &'static str, assoc_table: &'static str) {
    let cast = record
        .get("credits")
        .and_then(|v| v.get("cast"))
        .and_then(Value::as_array);
    let Some(cast) = cast else { return };
    for member in cast {
        let Some(dim_id) = member.get("id").and_then(Value::as_i64) else { continue };
        let mut dim_row = Row::new();
        dim_row.insert("id".into(), Value::from(dim_id));
        dim_row.insert("name".into(), s(member, "name"));
        dim_row.insert("gender".into(), s(member, "gender"));
        dim_row.insert("profile_path".into(), s(member, "profile_path"));
        push(batch, dim_table, dim_row);

        let mut assoc_row = Row::new();
        assoc_row.insert("root_id".into(), Value::from(root));
        assoc_row.insert("dim_id".into(), Value::from(dim_id));
        assoc_row.insert("character".into(), empty_str_to_null(s(member, "character")));
        assoc_row.insert("cast_order".into(), s(member, "order"));
        push(batch, assoc_table, assoc_row);
    }
}

/// External ids: emitted as a single row per root id even when upstream
/// fields are partially missing. A prior defect where missing external ids
/// aborted an entire record is explicitly disallowed here: any subset of
/// `{imdb_id, wikidata_id, facebook_id, instagram_id, twitter_id}` (plus
/// `tvdb_id` for series) may be absent.
fn normalize_external_ids(batch: &mut RowBatch, record: &Value, root: i64, table: &'static str, is_series: bool) {
    let external = record.get("external_ids").cloned().unwrap_or(Value::Object(Map::new()));
    let mut row = Row::new();
    row.insert("root_id".into(), Value::from(root));
    row.insert("imdb_id".into(), empty_str_to_null(s(&external, "imdb_id")));
    row.insert("wikidata_id".into(), empty_str_to_null(s(&external, "wikidata_id")));
    row.insert("facebook_id".into(), empty_str_to_null(s(&external, "facebook_id")));
    row.insert("instagram_id".into(), empty_str_to_null(s(&external, "instagram_id")));
    row.insert("twitter_id".into(), empty_str_to_null(s(&external, "twitter_id")));
    if is_series {
        row.insert("tvdb_id".into(), s(&external, "tvdb_id"));
    }
    push(batch, table, row);
}

fn normalize_keywords(batch: &mut RowBatch, record: &Value, root: i64, dim_table: &'static str, assoc_table: &'static str) {
    let keywords = record
        .get("keywords")
        .and_then(|v| v.get("keywords").or_else(|| v.get("results")))
        .and_then(Value::as_array);
    let Some(keywords) = keywords else { return };
    for k in keywords {
        let Some(dim_id) = k.get("id").and_then(Value::as_i64) else { continue };
        let mut dim_row = Row::new();
        dim_row.insert("id".into(), Value::from(dim_id));
        dim_row.insert("name".into(), s(k, "name"));
        push(batch, dim_table, dim_row);

        let mut assoc_row = Row::new();
        assoc_row.insert("root_id".into(), Value::from(root));
        assoc_row.insert("dim_id".into(), Value::from(dim_id));
        push(batch, assoc_table, assoc_row);
    }
}

fn normalize_release_dates(batch: &mut RowBatch, record: &Value, root: i64) {
    let Some(results) = record
        .get("release_dates")
        .and_then(|v| v.get("results"))
        .and_then(Value::as_array)
    else {
        return;
    };
    let mut idx = 0i64;
    for country in results {
        let iso = s(country, "iso_3166_1");
        let Some(dates) = country.get("release_dates").and_then(Value::as_array) else { continue };
        for d in dates {
            let mut row = Row::new();
            row.insert("id".into(), Value::from((root * 1_000_000) + idx));
            row.insert("root_id".into(), Value::from(root));
            row.insert("iso_3166_1".into(), iso.clone());
            row.insert("type".into(), s(d, "type"));
            row.insert("certification".into(), empty_str_to_null(s(d, "certification")));
            row.insert("release_date".into(), s(d, "release_date"));
            push(batch, "movie_release_dates", row);
            idx += 1;
        }
    }
}

fn normalize_content_ratings(batch: &mut RowBatch, record: &Value, root: i64) {
    let Some(results) = record
        .get("content_ratings")
        .and_then(|v| v.get("results"))
        .and_then(Value::as_array)
    else {
        return;
    };
    for (idx, entry) in results.iter().enumerate() {
        let mut row = Row::new();
        row.insert("id".into(), Value::from((root * 1_000_000) + idx as i64));
        row.insert("root_id".into(), Value::from(root));
        row.insert("iso_3166_1".into(), s(entry, "iso_3166_1"));
        row.insert("rating".into(), empty_str_to_null(s(entry, "rating")));
        push(batch, "series_content_ratings", row);
    }
}

fn normalize_videos(batch: &mut RowBatch, record: &Value, root: i64, table: &'static str) {
    let Some(results) = record.get("videos").and_then(|v| v.get("results")).and_then(Value::as_array) else {
        return;
    };
    for v in results {
        let Some(video_id) = v.get("id").and_then(Value::as_str) else { continue };
        let mut row = Row::new();
        row.insert("id".into(), Value::from(video_id));
        row.insert("root_id".into(), Value::from(root));
        row.insert("name".into(), s(v, "name"));
        row.insert("site".into(), s(v, "site"));
        row.insert("type".into(), s(v, "type"));
        row.insert("key".into(), s(v, "key"));
        push(batch, table, row);
    }
}

fn normalize_created_by(batch: &mut RowBatch, record: &Value, root: i64) {
    let Some(people) = record.get("created_by").and_then(Value::as_array) else { return };
    for p in people {
        let Some(dim_id) = p.get("id").and_then(Value::as_i64) else { continue };
        let mut dim_row = Row::new();
        dim_row.insert("id".into(), Value::from(dim_id));
        dim_row.insert("name".into(), s(p, "name"));
        dim_row.insert("gender".into(), s(p, "gender"));
        dim_row.insert("profile_path".into(), s(p, "profile_path"));
        push(batch, "series_created_by", dim_row);

        let mut assoc_row = Row::new();
        assoc_row.insert("root_id".into(), Value::from(root));
        assoc_row.insert("dim_id".into(), Value::from(dim_id));
        push(batch, "series_created_by_assoc", assoc_row);
    }
}

fn normalize_networks(batch: &mut RowBatch, record: &Value, root: i64) {
    let Some(networks) = record.get("networks").and_then(Value::as_array) else { return };
    for n in networks {
        let Some(dim_id) = n.get("id").and_then(Value::as_i64) else { continue };
        let mut dim_row = Row::new();
        dim_row.insert("id".into(), Value::from(dim_id));
        dim_row.insert("name".into(), s(n, "name"));
        dim_row.insert("logo_path".into(), s(n, "logo_path"));
        dim_row.insert("origin_country".into(), s(n, "origin_country"));
        push(batch, "series_networks", dim_row);

        let mut assoc_row = Row::new();
        assoc_row.insert("root_id".into(), Value::from(root));
        assoc_row.insert("dim_id".into(), Value::from(dim_id));
        push(batch, "series_networks_assoc", assoc_row);
    }
}

fn normalize_seasons(batch: &mut RowBatch, record: &Value, root: i64) {
    let Some(seasons) = record.get("seasons").and_then(Value::as_array) else { return };
    for season in seasons {
        let Some(season_id) = season.get("id").and_then(Value::as_i64) else { continue };
        let mut row = Row::new();
        row.insert("id".into(), Value::from(season_id));
        row.insert("root_id".into(), Value::from(root));
        row.insert("season_number".into(), s(season, "season_number"));
        row.insert("name".into(), s(season, "name"));
        row.insert("overview".into(), empty_str_to_null(s(season, "overview")));
        row.insert("air_date".into(), empty_str_to_null(s(season, "air_date")));
        row.insert("episode_count".into(), s(season, "episode_count"));
        push(batch, "series_seasons", row);
    }
}

/// Stamped alongside normalization in the changes reconciler to mark when a
/// record was last refreshed from upstream; unused by full_sweep since
/// staging tables are wholly regenerated each time.
pub fn now_stamp() -> chrono::DateTime<Utc> {
    Utc::now()
}
