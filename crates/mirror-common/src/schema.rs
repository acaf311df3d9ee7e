//! Table descriptors: the single source of truth for table/column/PK shape
//! shared by the normalizer, bulk loader, and swap engine.
//!
//! Hand-written INSERT/SELECT statements are built from these rather than
//! from a declarative ORM mapping, to keep normalization logic separate
//! from schema declarations.

/// One of the two record families the mirror tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Movie,
    Series,
}

impl Family {
    pub fn root_table(&self) -> &'static str {
        match self {
            Family::Movie => "movie",
            Family::Series => "series",
        }
    }

    /// All live tables for this family, root first, in an order safe to
    /// create in (dimensions/children before the associations that
    /// reference them is not required for renames, but is a sane default
    /// for a fresh `create_tables`).
    pub fn tables(&self) -> &'static [TableDescriptor] {
        match self {
            Family::Movie => MOVIE_TABLES,
            Family::Series => SERIES_TABLES,
        }
    }

    pub fn table(&self, name: &str) -> Option<&'static TableDescriptor> {
        self.tables().iter().find(|t| t.name == name)
    }
}

/// Describes one live table: its columns, primary key, and which columns
/// are nullable. `staging_name`/`old_name` derive the sibling names the
/// bulk loader and swap engine address.
#[derive(Debug, Clone, Copy)]
pub struct TableDescriptor {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub primary_key: &'static [&'static str],
    pub nullable: &'static [&'static str],
    pub kind: TableKind,
}

/// Where a table sits in the dependency shape — purely descriptive, used by
/// the bulk loader to decide dedup-by-ON-CONFLICT (dimension) vs. plain
/// insert (root/association/child).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Root,
    Dimension,
    Association,
    Child,
}

impl TableDescriptor {
    pub fn staging_name(&self) -> String {
        format!("staging_{}", self.name)
    }

    pub fn old_name(&self) -> String {
        format!("{}_old", self.name)
    }

    pub fn is_nullable(&self, column: &str) -> bool {
        self.nullable.contains(&column)
    }
}

const fn root(name: &'static str, columns: &'static [&'static str], nullable: &'static [&'static str]) -> TableDescriptor {
    TableDescriptor { name, columns, primary_key: &["id"], nullable, kind: TableKind::Root }
}

const fn dimension(
    name: &'static str,
    columns: &'static [&'static str],
    primary_key: &'static [&'static str],
) -> TableDescriptor {
    TableDescriptor { name, columns, primary_key, nullable: &[], kind: TableKind::Dimension }
}

const ROOT_DIM_COLUMNS: &[&str] = &["root_id", "dim_id"];

const fn assoc(name: &'static str) -> TableDescriptor {
    TableDescriptor {
        name,
        columns: ROOT_DIM_COLUMNS,
        primary_key: ROOT_DIM_COLUMNS,
        nullable: &[],
        kind: TableKind::Association,
    }
}

const fn child(
    name: &'static str,
    columns: &'static [&'static str],
    primary_key: &'static [&'static str],
    nullable: &'static [&'static str],
) -> TableDescriptor {
    TableDescriptor { name, columns, primary_key, nullable, kind: TableKind::Child }
}

pub static MOVIE_TABLES: &[TableDescriptor] = &[
    root(
        "movie",
        &["id", "title", "original_title", "overview", "release_date", "runtime",
          "budget", "revenue", "status", "tagline", "popularity", "vote_average",
          "vote_count", "adult", "original_language", "belongs_to_collection_id"],
        &["overview", "release_date", "runtime", "tagline", "belongs_to_collection_id"],
    ),
    dimension("movie_collections", &["id", "name", "poster_path", "backdrop_path"], &["id"]),
    dimension("movie_genres", &["id", "name"], &["id"]),
    assoc("movie_genres_assoc"),
    dimension("movie_production_companies", &["id", "name", "logo_path", "origin_country"], &["id"]),
    assoc("movie_companies_assoc"),
    dimension("movie_production_countries", &["iso_3166_1", "name"], &["iso_3166_1"]),
    assoc("movie_countries_assoc"),
    dimension("movie_spoken_languages", &["iso_639_1", "name"], &["iso_639_1"]),
    assoc("movie_languages_assoc"),
    child(
        "movie_alternative_titles",
        &["id", "root_id", "iso_3166_1", "title", "type"],
        &["id"],
        &["type"],
    ),
    dimension("movie_cast_members", &["id", "name", "gender", "profile_path"], &["id"]),
    child(
        "movie_cast_assoc",
        &["root_id", "dim_id", "character", "cast_order"],
        &["root_id", "dim_id"],
        &["character"],
    ),
    child(
        "movie_external_ids",
        &["root_id", "imdb_id", "wikidata_id", "facebook_id", "instagram_id", "twitter_id"],
        &["root_id"],
        &["imdb_id", "wikidata_id", "facebook_id", "instagram_id", "twitter_id"],
    ),
    dimension("movie_keywords", &["id", "name"], &["id"]),
    assoc("movie_keywords_assoc"),
    child(
        "movie_release_dates",
        &["id", "root_id", "iso_3166_1", "type", "certification", "release_date"],
        &["id"],
        &["certification"],
    ),
    child("movie_videos", &["id", "root_id", "name", "site", "type", "key"], &["id"], &[]),
];

pub static SERIES_TABLES: &[TableDescriptor] = &[
    root(
        "series",
        &["id", "name", "original_name", "overview", "first_air_date", "last_air_date",
          "number_of_episodes", "number_of_seasons", "status", "tagline", "popularity",
          "vote_average", "vote_count", "adult", "original_language",
          "last_episode_to_air_id", "next_episode_to_air_id"],
        &["overview", "first_air_date", "last_air_date", "tagline",
          "last_episode_to_air_id", "next_episode_to_air_id"],
    ),
    dimension("series_genres", &["id", "name"], &["id"]),
    assoc("series_genres_assoc"),
    dimension("series_production_companies", &["id", "name", "logo_path", "origin_country"], &["id"]),
    assoc("series_companies_assoc"),
    dimension("series_production_countries", &["iso_3166_1", "name"], &["iso_3166_1"]),
    assoc("series_countries_assoc"),
    dimension("series_spoken_languages", &["iso_639_1", "name"], &["iso_639_1"]),
    assoc("series_languages_assoc"),
    child(
        "series_alternative_titles",
        &["id", "root_id", "iso_3166_1", "title", "type"],
        &["id"],
        &["type"],
    ),
    dimension("series_cast_members", &["id", "name", "gender", "profile_path"], &["id"]),
    child(
        "series_cast_assoc",
        &["root_id", "dim_id", "character", "cast_order"],
        &["root_id", "dim_id"],
        &["character"],
    ),
    child(
        "series_external_ids",
        &["root_id", "imdb_id", "wikidata_id", "facebook_id", "instagram_id", "twitter_id", "tvdb_id"],
        &["root_id"],
        &["imdb_id", "wikidata_id", "facebook_id", "instagram_id", "twitter_id", "tvdb_id"],
    ),
    dimension("series_keywords", &["id", "name"], &["id"]),
    assoc("series_keywords_assoc"),
    child(
        "series_content_ratings",
        &["id", "root_id", "iso_3166_1", "rating"],
        &["id"],
        &["rating"],
    ),
    child("series_videos", &["id", "root_id", "name", "site", "type", "key"], &["id"], &[]),
    dimension("series_created_by", &["id", "name", "gender", "profile_path"], &["id"]),
    assoc("series_created_by_assoc"),
    dimension("series_networks", &["id", "name", "logo_path", "origin_country"], &["id"]),
    assoc("series_networks_assoc"),
    child(
        "series_seasons",
        &["id", "root_id", "season_number", "name", "overview", "air_date", "episode_count"],
        &["id"],
        &["overview", "air_date"],
    ),
    child(
        "series_last_episode_to_air",
        &["id", "root_id", "name", "overview", "air_date", "season_number", "episode_number"],
        &["id"],
        &["overview", "air_date"],
    ),
    child(
        "series_next_episode_to_air",
        &["id", "root_id", "name", "overview", "air_date", "season_number", "episode_number"],
        &["id"],
        &["overview", "air_date"],
    ),
];
