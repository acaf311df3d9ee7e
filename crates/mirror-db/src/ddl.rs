//! Turns `mirror_common::schema` table descriptors into `CREATE TABLE`
//! statements, for both the live and `staging_*` variants.

use mirror_common::schema::{Family, TableDescriptor};
use mirror_common::{Error, Result};
use sqlx::PgPool;

/// Best-effort column type inference from naming conventions, since the
/// table descriptors only carry name/PK/nullability. A handful of tables
/// need an explicit override (string PKs, ISO codes); those are special
/// cased below rather than folded into the naming heuristic.
pub fn sql_type_for(table: &TableDescriptor, column: &str) -> &'static str {
    if (table.name == "movie_videos" || table.name == "series_videos") && column == "id" {
        return "TEXT";
    }
    if column == "iso_3166_1" || column == "iso_639_1" || column == "character" {
        return "TEXT";
    }
    if column == "adult" {
        return "BOOLEAN";
    }
    if column == "popularity" || column == "vote_average" {
        return "DOUBLE PRECISION";
    }
    if matches!(
        column,
        "runtime"
            | "budget"
            | "revenue"
            | "number_of_episodes"
            | "number_of_seasons"
            | "vote_count"
            | "cast_order"
            | "season_number"
            | "episode_number"
            | "episode_count"
    ) {
        return "INTEGER";
    }
    if column.ends_with("_date") {
        return "DATE";
    }
    if column == "id" || column.ends_with("_id") {
        return "BIGINT";
    }
    "TEXT"
}

fn column_def(table: &TableDescriptor, column: &str) -> String {
    let ty = sql_type_for(table, column);
    let nullability = if table.is_nullable(column) { "" } else { " NOT NULL" };
    format!("{column} {ty}{nullability}")
}

/// Renders `CREATE TABLE IF NOT EXISTS <name> (...)` for a descriptor, using
/// `name_override` instead of `table.name` when building the staging
/// variant.
pub fn create_table_sql(table: &TableDescriptor, name_override: &str) -> String {
    let columns = table
        .columns
        .iter()
        .map(|c| column_def(table, c))
        .collect::<Vec<_>>()
        .join(",\n    ");
    let pk = table.primary_key.join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {name_override} (\n    {columns},\n    PRIMARY KEY ({pk})\n)"
    )
}

/// Creates the live and staging tables for one family. Idempotent: existing
/// tables are left untouched (`IF NOT EXISTS`).
pub async fn create_tables(pool: &PgPool, family: Family) -> Result<()> {
    let mut tx = pool.begin().await.map_err(Error::from)?;
    for table in family.tables() {
        let live_sql = create_table_sql(table, table.name);
        sqlx::query(&live_sql).execute(&mut *tx).await.map_err(Error::from)?;

        let staging_name = table.staging_name();
        let staging_sql = create_table_sql(table, &staging_name);
        sqlx::query(&staging_sql).execute(&mut *tx).await.map_err(Error::from)?;
    }
    tx.commit().await.map_err(Error::from)?;
    Ok(())
}

/// Truncates every `staging_*` table for a family. Run before a full_sweep
/// begins populating them, so a prior aborted sweep's rows don't leak in.
pub async fn truncate_staging(pool: &PgPool, family: Family) -> Result<()> {
    let mut tx = pool.begin().await.map_err(Error::from)?;
    for table in family.tables() {
        let sql = format!("TRUNCATE TABLE {} CASCADE", table.staging_name());
        sqlx::query(&sql).execute(&mut *tx).await.map_err(Error::from)?;
    }
    tx.commit().await.map_err(Error::from)?;
    Ok(())
}
