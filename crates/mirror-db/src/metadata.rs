//! `sync_metadata`: the one small table outside the movie/series schema,
//! holding `last_successful_changes_sync` per family.

use chrono::{DateTime, Utc};
use mirror_common::schema::Family;
use mirror_common::{Error, Result};
use sqlx::PgPool;

pub async fn ensure_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sync_metadata (
            family TEXT PRIMARY KEY,
            last_successful_changes_sync TIMESTAMPTZ,
            last_full_sweep_completed_at TIMESTAMPTZ
        )",
    )
    .execute(pool)
    .await
    .map_err(Error::from)?;
    Ok(())
}

fn family_key(family: Family) -> &'static str {
    match family {
        Family::Movie => "movie",
        Family::Series => "series",
    }
}

pub async fn last_successful_changes_sync(
    pool: &PgPool,
    family: Family,
) -> Result<Option<DateTime<Utc>>> {
    let row: Option<(Option<DateTime<Utc>>,)> = sqlx::query_as(
        "SELECT last_successful_changes_sync FROM sync_metadata WHERE family = $1",
    )
    .bind(family_key(family))
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?;
    Ok(row.and_then(|(v,)| v))
}

pub async fn set_last_successful_changes_sync(
    pool: &PgPool,
    family: Family,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO sync_metadata (family, last_successful_changes_sync)
         VALUES ($1, $2)
         ON CONFLICT (family) DO UPDATE SET last_successful_changes_sync = EXCLUDED.last_successful_changes_sync",
    )
    .bind(family_key(family))
    .bind(at)
    .execute(pool)
    .await
    .map_err(Error::from)?;
    Ok(())
}

pub async fn last_full_sweep_completed_at(
    pool: &PgPool,
    family: Family,
) -> Result<Option<DateTime<Utc>>> {
    let row: Option<(Option<DateTime<Utc>>,)> = sqlx::query_as(
        "SELECT last_full_sweep_completed_at FROM sync_metadata WHERE family = $1",
    )
    .bind(family_key(family))
    .fetch_optional(pool)
    .await
    .map_err(Error::from)?;
    Ok(row.and_then(|(v,)| v))
}

pub async fn set_last_full_sweep_completed_at(
    pool: &PgPool,
    family: Family,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO sync_metadata (family, last_full_sweep_completed_at)
         VALUES ($1, $2)
         ON CONFLICT (family) DO UPDATE SET last_full_sweep_completed_at = EXCLUDED.last_full_sweep_completed_at",
    )
    .bind(family_key(family))
    .bind(at)
    .execute(pool)
    .await
    .map_err(Error::from)?;
    Ok(())
}
