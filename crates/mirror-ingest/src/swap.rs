//! Swap engine: atomically renames `staging_*` tables into place at
//! the end of a full_sweep, retaining one prior generation as `*_old`.

use mirror_common::schema::Family;
use mirror_common::{Error, Result};
use sqlx::PgPool;

/// Swaps every table of `family` inside one transaction: drop any existing
/// `{t}_old`, rename live `{t}` to `{t}_old` (if it has rows to preserve),
/// then rename `staging_{t}` to `{t}`.
///
/// Per the open question in the design notes: pre-existing `*_old`
/// generations are dropped rather than accumulated.
pub async fn swap(pool: &PgPool, family: Family) -> Result<()> {
    let mut tx = pool.begin().await.map_err(Error::from)?;

    for table in family.tables() {
        let live = table.name;
        let old = table.old_name();
        let staging = table.staging_name();

        sqlx::query(&format!("DROP TABLE IF EXISTS {old}"))
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = 'public' AND table_name = $1)",
        )
        .bind(live)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::from)?;

        if exists {
            sqlx::query(&format!("ALTER TABLE {live} RENAME TO {old}"))
                .execute(&mut *tx)
                .await
                .map_err(Error::from)?;
        }

        sqlx::query(&format!("ALTER TABLE {staging} RENAME TO {live}"))
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;
    }

    tx.commit().await.map_err(Error::from)?;
    Ok(())
}
