//! Single-record writes against live tables, shared by the changes
//! reconciler and the missing/prune passes: both need "delete this root's
//! owned rows, then optionally reinsert them" as one transaction.

use mirror_common::schema::{Family, TableKind};
use mirror_common::{Error, Result};
use sqlx::PgPool;

use crate::bulk_loader::{build_arguments, build_insert_sql_into};
use crate::normalize::RowBatch;

/// Deletes the root row and everything it owns (children, associations),
/// then reinserts the rows in `batch`, inside one transaction. Dimension
/// rows are upserted with `ON CONFLICT DO NOTHING`, never deleted here.
pub async fn upsert_into_live(pool: &PgPool, family: Family, id: i64, batch: RowBatch) -> Result<()> {
    let mut tx = pool.begin().await.map_err(Error::from)?;
    delete_owned_rows(&mut tx, family, id).await?;

    for table in family.tables() {
        let Some(rows) = batch.get(table.name) else { continue };
        if rows.is_empty() {
            continue;
        }
        let sql = build_insert_sql_into(table, table.name, rows.len());
        let args = build_arguments(table, rows)?;
        sqlx::query_with(&sql, args).execute(&mut *tx).await.map_err(Error::from)?;
    }

    tx.commit().await.map_err(Error::from)?;
    Ok(())
}

/// Deletes the root row and everything it owns, without reinserting
/// anything (the prune/delete path).
pub async fn delete_record(pool: &PgPool, family: Family, id: i64) -> Result<()> {
    let mut tx = pool.begin().await.map_err(Error::from)?;
    delete_owned_rows(&mut tx, family, id).await?;
    tx.commit().await.map_err(Error::from)?;
    Ok(())
}

async fn delete_owned_rows(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    family: Family,
    id: i64,
) -> Result<()> {
    for table in family.tables() {
        match table.kind {
            TableKind::Child | TableKind::Association => {
                let sql = format!("DELETE FROM {} WHERE root_id = $1", table.name);
                sqlx::query(&sql).bind(id).execute(&mut **tx).await.map_err(Error::from)?;
            }
            TableKind::Root => {
                let sql = format!("DELETE FROM {} WHERE id = $1", table.name);
                sqlx::query(&sql).bind(id).execute(&mut **tx).await.map_err(Error::from)?;
            }
            TableKind::Dimension => {}
        }
    }
    Ok(())
}
