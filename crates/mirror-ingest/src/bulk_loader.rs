//! Bulk loader: batches normalized rows into per-table buffers and
//! flushes each as one multi-row `INSERT ... ON CONFLICT` into its
//! `staging_*` table.

use std::collections::HashMap;

use mirror_common::schema::{Family, TableDescriptor};
use mirror_common::{Error, Result};
use mirror_db::ddl::sql_type_for;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::{Arguments, PgPool};

use crate::normalize::{Row, RowBatch};

pub struct BulkLoader<'p> {
    pool: &'p PgPool,
    family: Family,
    batch_size: usize,
    buffers: HashMap<&'static str, Vec<Row>>,
}

impl<'p> BulkLoader<'p> {
    pub fn new(pool: &'p PgPool, family: Family, batch_size: u32) -> Self {
        BulkLoader {
            pool,
            family,
            batch_size: batch_size.max(1) as usize,
            buffers: HashMap::new(),
        }
    }

    /// Buffers one normalized record's row batch, flushing any table whose
    /// buffer has reached `batch_size`.
    pub async fn add(&mut self, batch: RowBatch) -> Result<()> {
        for (table, rows) in batch {
            self.buffers.entry(table).or_default().extend(rows);
            if self.buffers[table].len() >= self.batch_size {
                self.flush_table(table).await?;
            }
        }
        Ok(())
    }

    /// Flushes every remaining non-empty buffer. Call once after the last
    /// `add`.
    pub async fn finish(mut self) -> Result<()> {
        let tables: Vec<&'static str> = self.buffers.keys().copied().collect();
        for table in tables {
            self.flush_table(table).await?;
        }
        Ok(())
    }

    async fn flush_table(&mut self, table_name: &'static str) -> Result<()> {
        let Some(rows) = self.buffers.get_mut(table_name) else { return Ok(()) };
        if rows.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(rows);

        let descriptor = self
            .family
            .table(table_name)
            .ok_or_else(|| Error::internal(format!("unknown table {table_name}")))?;

        let sql = build_insert_sql_into(descriptor, &descriptor.staging_name(), rows.len());
        let args = build_arguments(descriptor, &rows)?;

        sqlx::query_with(&sql, args)
            .execute(self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

/// Renders `INSERT INTO {target} (...) VALUES (...),(...) ON CONFLICT ... DO
/// NOTHING` for `row_count` rows of `descriptor`'s shape. `target` lets
/// callers address either a `staging_*` table (the bulk loader) or the live
/// table directly (the changes reconciler's per-record upsert).
pub(crate) fn build_insert_sql_into(descriptor: &TableDescriptor, target: &str, row_count: usize) -> String {
    let columns = descriptor.columns.join(", ");
    let mut placeholders = Vec::with_capacity(row_count);
    let mut idx = 1u32;
    for _ in 0..row_count {
        let group = descriptor
            .columns
            .iter()
            .map(|_| {
                let p = format!("${idx}");
                idx += 1;
                p
            })
            .collect::<Vec<_>>()
            .join(", ");
        placeholders.push(format!("({group})"));
    }
    let values = placeholders.join(", ");

    // Every insert target dedupes on its primary key: dimensions because the
    // same genre/company/etc. recurs across many records in one build,
    // roots/associations/children because the normalizer may emit the same
    // row twice within a build (e.g. a changes_sync retry).
    let conflict = format!(" ON CONFLICT ({}) DO NOTHING", descriptor.primary_key.join(", "));

    format!("INSERT INTO {target} ({columns}) VALUES {values}{conflict}")
}

pub(crate) fn build_arguments(descriptor: &TableDescriptor, rows: &[Row]) -> Result<PgArguments> {
    let mut args = PgArguments::default();
    for row in rows {
        for column in descriptor.columns {
            let value = row.get(*column).cloned().unwrap_or(Value::Null);
            bind_value(&mut args, sql_type_for(descriptor, column), &value)?;
        }
    }
    Ok(args)
}

fn bind_value(args: &mut PgArguments, sql_type: &str, value: &Value) -> Result<()> {
    match sql_type {
        "BIGINT" => args.add(value.as_i64()).map_err(bind_err)?,
        "INTEGER" => args.add(value.as_i64().map(|v| v as i32)).map_err(bind_err)?,
        "DOUBLE PRECISION" => args.add(value.as_f64()).map_err(bind_err)?,
        "BOOLEAN" => args.add(value.as_bool()).map_err(bind_err)?,
        "DATE" => {
            let date = match value {
                Value::String(s) if !s.is_empty() => {
                    Some(chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
                        Error::internal(format!("bad date {s:?}: {e}"))
                    })?)
                }
                _ => None,
            };
            args.add(date).map_err(bind_err)?
        }
        _ => {
            let text = match value {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            };
            args.add(text).map_err(bind_err)?
        }
    }
    Ok(())
}

fn bind_err(e: sqlx::error::BoxDynError) -> Error {
    Error::internal(format!("failed to bind query argument: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_common::schema::Family;

    #[test]
    fn insert_sql_has_one_placeholder_group_per_row() {
        let descriptor = Family::Movie.table("movie_genres").unwrap();
        let sql = build_insert_sql_into(descriptor, &descriptor.staging_name(), 2);
        assert!(sql.starts_with("INSERT INTO staging_movie_genres (id, name) VALUES"));
        assert!(sql.contains("($1, $2), ($3, $4)"));
        assert!(sql.contains("ON CONFLICT (id) DO NOTHING"));
    }

    #[test]
    fn association_conflict_target_is_composite_key() {
        let descriptor = Family::Movie.table("movie_genres_assoc").unwrap();
        let sql = build_insert_sql_into(descriptor, &descriptor.staging_name(), 1);
        assert!(sql.contains("ON CONFLICT (root_id, dim_id) DO NOTHING"));
    }

    #[test]
    fn live_target_omits_staging_prefix() {
        let descriptor = Family::Movie.table("movie").unwrap();
        let sql = build_insert_sql_into(descriptor, descriptor.name, 1);
        assert!(sql.starts_with("INSERT INTO movie ("));
    }
}
