//! PostgreSQL pool, DDL generation, and metadata queries for the catalog
//! mirror. Table shape comes from `mirror_common::schema`; this crate turns
//! those descriptors into `CREATE TABLE` statements and owns the
//! `sync_metadata` table the changes reconciler reads its watermark from.

pub mod ddl;
pub mod metadata;
pub mod pool;

pub use pool::{init_pool, DbPool};
