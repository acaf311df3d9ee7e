//! Shared config, schema descriptors, and error handling for the catalog
//! mirror workspace.
//!
//! - **Config**: environment-variable-driven configuration, validated once
//!   at startup.
//! - **Schema**: table descriptors shared by the normalizer, bulk loader,
//!   and swap engine so there is one source of truth for table/column names.
//! - **Error**: the shared error taxonomy other crates match on.

pub mod config;
pub mod error;
pub mod schema;

pub use config::Config;
pub use error::{Error, Result};
pub use schema::{Family, TableDescriptor};
