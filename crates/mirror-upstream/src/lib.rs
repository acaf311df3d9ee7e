//! Rate-limited HTTP access to the upstream catalog API: the shared
//! limiter/gate, the retrying GET client, and the three fetchers built on
//! top of it (per-id records, daily id exports, and `/changes` pages).

pub mod changes;
pub mod client;
pub mod export;
pub mod limiter;
pub mod record;

pub use changes::fetch_changed_ids;
pub use client::{Fetched, UpstreamClient};
pub use export::ExportFetcher;
pub use limiter::Gate;
pub use record::fetch_record;
