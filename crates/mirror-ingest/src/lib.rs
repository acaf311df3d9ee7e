//! Normalizer, bulk loader, swap engine, and the two reconciliation passes
//! (changes_sync, missing/prune) that keep the mirror in sync between full
//! sweeps.

pub mod bulk_loader;
pub mod full_sweep;
pub mod live_write;
pub mod missing_prune;
pub mod normalize;
pub mod reconcile;
pub mod swap;
pub mod window;

pub use bulk_loader::BulkLoader;
pub use full_sweep::{full_sweep, SweepReport};
pub use missing_prune::{missing_ids, prune_deleted, DiffReport};
pub use normalize::{normalize, Row, RowBatch};
pub use reconcile::{changes_sync, changes_sync_with_options, SyncReport};
