//! CLI surface: one subcommand per job kind, plus `serve` for the daemon.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tmdb-mirror")]
#[command(author, version, about = "Ingestion and reconciliation engine for a local TMDB catalog mirror")]
pub struct Cli {
    /// Enable verbose (trace-level) logging, overridden by RUST_LOG if set.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the long-lived process: CRON loop, worker pool, and (if
    /// API_ENABLED) the REST surface, until SIGTERM/Ctrl-C.
    Serve,

    /// Rebuild one or both families' entire catalog via staging tables.
    FullSweep,

    /// Upsert every id present upstream but missing from the live tables.
    MissingIds,

    /// Delete every live id no longer present upstream.
    PruneDeleted,

    /// Pull the incremental `/changes` feed and reconcile live tables.
    ChangesSync {
        /// Skip the "a full_sweep ran within the last 24h" gate.
        #[arg(long)]
        force: bool,
    },

    /// Create the live and staging tables if they don't already exist.
    CreateTables,

    /// Fetch and upsert a single movie by id.
    AddMovie {
        #[arg(long)]
        id: i64,
    },

    /// Fetch and upsert a single series by id.
    AddSeries {
        #[arg(long)]
        id: i64,
    },

    /// Post a test payload through the webhook notifier.
    TestWebhook {
        #[arg(long, default_value = "")]
        message: String,
    },
}
