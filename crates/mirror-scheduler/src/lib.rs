//! Job queue, single-flight locking, CRON dispatch, and webhook notifier.
//!
//! Tracks the eight catalog job kinds with global and per-id single-flight
//! locking, a `JoinSet` of concurrently-running job tasks, and a CRON table
//! that feeds the worker loop its next scheduled submission.

pub mod cron;
pub mod executor;
pub mod job;
pub mod notifier;
pub mod state;
pub mod worker;

pub use cron::CronTable;
pub use executor::JobContext;
pub use job::{Job, JobKind, JobStatus};
pub use notifier::WebhookNotifier;
pub use state::{SchedulerEvent, SchedulerState};
pub use worker::{Scheduler, Worker};
