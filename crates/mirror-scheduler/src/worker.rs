//! Scheduler facade and worker loop: generalizes `JobProcessor::run`'s
//! biased-select dispatch loop from one queue to CRON-driven submission plus
//! externally enqueued jobs, with per-job concurrent execution instead of
//! one-at-a-time processing (different ids proceed in parallel).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mirror_common::Result;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cron::CronTable;
use crate::executor::{self, JobContext};
use crate::job::{Job, JobKind};
use crate::notifier::WebhookNotifier;
use crate::state::SchedulerState;

/// Drain grace period after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// The externally visible half of the scheduler: CLI and REST handlers hold
/// a clone of this and never touch [`SchedulerState`] or the worker loop
/// directly.
#[derive(Clone)]
pub struct Scheduler {
    state: Arc<SchedulerState>,
    enqueue_tx: mpsc::UnboundedSender<Job>,
}

impl Scheduler {
    /// Submits `kind`. Resolves synchronously against the single-flight
    /// lock so callers (CLI exit code, REST 202/409) get an immediate
    /// answer without waiting for the job to run.
    pub fn submit(&self, kind: JobKind) -> Result<Job> {
        let job = self.state.try_admit(Job::new(kind))?;
        // The receiver is only dropped once the worker loop has shut down;
        // a send failing past that point just means the job was accepted
        // too late to run, which only happens during process exit.
        let _ = self.enqueue_tx.send(job.clone());
        Ok(job)
    }

    pub fn get(&self, id: uuid::Uuid) -> Option<Job> {
        self.state.get(id)
    }

    pub fn history(&self) -> Vec<Job> {
        self.state.history()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<crate::state::SchedulerEvent> {
        self.state.subscribe()
    }
}

/// Owns the worker loop. Construct with [`Worker::new`], then `tokio::spawn`
/// [`Worker::run`]; its paired [`Scheduler`] is what the rest of the process
/// talks to.
pub struct Worker {
    state: Arc<SchedulerState>,
    ctx: JobContext,
    notifier: Arc<WebhookNotifier>,
    schedule: CronTable,
    enqueue_rx: mpsc::UnboundedReceiver<Job>,
}

impl Worker {
    pub fn new(ctx: JobContext, notifier: WebhookNotifier, schedule: CronTable) -> (Self, Scheduler) {
        let state = Arc::new(SchedulerState::new());
        let (enqueue_tx, enqueue_rx) = mpsc::unbounded_channel();
        let worker = Self { state: state.clone(), ctx, notifier: Arc::new(notifier), schedule, enqueue_rx };
        let scheduler = Scheduler { state, enqueue_tx };
        (worker, scheduler)
    }

    /// Runs until `shutdown` is cancelled, then drains in-flight jobs up to
    /// [`SHUTDOWN_GRACE`] before returning.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("scheduler worker started");
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            let sleep_until_next_cron = match self.schedule.next_due(Utc::now()) {
                Some((_, at)) => (at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
                None => Duration::from_secs(3600),
            };

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("scheduler worker shutting down, draining in-flight jobs");
                    break;
                }

                Some(job) = self.enqueue_rx.recv() => {
                    self.spawn_job(&mut in_flight, job, shutdown.clone());
                }

                _ = tokio::time::sleep(sleep_until_next_cron) => {
                    if let Some((kind, _)) = self.schedule.next_due(Utc::now()) {
                        match self.state.try_admit(Job::new(kind)) {
                            Ok(job) => self.spawn_job(&mut in_flight, job, shutdown.clone()),
                            Err(e) => tracing::info!(error = %e, "scheduled job not submitted"),
                        }
                    }
                }

                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await
        {
            Ok(()) => tracing::info!("scheduler worker drained cleanly"),
            Err(_) => tracing::warn!("scheduler worker grace period expired with jobs still running"),
        }
    }

    fn spawn_job(&self, in_flight: &mut JoinSet<()>, job: Job, shutdown: CancellationToken) {
        let state = self.state.clone();
        let ctx = self.ctx.clone();
        let notifier = self.notifier.clone();
        let id = job.id;
        let kind = job.kind.clone();

        in_flight.spawn(async move {
            state.mark_started(id);
            tracing::info!(kind = kind.label(), %id, "job started");

            // Runs as its own task rather than racing `execute` in a
            // `select!` here: a `select!` would drop `execute`'s future the
            // instant `shutdown` fires, before it ever reaches its own
            // internal cancellation checks (Gate::acquire, retry backoff
            // sleeps). Flipping `cancel` from an independent task instead
            // lets those checks observe it on their own next poll, so the
            // job unwinds cooperatively rather than being killed outright.
            let cancel = CancellationToken::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    shutdown.cancelled().await;
                    cancel.cancel();
                }
            });

            let result: Result<serde_json::Value> = executor::execute(&ctx, &kind, &cancel).await;

            report_outcome(&state, &notifier, id, &kind, result).await;
        });
    }
}

async fn report_outcome(
    state: &SchedulerState,
    notifier: &WebhookNotifier,
    id: uuid::Uuid,
    kind: &JobKind,
    result: Result<serde_json::Value>,
) {
    match result {
        Ok(report) => {
            tracing::info!(kind = kind.label(), %id, %report, "job completed");
            state.mark_completed(id, report.clone());
            notifier
                .notify(serde_json::json!({
                    "job": kind.label(),
                    "id": id,
                    "status": "completed",
                    "report": report,
                }))
                .await;
        }
        Err(e) => {
            tracing::error!(kind = kind.label(), %id, error = %e, "job failed");
            state.mark_failed(id, &e.to_string());
            notifier
                .notify(serde_json::json!({
                    "job": kind.label(),
                    "id": id,
                    "status": "failed",
                    "error": e.to_string(),
                }))
                .await;
        }
    }
}
