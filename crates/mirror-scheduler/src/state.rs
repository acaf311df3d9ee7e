//! In-memory job table, single-flight lock map, and progress broadcast —
//! generalizes `AppState`'s job map/queue/history/`seen_files` dedup set
//! from one file-conversion job to the eight catalog job kinds.

use std::collections::VecDeque;
use std::sync::Mutex;

use dashmap::DashMap;
use mirror_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::job::{Job, JobKind, JobStatus};

const MAX_HISTORY: usize = 500;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Progress event broadcast to REST/CLI subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    JobQueued { job: Job },
    JobStarted { id: Uuid, kind: JobKind },
    JobCompleted { job: Job },
    JobFailed { id: Uuid, kind: JobKind, error: String },
    JobRejected { kind: JobKind, reason: String },
}

pub struct SchedulerState {
    jobs: DashMap<Uuid, Job>,
    /// Lock key -> id of the job currently holding it.
    locks: DashMap<String, Uuid>,
    history: Mutex<VecDeque<Job>>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl SchedulerState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            jobs: DashMap::new(),
            locks: DashMap::new(),
            history: Mutex::new(VecDeque::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    fn broadcast(&self, event: SchedulerEvent) {
        let _ = self.events.send(event);
    }

    /// Atomically checks the single-flight lock and, if free, registers the
    /// job as its holder. Kinds with no lock key (`create_tables`,
    /// `test_webhook`) always succeed.
    pub fn try_admit(&self, job: Job) -> Result<Job> {
        if let Some(key) = job.kind.lock_key() {
            match self.locks.entry(key.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    self.broadcast(SchedulerEvent::JobRejected {
                        kind: job.kind.clone(),
                        reason: "already running".to_string(),
                    });
                    tracing::info!(kind = job.kind.label(), %key, "job rejected: already running");
                    return Err(Error::already_running(key));
                }
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(job.id);
                }
            }
        }

        self.jobs.insert(job.id, job.clone());
        self.broadcast(SchedulerEvent::JobQueued { job: job.clone() });
        Ok(job)
    }

    pub fn mark_started(&self, id: Uuid) {
        if let Some(mut entry) = self.jobs.get_mut(&id) {
            entry.start();
            self.broadcast(SchedulerEvent::JobStarted { id, kind: entry.kind.clone() });
        }
    }

    pub fn mark_completed(&self, id: Uuid, report: Value) {
        self.finish(id, |job| job.complete(report));
    }

    pub fn mark_failed(&self, id: Uuid, error: &str) {
        self.finish(id, |job| job.fail(error));
    }

    fn finish(&self, id: Uuid, apply: impl FnOnce(&mut Job)) {
        let job = self.jobs.remove(&id).map(|(_, mut job)| {
            apply(&mut job);
            job
        });
        let Some(job) = job else { return };

        if let Some(key) = job.kind.lock_key() {
            // Only release if we still hold it (defensive; a key is never
            // reassigned while its holder is in `jobs`).
            if self.locks.get(&key).map(|h| *h) == Some(id) {
                self.locks.remove(&key);
            }
        }

        match job.status {
            JobStatus::Completed => self.broadcast(SchedulerEvent::JobCompleted { job: job.clone() }),
            JobStatus::Failed => self.broadcast(SchedulerEvent::JobFailed {
                id: job.id,
                kind: job.kind.clone(),
                error: job.error.clone().unwrap_or_default(),
            }),
            _ => {}
        }

        let mut history = self.history.lock().expect("history mutex poisoned");
        history.push_front(job);
        history.truncate(MAX_HISTORY);
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.get(&id).map(|e| e.clone()).or_else(|| {
            self.history
                .lock()
                .expect("history mutex poisoned")
                .iter()
                .find(|j| j.id == id)
                .cloned()
        })
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.locks.contains_key(key)
    }

    pub fn history(&self) -> Vec<Job> {
        self.history.lock().expect("history mutex poisoned").iter().cloned().collect()
    }
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::new()
    }
}
