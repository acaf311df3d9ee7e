//! Job kinds and the record kept for each submission.

use chrono::{DateTime, Utc};
use mirror_common::schema::Family;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The eight job kinds a submission source (CRON, CLI, REST) can enqueue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    FullSweep,
    MissingIds,
    PruneDeleted,
    /// `force` skips the "full_sweep ran within the last 24h" skip gate.
    ChangesSync { force: bool },
    CreateTables,
    AddMovie { id: i64 },
    AddSeries { id: i64 },
    TestWebhook { message: String },
}

impl JobKind {
    /// The single-flight lock key for this kind, or `None` if this kind is
    /// never deduplicated (only the four global jobs and the two
    /// per-id jobs take a lock; `create_tables` and `test_webhook` don't).
    pub fn lock_key(&self) -> Option<String> {
        match self {
            JobKind::FullSweep => Some("full_sweep".to_string()),
            JobKind::MissingIds => Some("missing_ids".to_string()),
            JobKind::PruneDeleted => Some("prune_deleted".to_string()),
            JobKind::ChangesSync { .. } => Some("changes_sync".to_string()),
            JobKind::AddMovie { id } => Some(format!("add_movie:{id}")),
            JobKind::AddSeries { id } => Some(format!("add_series:{id}")),
            JobKind::CreateTables | JobKind::TestWebhook { .. } => None,
        }
    }

    /// Families this kind touches, in the order they should run. Global
    /// sweep/reconciliation jobs run once per family; per-id jobs touch
    /// exactly the family their id belongs to.
    pub fn families(&self) -> &'static [Family] {
        match self {
            JobKind::FullSweep
            | JobKind::MissingIds
            | JobKind::PruneDeleted
            | JobKind::ChangesSync { .. }
            | JobKind::CreateTables => &[Family::Movie, Family::Series],
            JobKind::AddMovie { .. } => &[Family::Movie],
            JobKind::AddSeries { .. } => &[Family::Series],
            JobKind::TestWebhook { .. } => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobKind::FullSweep => "full_sweep",
            JobKind::MissingIds => "missing_ids",
            JobKind::PruneDeleted => "prune_deleted",
            JobKind::ChangesSync { .. } => "changes_sync",
            JobKind::CreateTables => "create_tables",
            JobKind::AddMovie { .. } => "add_movie",
            JobKind::AddSeries { .. } => "add_series",
            JobKind::TestWebhook { .. } => "test_webhook",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Per-phase counts, keyed by family label when more than one family
    /// ran (e.g. `{"movie": {...}, "series": {...}}`); absent until the job
    /// finishes at least one family.
    pub report: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::Queued,
            report: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, report: Value) {
        self.status = JobStatus::Completed;
        self.report = Some(report);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &str) {
        self.status = JobStatus::Failed;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_jobs_lock_on_kind_name() {
        assert_eq!(JobKind::FullSweep.lock_key().as_deref(), Some("full_sweep"));
        assert_eq!(JobKind::ChangesSync { force: false }.lock_key().as_deref(), Some("changes_sync"));
    }

    #[test]
    fn per_id_jobs_lock_on_kind_plus_id() {
        assert_eq!(JobKind::AddMovie { id: 42 }.lock_key().as_deref(), Some("add_movie:42"));
        assert_eq!(JobKind::AddSeries { id: 7 }.lock_key().as_deref(), Some("add_series:7"));
        assert_ne!(
            JobKind::AddMovie { id: 1 }.lock_key(),
            JobKind::AddMovie { id: 2 }.lock_key()
        );
    }

    #[test]
    fn create_tables_and_test_webhook_are_not_single_flight() {
        assert_eq!(JobKind::CreateTables.lock_key(), None);
        assert_eq!(JobKind::TestWebhook { message: "hi".into() }.lock_key(), None);
    }

    #[test]
    fn per_id_jobs_touch_one_family() {
        assert_eq!(JobKind::AddMovie { id: 1 }.families(), &[Family::Movie]);
        assert_eq!(JobKind::AddSeries { id: 1 }.families(), &[Family::Series]);
    }

    #[test]
    fn global_jobs_touch_both_families() {
        assert_eq!(JobKind::FullSweep.families(), &[Family::Movie, Family::Series]);
    }
}
