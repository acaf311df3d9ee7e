//! CRON schedule table: parses the four configured schedules and
//! answers "what fires next" for the worker loop.

use chrono::{DateTime, Utc};
use cron::Schedule;
use mirror_common::config::CronConfig;
use mirror_common::{Error, Result};
use std::str::FromStr;

use crate::job::JobKind;

struct ScheduleEntry {
    kind: JobKind,
    schedule: Schedule,
}

/// Holds the parsed schedule for every enabled CRON slot. Disabled slots
/// (normalized to `None` by [`mirror_common::config::parse_cron_slot`])
/// simply have no entry and never fire.
pub struct CronTable {
    entries: Vec<ScheduleEntry>,
}

/// The `cron` crate expects a 6-or-7-field expression with a leading
/// seconds slot; configured schedules are plain 5-field CRON. A bare
/// 5-field expression is widened by prefixing a `0` seconds slot.
fn widen_to_six_fields(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

fn parse(expr: &str) -> Result<Schedule> {
    Schedule::from_str(&widen_to_six_fields(expr))
        .map_err(|e| Error::config(format!("invalid CRON expression {expr:?}: {e}")))
}

impl CronTable {
    pub fn from_config(cfg: &CronConfig) -> Result<Self> {
        let mut entries = Vec::new();
        if let Some(expr) = &cfg.full_sweep {
            entries.push(ScheduleEntry { kind: JobKind::FullSweep, schedule: parse(expr)? });
        }
        if let Some(expr) = &cfg.missing_only {
            entries.push(ScheduleEntry { kind: JobKind::MissingIds, schedule: parse(expr)? });
        }
        if let Some(expr) = &cfg.prune {
            entries.push(ScheduleEntry { kind: JobKind::PruneDeleted, schedule: parse(expr)? });
        }
        if let Some(expr) = &cfg.changes_sync {
            entries.push(ScheduleEntry { kind: JobKind::ChangesSync { force: false }, schedule: parse(expr)? });
        }
        Ok(Self { entries })
    }

    /// The earliest (kind, fire time) among all entries, strictly after `now`.
    pub fn next_due(&self, now: DateTime<Utc>) -> Option<(JobKind, DateTime<Utc>)> {
        self.entries
            .iter()
            .filter_map(|e| e.schedule.after(&now).next().map(|at| (e.kind.clone(), at)))
            .min_by_key(|(_, at)| *at)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
