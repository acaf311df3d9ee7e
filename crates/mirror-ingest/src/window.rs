//! Adaptive look-back window for the changes reconciler. Kept pure and
//! separate from the I/O in [`crate::reconcile`] so the four window cases
//! are simple to exercise directly.

use chrono::{DateTime, Duration, Utc};

const TWENTY_FOUR_HOURS: i64 = 24;
const MAX_LOOKBACK_DAYS: i64 = 14;

/// Computes `[start, end]` for a changes_sync run given `now` and the
/// persisted `last_successful_changes_sync` (`None` if this is the first
/// run for the family).
pub fn compute_window(now: DateTime<Utc>, last_sync: Option<DateTime<Utc>>) -> (DateTime<Utc>, DateTime<Utc>) {
    match last_sync {
        Some(last) if now - last <= Duration::hours(TWENTY_FOUR_HOURS) => {
            (now - Duration::hours(TWENTY_FOUR_HOURS), now)
        }
        Some(last) => {
            let floor = now - Duration::days(MAX_LOOKBACK_DAYS);
            (floor.max(last), now)
        }
        None => (now - Duration::days(MAX_LOOKBACK_DAYS), now),
    }
}

/// Whether a full_sweep for the same family completed recently enough that
/// changes_sync should be a no-op (skip-after-sweep).
pub fn should_skip_after_sweep(now: DateTime<Utc>, last_full_sweep: Option<DateTime<Utc>>) -> bool {
    matches!(last_full_sweep, Some(completed) if now - completed <= Duration::hours(TWENTY_FOUR_HOURS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_prior_sync_uses_fourteen_day_window() {
        let now = Utc::now();
        let (start, end) = compute_window(now, None);
        assert_eq!(end, now);
        assert_eq!(start, now - Duration::days(14));
    }

    #[test]
    fn recent_sync_uses_flat_24h_window() {
        let now = Utc::now();
        let last = now - Duration::hours(3);
        let (start, end) = compute_window(now, Some(last));
        assert_eq!(end, now);
        assert_eq!(start, now - Duration::hours(24));
    }

    #[test]
    fn sync_exactly_24h_ago_is_still_the_flat_window() {
        let now = Utc::now();
        let last = now - Duration::hours(24);
        let (start, _) = compute_window(now, Some(last));
        assert_eq!(start, now - Duration::hours(24));
    }

    #[test]
    fn stale_sync_within_14_days_starts_at_last_sync() {
        let now = Utc::now();
        let last = now - Duration::days(5);
        let (start, end) = compute_window(now, Some(last));
        assert_eq!(start, last);
        assert_eq!(end, now);
    }

    #[test]
    fn sync_older_than_14_days_is_capped() {
        let now = Utc::now();
        let last = now - Duration::days(40);
        let (start, end) = compute_window(now, Some(last));
        assert_eq!(start, now - Duration::days(14));
        assert_eq!(end, now);
    }

    #[test]
    fn skip_after_sweep_within_24h() {
        let now = Utc::now();
        assert!(should_skip_after_sweep(now, Some(now - Duration::hours(1))));
        assert!(!should_skip_after_sweep(now, Some(now - Duration::hours(25))));
        assert!(!should_skip_after_sweep(now, None));
    }
}
