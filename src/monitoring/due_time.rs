//! Expected-due-time computation for backup jobs.
//!
//! Modeled on Duplicati's scheduler semantics: the candidate due time is the
//! last run plus the expected interval; when the job is restricted to a
//! subset of weekdays the candidate is advanced forward until it lands on an
//! allowed day. All arithmetic is done in UTC so daylight-saving transitions
//! cannot flip a job's overdue status mid-sweep.

use super::models::WeekdaySet;
use chrono::{DateTime, Datelike, Duration, Utc};

/// Day-granularity advancement cap for intervals of at least one day.
const MAX_DAY_ADVANCES: u32 = 8;

/// Advancement cap when stepping by sub-day intervals. A one-hour interval
/// needs at most 7 * 24 steps to cross a full week, so this is generous.
const MAX_INTERVAL_ADVANCES: u32 = 1000;

/// Compute the next expected run for a job, or `None` when the job can never
/// come due (empty weekday set, or no allowed day within the advancement cap).
///
/// A candidate that already falls on an allowed weekday is returned as-is,
/// including the exact-midnight boundary: no advancement happens when the due
/// time lands on an allowed day at 00:00.
pub fn next_expected_run(
    last_run: DateTime<Utc>,
    interval_hours: u32,
    allowed_weekdays: WeekdaySet,
) -> Option<DateTime<Utc>> {
    if allowed_weekdays.is_empty() {
        // Jobs restricted to no weekday at all are excluded from overdue
        // checking entirely.
        return None;
    }

    let interval = Duration::hours(interval_hours as i64);
    let mut candidate = last_run + interval;

    if allowed_weekdays.is_full() || allowed_weekdays.contains(candidate.weekday()) {
        return Some(candidate);
    }

    if interval_hours >= 24 {
        // Interval spans at least a day: advance day-by-day.
        for _ in 0..MAX_DAY_ADVANCES {
            candidate += Duration::days(1);
            if allowed_weekdays.contains(candidate.weekday()) {
                return Some(candidate);
            }
        }
        None
    } else {
        // Sub-day interval: keep adding the interval itself.
        for _ in 0..MAX_INTERVAL_ADVANCES {
            candidate += interval;
            if allowed_weekdays.contains(candidate.weekday()) {
                return Some(candidate);
            }
        }
        None
    }
}
