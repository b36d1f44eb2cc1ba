use chrono::Weekday;
use serde::Serialize;
use std::fmt;

/// Identity of one recurring backup definition.
///
/// Stable across all historical runs of the job. The dashboard stores these
/// as `server_id:backup_name` composite keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub server_id: String,
    pub backup_name: String,
}

impl JobKey {
    pub fn new<S: Into<String>, B: Into<String>>(server_id: S, backup_name: B) -> Self {
        Self {
            server_id: server_id.into(),
            backup_name: backup_name.into(),
        }
    }

    /// Parse a `server_id:backup_name` composite key. Returns `None` when
    /// either half is missing or empty.
    pub fn parse_key(key: &str) -> Option<Self> {
        let (server_id, backup_name) = key.split_once(':')?;
        if server_id.is_empty() || backup_name.is_empty() {
            return None;
        }
        Some(Self::new(server_id, backup_name))
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server_id, self.backup_name)
    }
}

/// Set of weekdays a backup job is expected to run on.
///
/// Days are numbered 0..=6 with Sunday as day 0, matching the dashboard's
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const ALL: WeekdaySet = WeekdaySet(0b0111_1111);
    pub const EMPTY: WeekdaySet = WeekdaySet(0);

    /// Build a set from day numbers. Out-of-range values are ignored.
    pub fn from_days<I: IntoIterator<Item = u8>>(days: I) -> Self {
        let mut bits = 0u8;
        for day in days {
            if day <= 6 {
                bits |= 1 << day;
            }
        }
        WeekdaySet(bits)
    }

    pub fn contains_day(&self, day: u8) -> bool {
        day <= 6 && self.0 & (1 << day) != 0
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.contains_day(weekday.num_days_from_sunday() as u8)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_full(&self) -> bool {
        self.0 == Self::ALL.0
    }

    pub fn days(&self) -> Vec<u8> {
        (0..=6).filter(|day| self.contains_day(*day)).collect()
    }
}

impl Default for WeekdaySet {
    fn default() -> Self {
        Self::ALL
    }
}

/// Per-job monitoring expectations, owned by the configuration collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupJobConfig {
    pub expected_interval_hours: u32,
    pub allowed_weekdays: WeekdaySet,
    pub monitoring_enabled: bool,
}

/// Aggregate counters returned by one overdue sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepStatistics {
    pub checked_jobs: u64,
    pub overdue_jobs_found: u64,
    pub notifications_sent: u64,
}
