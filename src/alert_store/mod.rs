mod schema;
mod sqlite_alert_store;

pub use schema::ALERTS_VERSIONED_SCHEMAS;
pub use sqlite_alert_store::SqliteAlertStore;

use crate::monitoring::{BackupJobConfig, JobKey};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One persisted "already alerted" marker.
///
/// A record for a job exists exactly while that job is considered overdue and
/// already notified for the current occurrence. Records are never updated in
/// place: a resolved or superseded occurrence deletes the record, and a still
/// overdue job gets a fresh one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRecord {
    pub job: JobKey,
    pub expected_due_at: DateTime<Utc>,
    pub notified_at: DateTime<Utc>,
}

/// Durable source of truth for "has this overdue occurrence been alerted".
///
/// The store outlives the process: after a restart the engine picks its
/// dedup state back up from here rather than recomputing it.
pub trait AlertStore: Send + Sync {
    fn get_alert(&self, job: &JobKey) -> Result<Option<AlertRecord>>;

    fn has_alert(&self, job: &JobKey) -> Result<bool> {
        Ok(self.get_alert(job)?.is_some())
    }

    /// Create or overwrite the record for a job.
    fn record_alert(&self, record: &AlertRecord) -> Result<()>;

    /// Delete the record for a job. Returns whether a record existed.
    /// Idempotent: deleting an absent record is not an error.
    fn clear_alert(&self, job: &JobKey) -> Result<bool>;

    /// Forget alert state made stale by a configuration change.
    ///
    /// Clears the record of every job whose expected interval or allowed
    /// weekdays changed, whose monitoring was switched off, or which
    /// disappeared from configuration entirely. Must run on every
    /// configuration save, otherwise an alert computed under the old terms
    /// would keep suppressing a legitimately new alert under the new ones.
    /// Returns the number of records cleared.
    fn invalidate_on_config_change(
        &self,
        old_configs: &HashMap<JobKey, BackupJobConfig>,
        new_configs: &HashMap<JobKey, BackupJobConfig>,
    ) -> Result<usize> {
        let mut cleared = 0;
        for (job, old_config) in old_configs {
            let stale = match new_configs.get(job) {
                None => true,
                Some(new_config) => {
                    (old_config.monitoring_enabled && !new_config.monitoring_enabled)
                        || new_config.expected_interval_hours != old_config.expected_interval_hours
                        || new_config.allowed_weekdays != old_config.allowed_weekdays
                }
            };
            if stale && self.clear_alert(job)? {
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}
