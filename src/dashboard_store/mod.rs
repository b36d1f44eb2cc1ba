//! Collaborator interfaces to the dashboard's data.
//!
//! The configuration store and the backup-run history are owned by the
//! dashboard application; this service only consumes them. The traits below
//! are the consumption contract, and [`SqliteDashboardStore`] is the adapter
//! that reads them straight out of the dashboard's SQLite database.

mod sqlite_dashboard_store;

pub use sqlite_dashboard_store::SqliteDashboardStore;

use crate::monitoring::{BackupJobConfig, JobKey};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Per-task scheduler configuration, editable through the dashboard UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub name: String,
    pub cron_expression: String,
    pub enabled: bool,
}

/// Read access to operator-owned configuration.
pub trait ConfigSource: Send + Sync {
    /// Monitoring expectations for every configured backup job.
    fn backup_job_configs(&self) -> Result<HashMap<JobKey, BackupJobConfig>>;

    /// Scheduler task settings stored by the dashboard. May be empty when
    /// the operator never saved any; callers fall back to defaults then.
    fn scheduler_tasks(&self) -> Result<Vec<TaskSettings>>;

    /// Days of backup-run history to keep. Zero disables pruning.
    fn retention_days(&self) -> Result<u32>;
}

/// Read access to the backup-run history log, plus the one write the
/// retention task needs.
pub trait BackupHistory: Send + Sync {
    /// Timestamp of the most recent successful run of a job, if any.
    fn last_run_at(&self, job: &JobKey) -> Result<Option<DateTime<Utc>>>;

    /// Delete run history older than the cutoff. Returns deleted row count.
    fn prune_runs_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
