//! Overdue backup monitoring.
//!
//! This module decides which configured backup jobs are overdue and which of
//! those need a new alert, deduplicating alerts per overdue occurrence.

mod due_time;
mod engine;
mod models;

pub use due_time::next_expected_run;
pub use engine::OverdueMonitor;
pub use models::{BackupJobConfig, JobKey, SweepStatistics, WeekdaySet};
