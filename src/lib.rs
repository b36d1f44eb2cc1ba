//! Backmon Cron Server Library
//!
//! Recurring-task scheduler and backup-overdue detection engine for the
//! backmon dashboard. This library exposes the internal modules for testing
//! and potential reuse.

pub mod alert_store;
pub mod config;
pub mod dashboard_store;
pub mod monitoring;
pub mod notify;
pub mod scheduler;
pub mod server;
pub mod sqlite_persistence;
pub mod tasks;

// Re-export commonly used types for convenience
pub use alert_store::{AlertRecord, AlertStore, SqliteAlertStore};
pub use dashboard_store::{BackupHistory, ConfigSource, SqliteDashboardStore, TaskSettings};
pub use monitoring::{BackupJobConfig, JobKey, OverdueMonitor, SweepStatistics, WeekdaySet};
pub use notify::{AlertTransport, OverdueAlert};
pub use scheduler::{TaskExecutor, TaskRegistry};
pub use server::{make_app, run_server, ServerState};
