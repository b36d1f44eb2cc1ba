//! Concrete task handlers bound into the scheduler.

mod overdue_check;
mod retention_cleanup;

pub use overdue_check::OverdueCheckTask;
pub use retention_cleanup::RetentionCleanupTask;

use crate::dashboard_store::TaskSettings;
use crate::scheduler::{TaskDescriptor, TaskKind};
use tracing::warn;

/// Map stored task settings to descriptors, dropping names this service
/// does not know.
pub fn descriptors_from_settings(settings: &[TaskSettings]) -> Vec<TaskDescriptor> {
    settings
        .iter()
        .filter_map(|setting| match TaskKind::parse(&setting.name) {
            Some(kind) => Some(TaskDescriptor::new(
                kind,
                setting.cron_expression.clone(),
                setting.enabled,
            )),
            None => {
                warn!("Ignoring unknown task {:?} in configuration", setting.name);
                None
            }
        })
        .collect()
}
