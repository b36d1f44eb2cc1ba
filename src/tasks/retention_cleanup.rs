use crate::dashboard_store::{BackupHistory, ConfigSource};
use crate::scheduler::{TaskHandler, TaskOutcome};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Prunes backup-run history older than the configured retention window.
pub struct RetentionCleanupTask {
    config_source: Arc<dyn ConfigSource>,
    history: Arc<dyn BackupHistory>,
}

impl RetentionCleanupTask {
    pub fn new(config_source: Arc<dyn ConfigSource>, history: Arc<dyn BackupHistory>) -> Self {
        Self {
            config_source,
            history,
        }
    }
}

#[async_trait]
impl TaskHandler for RetentionCleanupTask {
    async fn run(&self) -> Result<TaskOutcome> {
        let retention_days = self.config_source.retention_days()?;
        if retention_days == 0 {
            debug!("Run history pruning is disabled");
            return Ok(TaskOutcome {
                message: "Run history pruning is disabled".to_string(),
                statistics: Some(json!({"retentionDays": 0, "prunedRuns": 0})),
            });
        }

        let cutoff = Utc::now() - Duration::days(retention_days as i64);
        let pruned = self.history.prune_runs_before(cutoff)?;

        if pruned > 0 {
            info!(
                "Pruned {} backup runs older than {} days",
                pruned, retention_days
            );
        } else {
            debug!("No backup runs older than {} days", retention_days);
        }

        Ok(TaskOutcome {
            message: "Run history pruning completed".to_string(),
            statistics: Some(json!({
                "retentionDays": retention_days,
                "prunedRuns": pruned,
            })),
        })
    }
}
