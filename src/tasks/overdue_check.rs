use crate::monitoring::OverdueMonitor;
use crate::scheduler::{TaskHandler, TaskOutcome};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Runs one overdue sweep across all configured backup jobs.
pub struct OverdueCheckTask {
    monitor: Arc<OverdueMonitor>,
}

impl OverdueCheckTask {
    pub fn new(monitor: Arc<OverdueMonitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl TaskHandler for OverdueCheckTask {
    async fn run(&self) -> Result<TaskOutcome> {
        let statistics = self.monitor.run_sweep(Utc::now()).await?;
        Ok(TaskOutcome {
            message: "Overdue backup check completed".to_string(),
            statistics: Some(serde_json::to_value(&statistics)?),
        })
    }
}
