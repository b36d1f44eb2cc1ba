use super::task::{TaskExecutionResult, TaskHandler, TaskRunRecord};
use crate::server::metrics;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Runs one task with error isolation and run bookkeeping.
///
/// A failing (or panicking) handler never propagates past the executor: the
/// failure is captured, stored as the task's `last_error`, and reported in
/// the returned result. Every invocation writes exactly one run record.
#[derive(Clone, Default)]
pub struct TaskExecutor {
    run_records: Arc<RwLock<HashMap<String, TaskRunRecord>>>,
}

impl TaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn execute(
        &self,
        task_name: &str,
        handler: Arc<dyn TaskHandler>,
    ) -> TaskExecutionResult {
        debug!("Running task {}", task_name);
        let started = Instant::now();

        // Run on a separate tokio task so a panicking handler surfaces as a
        // JoinError instead of unwinding through the scheduler.
        let join = tokio::spawn(async move { handler.run().await });
        let outcome = match join.await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(err) if err.is_panic() => Err(format!("Task panicked: {err}")),
            Err(err) => Err(format!("Task aborted: {err}")),
        };
        let elapsed = started.elapsed();
        let finished_at = Utc::now();

        let (result, status_label) = match outcome {
            Ok(outcome) => {
                debug!("Task {} completed in {:?}", task_name, elapsed);
                self.write_record(task_name, TaskRunRecord {
                    last_run_at: finished_at,
                    last_error: None,
                })
                .await;
                (
                    TaskExecutionResult {
                        task_name: task_name.to_string(),
                        success: true,
                        message: Some(outcome.message),
                        error: None,
                        statistics: outcome.statistics,
                    },
                    "success",
                )
            }
            Err(error_message) => {
                error!(
                    "Task {} failed after {:?}: {}",
                    task_name, elapsed, error_message
                );
                self.write_record(task_name, TaskRunRecord {
                    last_run_at: finished_at,
                    last_error: Some(error_message.clone()),
                })
                .await;
                (
                    TaskExecutionResult {
                        task_name: task_name.to_string(),
                        success: false,
                        message: None,
                        error: Some(error_message),
                        statistics: None,
                    },
                    "failed",
                )
            }
        };

        metrics::record_task_execution(task_name, status_label, elapsed);
        result
    }

    async fn write_record(&self, task_name: &str, record: TaskRunRecord) {
        self.run_records
            .write()
            .await
            .insert(task_name.to_string(), record);
    }

    /// Snapshot of the run records, detached from internal state.
    pub async fn run_records(&self) -> HashMap<String, TaskRunRecord> {
        self.run_records.read().await.clone()
    }
}
