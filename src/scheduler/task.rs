use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// The closed set of task kinds this service schedules.
///
/// Resolved to a handler once at registration time; ticks never dispatch by
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    OverdueCheck,
    RetentionCleanup,
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::OverdueCheck => "overdue-check",
            TaskKind::RetentionCleanup => "retention-cleanup",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "overdue-check" => Some(TaskKind::OverdueCheck),
            "retention-cleanup" => Some(TaskKind::RetentionCleanup),
            _ => None,
        }
    }
}

/// Errors surfaced by registry lifecycle operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid schedule expression {expression:?}: {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// The name was never part of the registered task set.
    #[error("Task {0:?} not found")]
    TaskNotFound(String),

    /// The name is not in the current descriptor set.
    #[error("Task {0:?} not found in configuration")]
    UnknownTask(String),
}

/// A validated cron schedule.
///
/// The expression is treated as an opaque value type; recurrence semantics
/// come from the `cron` crate. Five-field expressions (the dashboard's
/// format) are normalized to the crate's six-field form by prepending a
/// seconds column.
#[derive(Debug, Clone)]
pub struct ScheduleExpression {
    expression: String,
    schedule: cron::Schedule,
}

impl ScheduleExpression {
    pub fn parse(expression: &str) -> Result<Self, RegistryError> {
        let normalized = if expression.split_whitespace().count() == 5 {
            format!("0 {expression}")
        } else {
            expression.to_string()
        };
        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|err| RegistryError::InvalidSchedule {
                expression: expression.to_string(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// Next occurrence strictly after the given instant.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// Static definition a live scheduled task is instantiated from.
///
/// Immutable once created; `reload_all` tears the whole set down and rebuilds
/// it.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    pub cron_expression: String,
    pub enabled: bool,
}

impl TaskDescriptor {
    pub fn new(kind: TaskKind, cron_expression: impl Into<String>, enabled: bool) -> Self {
        Self {
            kind,
            cron_expression: cron_expression.into(),
            enabled,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// Successful output of one task run.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub message: String,
    pub statistics: Option<serde_json::Value>,
}

/// One unit of schedulable work.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self) -> Result<TaskOutcome>;
}

/// Handlers for every task kind, resolved once when the registry is built.
pub struct TaskSet {
    overdue_check: Arc<dyn TaskHandler>,
    retention_cleanup: Arc<dyn TaskHandler>,
}

impl TaskSet {
    pub fn new(
        overdue_check: Arc<dyn TaskHandler>,
        retention_cleanup: Arc<dyn TaskHandler>,
    ) -> Self {
        Self {
            overdue_check,
            retention_cleanup,
        }
    }

    pub fn handler(&self, kind: TaskKind) -> Arc<dyn TaskHandler> {
        match kind {
            TaskKind::OverdueCheck => Arc::clone(&self.overdue_check),
            TaskKind::RetentionCleanup => Arc::clone(&self.retention_cleanup),
        }
    }
}

/// Bookkeeping for the most recent run of one task. Overwritten on every
/// run; never deleted while the process lives.
#[derive(Debug, Clone)]
pub struct TaskRunRecord {
    pub last_run_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// Observable outcome of one task invocation, shared by the scheduled tick
/// path and the manual-trigger endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionResult {
    pub task_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<serde_json::Value>,
}
