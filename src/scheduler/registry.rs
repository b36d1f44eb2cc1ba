use super::executor::TaskExecutor;
use super::task::{
    RegistryError, ScheduleExpression, TaskDescriptor, TaskExecutionResult, TaskHandler, TaskSet,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Snapshot of one task's state for status reporting. Detached from the
/// registry; mutating it has no effect on internal state.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub name: String,
    pub running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct LiveTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct RegistryInner {
    descriptors: HashMap<String, TaskDescriptor>,
    live: HashMap<String, LiveTask>,
}

/// Authoritative mapping of task name to live scheduled timer.
///
/// All lifecycle operations go through here; handlers never touch ambient
/// global state. Invariant: at most one live timer exists per task name, and
/// `reload_all` fully drains the old timer set before arming the new one.
pub struct TaskRegistry {
    inner: Mutex<RegistryInner>,
    handlers: TaskSet,
    executor: TaskExecutor,
}

impl TaskRegistry {
    pub fn new(handlers: TaskSet, executor: TaskExecutor) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                descriptors: HashMap::new(),
                live: HashMap::new(),
            }),
            handlers,
            executor,
        }
    }

    /// Validate the descriptor's schedule and arm its timer.
    ///
    /// Registering a name that is already live replaces the old timer after
    /// draining it, so the one-timer-per-name invariant holds.
    pub async fn register(&self, descriptor: TaskDescriptor) -> Result<(), RegistryError> {
        let schedule = ScheduleExpression::parse(&descriptor.cron_expression)?;
        let mut inner = self.inner.lock().await;
        let name = descriptor.name().to_string();

        if let Some(live) = inner.live.remove(&name) {
            drain(live).await;
        }

        info!(
            "Registering task {} (cron: {})",
            name,
            schedule.as_str()
        );
        let handler = self.handlers.handler(descriptor.kind);
        let live = arm(self.executor.clone(), &name, schedule, handler);
        inner.live.insert(name.clone(), live);
        inner.descriptors.insert(name, descriptor);
        Ok(())
    }

    /// Cancel a task's timer. Safe to call on an already stopped task;
    /// errors only when the name was never registered.
    pub async fn stop(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        if !inner.descriptors.contains_key(name) {
            return Err(RegistryError::TaskNotFound(name.to_string()));
        }
        if let Some(live) = inner.live.remove(name) {
            drain(live).await;
            info!("Stopped task {}", name);
        }
        Ok(())
    }

    /// Re-arm a previously stopped task from its retained descriptor.
    /// No-op when the task is already running.
    pub async fn start(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let descriptor = inner
            .descriptors
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTask(name.to_string()))?
            .clone();

        if inner.live.contains_key(name) {
            debug!("Task {} is already running", name);
            return Ok(());
        }

        let schedule = ScheduleExpression::parse(&descriptor.cron_expression)?;
        let handler = self.handlers.handler(descriptor.kind);
        let live = arm(self.executor.clone(), name, schedule, handler);
        inner.live.insert(name.to_string(), live);
        info!("Started task {}", name);
        Ok(())
    }

    /// Atomically replace the descriptor set.
    ///
    /// Every schedule is validated before any timer is touched; then all
    /// existing timers are cancelled and drained, and the enabled subset of
    /// the new set is armed.
    pub async fn reload_all(&self, descriptors: Vec<TaskDescriptor>) -> Result<(), RegistryError> {
        let mut validated = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let schedule = ScheduleExpression::parse(&descriptor.cron_expression)?;
            validated.push((descriptor, schedule));
        }

        let mut inner = self.inner.lock().await;

        // Cancel everything first, then wait for each timer to exit, so no
        // stale timer can fire while the new set is being armed.
        let old: Vec<LiveTask> = inner.live.drain().map(|(_, live)| live).collect();
        for live in &old {
            live.cancel.cancel();
        }
        for live in old {
            let _ = live.handle.await;
        }
        inner.descriptors.clear();

        let mut enabled_count = 0;
        for (descriptor, schedule) in validated {
            let name = descriptor.name().to_string();
            // Duplicate kinds in the input collapse to the last one.
            if let Some(stale) = inner.live.remove(&name) {
                drain(stale).await;
            }
            if descriptor.enabled {
                let handler = self.handlers.handler(descriptor.kind);
                let live = arm(self.executor.clone(), &name, schedule, handler);
                inner.live.insert(name.clone(), live);
                enabled_count += 1;
            }
            inner.descriptors.insert(name, descriptor);
        }

        info!(
            "Reloaded task configuration: {} tasks, {} enabled",
            inner.descriptors.len(),
            enabled_count
        );
        Ok(())
    }

    /// Drain every live timer. Used on shutdown.
    pub async fn stop_all(&self) {
        let mut inner = self.inner.lock().await;
        let old: Vec<LiveTask> = inner.live.drain().map(|(_, live)| live).collect();
        for live in &old {
            live.cancel.cancel();
        }
        for live in old {
            let _ = live.handle.await;
        }
    }

    /// Run a task immediately, outside its schedule. Shares the executor
    /// (and therefore run bookkeeping) with the scheduled tick path.
    pub async fn trigger(&self, name: &str) -> Result<TaskExecutionResult, RegistryError> {
        let handler = {
            let inner = self.inner.lock().await;
            let descriptor = inner
                .descriptors
                .get(name)
                .ok_or_else(|| RegistryError::UnknownTask(name.to_string()))?;
            self.handlers.handler(descriptor.kind)
        };
        Ok(self.executor.execute(name, handler).await)
    }

    /// Status snapshot for every known task, sorted by name.
    pub async fn status(&self) -> Vec<TaskStatus> {
        let records = self.executor.run_records().await;
        let inner = self.inner.lock().await;

        let mut statuses: Vec<TaskStatus> = inner
            .descriptors
            .keys()
            .map(|name| {
                let record = records.get(name);
                TaskStatus {
                    name: name.clone(),
                    running: inner.live.contains_key(name),
                    last_run_at: record.map(|r| r.last_run_at),
                    last_error: record.and_then(|r| r.last_error.clone()),
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

async fn drain(live: LiveTask) {
    live.cancel.cancel();
    let _ = live.handle.await;
}

fn arm(
    executor: TaskExecutor,
    name: &str,
    schedule: ScheduleExpression,
    handler: Arc<dyn TaskHandler>,
) -> LiveTask {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task_name = name.to_string();

    let handle = tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let Some(next) = schedule.next_after(now) else {
                warn!(
                    "Schedule {:?} for task {} has no future occurrence, disarming",
                    schedule.as_str(),
                    task_name
                );
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!("Task {} sleeping {:?} until next tick", task_name, wait);

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {
                    executor.execute(&task_name, Arc::clone(&handler)).await;
                }
            }
        }
    });

    LiveTask { cancel, handle }
}
