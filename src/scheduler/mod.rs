//! Recurring-task scheduling and execution.
//!
//! The registry owns the live timers, the executor runs one task with error
//! isolation and run bookkeeping, and both the scheduled tick path and the
//! manual-trigger endpoint share the executor.

mod executor;
mod registry;
mod task;

pub use executor::TaskExecutor;
pub use registry::{TaskRegistry, TaskStatus};
pub use task::{
    RegistryError, ScheduleExpression, TaskDescriptor, TaskExecutionResult, TaskHandler, TaskKind,
    TaskOutcome, TaskRunRecord, TaskSet,
};
