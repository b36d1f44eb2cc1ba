use crate::monitoring::SweepStatistics;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all cron-server metrics
const PREFIX: &str = "backmon_cron";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref TASK_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_task_runs_total"), "Total task executions"),
        &["task", "status"]
    ).expect("Failed to create task_runs_total metric");

    pub static ref TASK_RUN_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_task_run_duration_seconds"),
            "Task execution duration in seconds"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        &["task"]
    ).expect("Failed to create task_run_duration_seconds metric");

    pub static ref OVERDUE_JOBS: Gauge = Gauge::new(
        format!("{PREFIX}_overdue_jobs"),
        "Overdue backup jobs found by the most recent sweep"
    ).expect("Failed to create overdue_jobs metric");

    pub static ref OVERDUE_NOTIFICATIONS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_overdue_notifications_total"),
        "Total overdue alerts handed to the delivery collaborator"
    ).expect("Failed to create overdue_notifications_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(TASK_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TASK_RUN_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(OVERDUE_JOBS.clone()));
    let _ = REGISTRY.register(Box::new(OVERDUE_NOTIFICATIONS_TOTAL.clone()));
}

/// Record one task execution outcome.
pub fn record_task_execution(task: &str, status: &str, elapsed: Duration) {
    TASK_RUNS_TOTAL.with_label_values(&[task, status]).inc();
    TASK_RUN_DURATION_SECONDS
        .with_label_values(&[task])
        .observe(elapsed.as_secs_f64());
}

/// Record the outcome of one overdue sweep.
pub fn record_sweep(stats: &SweepStatistics) {
    OVERDUE_JOBS.set(stats.overdue_jobs_found as f64);
    OVERDUE_NOTIFICATIONS_TOTAL.inc_by(stats.notifications_sent as f64);
}

/// Prometheus text exposition endpoint.
pub async fn serve_metrics() -> Response {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = TextEncoder::new().encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {err}"),
        )
            .into_response();
    }
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        buffer,
    )
        .into_response()
}
