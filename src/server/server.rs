use super::metrics;
use super::state::ServerState;
use crate::config::effective_task_settings;
use crate::scheduler::RegistryError;
use crate::tasks::descriptors_from_settings;
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthStatus {
    is_running: bool,
    active_tasks: Vec<String>,
    last_run_times: BTreeMap<String, String>,
    errors: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn registry_error_response(err: RegistryError) -> Response {
    let status = match err {
        RegistryError::TaskNotFound(_) | RegistryError::UnknownTask(_) => StatusCode::NOT_FOUND,
        RegistryError::InvalidSchedule { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err)
}

async fn health(State(state): State<ServerState>) -> Json<HealthStatus> {
    let mut active_tasks = Vec::new();
    let mut last_run_times = BTreeMap::new();
    let mut errors = BTreeMap::new();

    for task in state.registry.status().await {
        if task.running {
            active_tasks.push(task.name.clone());
        }
        if let Some(last_run_at) = task.last_run_at {
            last_run_times.insert(task.name.clone(), last_run_at.to_rfc3339());
        }
        if let Some(last_error) = task.last_error {
            errors.insert(task.name, last_error);
        }
    }

    Json(HealthStatus {
        is_running: true,
        active_tasks,
        last_run_times,
        errors,
    })
}

async fn trigger_task(
    State(state): State<ServerState>,
    Path(task_name): Path<String>,
) -> Response {
    match state.registry.trigger(&task_name).await {
        Ok(result) if result.success => Json(result).into_response(),
        Ok(result) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            result
                .error
                .unwrap_or_else(|| "Task execution failed".to_string()),
        ),
        Err(err) => registry_error_response(err),
    }
}

async fn stop_task(State(state): State<ServerState>, Path(task_name): Path<String>) -> Response {
    match state.registry.stop(&task_name).await {
        Ok(()) => Json(MessageResponse {
            message: format!("Task {task_name} stopped"),
        })
        .into_response(),
        Err(err) => registry_error_response(err),
    }
}

async fn start_task(State(state): State<ServerState>, Path(task_name): Path<String>) -> Response {
    match state.registry.start(&task_name).await {
        Ok(()) => Json(MessageResponse {
            message: format!("Task {task_name} started"),
        })
        .into_response(),
        Err(err) => registry_error_response(err),
    }
}

/// Rebuild the task set from fresh configuration and invalidate alert
/// records made stale by backup-setting edits. This is the endpoint the
/// dashboard's settings write path calls after every save.
async fn reload_config(State(state): State<ServerState>) -> Response {
    let settings = match effective_task_settings(state.config_source.as_ref()) {
        Ok(settings) => settings,
        Err(err) => {
            error!("Reload failed reading task settings: {:#}", err);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"));
        }
    };

    if let Err(err) = state
        .registry
        .reload_all(descriptors_from_settings(&settings))
        .await
    {
        error!("Reload failed rebuilding tasks: {}", err);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, err);
    }

    let new_configs = match state.config_source.backup_job_configs() {
        Ok(configs) => configs,
        Err(err) => {
            error!("Reload failed reading backup job configs: {:#}", err);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"));
        }
    };

    {
        let mut snapshot = state.job_configs.write().await;
        match state
            .alert_store
            .invalidate_on_config_change(&snapshot, &new_configs)
        {
            Ok(cleared) if cleared > 0 => {
                info!(
                    "Cleared {} stale alert records after configuration change",
                    cleared
                );
            }
            Ok(_) => {}
            Err(err) => {
                error!("Reload failed invalidating alert records: {:#}", err);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"));
            }
        }
        *snapshot = new_configs;
    }

    Json(MessageResponse {
        message: "Configuration reloaded".to_string(),
    })
    .into_response()
}

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/trigger/{task_name}", post(trigger_task))
        .route("/stop/{task_name}", post(stop_task))
        .route("/start/{task_name}", post(start_task))
        .route("/reload-config", post(reload_config))
        .route("/metrics", get(metrics::serve_metrics))
        .with_state(state)
}

pub async fn run_server(state: ServerState, port: u16) -> Result<()> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    info!("Control surface listening on port {}", port);

    axum::serve(listener, make_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        return;
    }
    info!("Shutdown signal received");
}
