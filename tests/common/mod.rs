//! Test server lifecycle management.
//!
//! Each test gets an isolated server with its own dashboard and alert
//! databases, plus a recording transport capturing delivered alerts.

use anyhow::Result;
use async_trait::async_trait;
use backmon_cron_server::config::effective_task_settings;
use backmon_cron_server::notify::{AlertTransport, OverdueAlert};
use backmon_cron_server::scheduler::{TaskExecutor, TaskRegistry, TaskSet};
use backmon_cron_server::server::{make_app, ServerState};
use backmon_cron_server::tasks::{
    descriptors_from_settings, OverdueCheckTask, RetentionCleanupTask,
};
use backmon_cron_server::{
    BackupHistory, ConfigSource, OverdueMonitor, SqliteAlertStore, SqliteDashboardStore,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

const SERVER_READY_TIMEOUT_MS: u64 = 5000;
const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// Transport that records every alert instead of delivering it.
pub struct RecordingTransport {
    pub sent: Mutex<Vec<OverdueAlert>>,
}

#[async_trait]
impl AlertTransport for RecordingTransport {
    async fn send_overdue_alert(&self, alert: &OverdueAlert) -> Result<()> {
        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Test server instance with isolated databases.
///
/// When dropped, the server gracefully shuts down and temp resources are
/// cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Path to the dashboard database for direct seeding in tests.
    pub dashboard_db_path: PathBuf,

    /// Alerts captured by the recording transport.
    pub transport: Arc<RecordingTransport>,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a test server on a random port with empty dashboard tables.
    pub async fn spawn() -> Self {
        backmon_cron_server::server::metrics::init_metrics();

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let dashboard_db_path = temp_dir.path().join("dashboard.db");
        let alerts_db_path = temp_dir.path().join("overdue-alerts.db");

        create_dashboard_schema(&dashboard_db_path);
        seed_quiet_task_schedules(&dashboard_db_path);

        let dashboard = Arc::new(
            SqliteDashboardStore::new(&dashboard_db_path).expect("Failed to open dashboard store"),
        );
        let config_source: Arc<dyn ConfigSource> = dashboard.clone();
        let history: Arc<dyn BackupHistory> = dashboard.clone();

        let alert_store =
            Arc::new(SqliteAlertStore::new(&alerts_db_path).expect("Failed to open alert store"));

        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(Vec::new()),
        });

        let monitor = Arc::new(OverdueMonitor::new(
            config_source.clone(),
            history.clone(),
            alert_store.clone(),
            transport.clone(),
        ));

        let handlers = TaskSet::new(
            Arc::new(OverdueCheckTask::new(monitor)),
            Arc::new(RetentionCleanupTask::new(
                config_source.clone(),
                history.clone(),
            )),
        );
        let registry = Arc::new(TaskRegistry::new(handlers, TaskExecutor::new()));

        let settings =
            effective_task_settings(config_source.as_ref()).expect("Failed to load task settings");
        registry
            .reload_all(descriptors_from_settings(&settings))
            .await
            .expect("Failed to register tasks");

        let initial_job_configs = config_source
            .backup_job_configs()
            .expect("Failed to read job configs");
        let state = ServerState::new(registry, config_source, alert_store, initial_job_configs);

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = make_app(state);
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            dashboard_db_path,
            transport,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;
        server
    }

    /// Store a configuration document in the dashboard database.
    pub fn set_configuration(&self, key: &str, value: &str) {
        let conn = Connection::open(&self.dashboard_db_path).unwrap();
        conn.execute(
            "INSERT INTO configurations (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .unwrap();
    }

    /// Insert one backup run into the history log.
    pub fn insert_backup_run(
        &self,
        server_id: &str,
        backup_name: &str,
        status: &str,
        finished_at: DateTime<Utc>,
    ) {
        let conn = Connection::open(&self.dashboard_db_path).unwrap();
        conn.execute(
            "INSERT INTO backup_runs (server_id, backup_name, status, finished_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![server_id, backup_name, status, finished_at.to_rfc3339()],
        )
        .unwrap();
    }

    pub fn sent_alert_count(&self) -> usize {
        self.transport.sent.lock().unwrap().len()
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Schedule both tasks for Feb 29 so scheduled ticks can never race the
/// manual triggers these tests drive.
fn seed_quiet_task_schedules(path: &PathBuf) {
    let conn = Connection::open(path).unwrap();
    conn.execute(
        "INSERT INTO configurations (key, value) VALUES ('cron_service', ?1)",
        params![r#"{"tasks": {
            "overdue-check": {"cronExpression": "0 0 29 2 *", "enabled": true},
            "retention-cleanup": {"cronExpression": "0 0 29 2 *", "enabled": true}
        }}"#],
    )
    .unwrap();
}

fn create_dashboard_schema(path: &PathBuf) {
    let conn = Connection::open(path).expect("Failed to create dashboard db");
    conn.execute(
        "CREATE TABLE configurations (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )
    .unwrap();
    conn.execute(
        "CREATE TABLE backup_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_id TEXT NOT NULL,
            backup_name TEXT NOT NULL,
            status TEXT NOT NULL,
            finished_at TEXT NOT NULL
        )",
        [],
    )
    .unwrap();
}
