use anyhow::{Context, Result};
use backmon_cron_server::config::{effective_task_settings, AppConfig, CliConfig, FileConfig};
use backmon_cron_server::dashboard_store::{BackupHistory, ConfigSource};
use backmon_cron_server::notify::{AlertTransport, LogAlertTransport, WebhookAlertTransport};
use backmon_cron_server::scheduler::{TaskExecutor, TaskRegistry, TaskSet};
use backmon_cron_server::server::{metrics, run_server, ServerState};
use backmon_cron_server::tasks::{
    descriptors_from_settings, OverdueCheckTask, RetentionCleanupTask,
};
use backmon_cron_server::{OverdueMonitor, SqliteAlertStore, SqliteDashboardStore};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the dashboard's SQLite database (configuration and run history).
    pub dashboard_db: Option<PathBuf>,

    /// Path to the SQLite database holding alert dedup state.
    /// Defaults to overdue-alerts.db next to the dashboard database.
    #[clap(long)]
    pub alerts_db: Option<PathBuf>,

    /// The port for the control surface.
    #[clap(short, long, default_value_t = 9667)]
    pub port: u16,

    /// URL overdue alerts are POSTed to. Alerts are only logged when unset.
    #[clap(long)]
    pub webhook_url: Option<String>,

    /// Timeout in seconds for alert delivery requests.
    #[clap(long, default_value_t = 10)]
    pub webhook_timeout_sec: u64,

    /// Path to an optional TOML config file. Its values override CLI args.
    #[clap(long)]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        dashboard_db: cli_args.dashboard_db,
        alerts_db: cli_args.alerts_db,
        port: cli_args.port,
        webhook_url: cli_args.webhook_url,
        webhook_timeout_sec: cli_args.webhook_timeout_sec,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    metrics::init_metrics();

    info!("Opening dashboard database at {:?}...", config.dashboard_db);
    let dashboard = Arc::new(SqliteDashboardStore::new(&config.dashboard_db)?);
    let config_source: Arc<dyn ConfigSource> = dashboard.clone();
    let history: Arc<dyn BackupHistory> = dashboard.clone();

    info!("Opening alert database at {:?}...", config.alerts_db);
    let alert_store = Arc::new(SqliteAlertStore::new(&config.alerts_db)?);

    let transport: Arc<dyn AlertTransport> = match &config.webhook_url {
        Some(url) => {
            info!("Delivering overdue alerts to {}", url);
            Arc::new(WebhookAlertTransport::new(
                url.clone(),
                config.webhook_timeout_sec,
            )?)
        }
        None => {
            warn!("No webhook URL configured, overdue alerts will only be logged");
            Arc::new(LogAlertTransport)
        }
    };

    let monitor = Arc::new(OverdueMonitor::new(
        config_source.clone(),
        history.clone(),
        alert_store.clone(),
        transport,
    ));

    let handlers = TaskSet::new(
        Arc::new(OverdueCheckTask::new(monitor)),
        Arc::new(RetentionCleanupTask::new(
            config_source.clone(),
            history.clone(),
        )),
    );
    let registry = Arc::new(TaskRegistry::new(handlers, TaskExecutor::new()));

    let settings = effective_task_settings(config_source.as_ref())
        .context("Failed to load task configuration")?;
    registry
        .reload_all(descriptors_from_settings(&settings))
        .await
        .context("Failed to register tasks")?;

    let initial_job_configs = match config_source.backup_job_configs() {
        Ok(configs) => configs,
        Err(err) => {
            warn!("Failed to read backup job configs at startup: {:#}", err);
            Default::default()
        }
    };

    let state = ServerState::new(
        registry.clone(),
        config_source,
        alert_store,
        initial_job_configs,
    );

    run_server(state, config.port).await?;

    info!("Stopping scheduled tasks...");
    registry.stop_all().await;
    info!("Cron server stopped");
    Ok(())
}
