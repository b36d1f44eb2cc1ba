mod file_config;

pub use file_config::FileConfig;

use crate::dashboard_store::{ConfigSource, TaskSettings};
use anyhow::{bail, Result};
use std::path::PathBuf;

/// Default schedules, matching the dashboard's stock configuration: the
/// overdue sweep every twenty minutes, history pruning nightly.
pub const DEFAULT_OVERDUE_CRON: &str = "0,20,40 * * * *";
pub const DEFAULT_CLEANUP_CRON: &str = "10 3 * * *";

/// CLI arguments that participate in config resolution.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub dashboard_db: Option<PathBuf>,
    pub alerts_db: Option<PathBuf>,
    pub port: u16,
    pub webhook_url: Option<String>,
    pub webhook_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub dashboard_db: PathBuf,
    pub alerts_db: PathBuf,
    pub port: u16,
    pub webhook_url: Option<String>,
    pub webhook_timeout_sec: u64,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file
    /// config. TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let dashboard_db = file
            .dashboard_db
            .map(PathBuf::from)
            .or_else(|| cli.dashboard_db.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("dashboard_db must be specified on the CLI or in the config file")
            })?;

        if !dashboard_db.exists() {
            bail!("Dashboard database does not exist: {:?}", dashboard_db);
        }

        let alerts_db = file
            .alerts_db
            .map(PathBuf::from)
            .or_else(|| cli.alerts_db.clone())
            .unwrap_or_else(|| {
                dashboard_db
                    .parent()
                    .map(|dir| dir.join("overdue-alerts.db"))
                    .unwrap_or_else(|| PathBuf::from("overdue-alerts.db"))
            });

        let port = file.port.unwrap_or(cli.port);
        let webhook_url = file.webhook_url.or_else(|| cli.webhook_url.clone());
        let webhook_timeout_sec = file.webhook_timeout_sec.unwrap_or(cli.webhook_timeout_sec);

        Ok(Self {
            dashboard_db,
            alerts_db,
            port,
            webhook_url,
            webhook_timeout_sec,
        })
    }
}

/// Compiled-in task settings used when the configuration store has nothing.
pub fn default_task_settings() -> Vec<TaskSettings> {
    vec![
        TaskSettings {
            name: "overdue-check".to_string(),
            cron_expression: DEFAULT_OVERDUE_CRON.to_string(),
            enabled: true,
        },
        TaskSettings {
            name: "retention-cleanup".to_string(),
            cron_expression: DEFAULT_CLEANUP_CRON.to_string(),
            enabled: true,
        },
    ]
}

/// Stored task settings merged over the defaults: every default task exists,
/// stored entries override it, and extra stored tasks are kept.
pub fn effective_task_settings(source: &dyn ConfigSource) -> Result<Vec<TaskSettings>> {
    let stored = source.scheduler_tasks()?;
    let mut merged = default_task_settings();
    for setting in stored {
        match merged.iter_mut().find(|m| m.name == setting.name) {
            Some(existing) => *existing = setting,
            None => merged.push(setting),
        }
    }
    Ok(merged)
}
