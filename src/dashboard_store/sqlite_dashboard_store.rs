use super::{BackupHistory, ConfigSource, TaskSettings};
use crate::monitoring::{BackupJobConfig, JobKey, WeekdaySet};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Configuration document keys in the dashboard's `configurations` table.
const BACKUP_SETTINGS_KEY: &str = "backup_settings";
const CRON_SERVICE_KEY: &str = "cron_service";
const RETENTION_DAYS_KEY: &str = "retention_days";

/// JSON shape of one entry in the `backup_settings` document, keyed by
/// `server_id:backup_name`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBackupSetting {
    expected_interval_hours: Option<u32>,
    allowed_weekdays: Option<Vec<u8>>,
    #[serde(default)]
    monitoring_enabled: bool,
}

/// JSON shape of the `cron_service` document.
#[derive(Debug, Deserialize)]
struct RawCronConfig {
    #[serde(default)]
    tasks: HashMap<String, RawTaskSetting>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTaskSetting {
    cron_expression: String,
    #[serde(default)]
    enabled: bool,
}

/// Read adapter over the dashboard application's SQLite database.
///
/// The dashboard owns this database and its schema; the adapter only reads
/// the `configurations` key/value table and the `backup_runs` log (and
/// deletes from the latter for retention pruning).
pub struct SqliteDashboardStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDashboardStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .context("Failed to open dashboard database")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn get_configuration(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM configurations WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read configuration {:?}", key))?;
        Ok(value)
    }
}

impl ConfigSource for SqliteDashboardStore {
    fn backup_job_configs(&self) -> Result<HashMap<JobKey, BackupJobConfig>> {
        let Some(json) = self.get_configuration(BACKUP_SETTINGS_KEY)? else {
            return Ok(HashMap::new());
        };

        let raw: HashMap<String, RawBackupSetting> = serde_json::from_str(&json)
            .context("Failed to parse backup_settings configuration")?;

        let mut configs = HashMap::new();
        for (key, setting) in raw {
            let Some(job) = JobKey::parse_key(&key) else {
                warn!("Ignoring malformed backup settings key {:?}", key);
                continue;
            };
            let Some(expected_interval_hours) = setting.expected_interval_hours else {
                warn!("Ignoring backup settings for {} without an interval", job);
                continue;
            };
            let allowed_weekdays = match setting.allowed_weekdays {
                Some(days) => WeekdaySet::from_days(days),
                None => WeekdaySet::ALL,
            };
            configs.insert(
                job,
                BackupJobConfig {
                    expected_interval_hours,
                    allowed_weekdays,
                    monitoring_enabled: setting.monitoring_enabled,
                },
            );
        }
        Ok(configs)
    }

    fn scheduler_tasks(&self) -> Result<Vec<TaskSettings>> {
        let Some(json) = self.get_configuration(CRON_SERVICE_KEY)? else {
            return Ok(Vec::new());
        };

        let raw: RawCronConfig =
            serde_json::from_str(&json).context("Failed to parse cron_service configuration")?;

        let mut tasks: Vec<TaskSettings> = raw
            .tasks
            .into_iter()
            .map(|(name, setting)| TaskSettings {
                name,
                cron_expression: setting.cron_expression,
                enabled: setting.enabled,
            })
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tasks)
    }

    fn retention_days(&self) -> Result<u32> {
        let Some(value) = self.get_configuration(RETENTION_DAYS_KEY)? else {
            return Ok(0);
        };
        value
            .trim()
            .parse()
            .with_context(|| format!("Invalid retention_days configuration {:?}", value))
    }
}

impl BackupHistory for SqliteDashboardStore {
    fn last_run_at(&self, job: &JobKey) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT finished_at FROM backup_runs
                 WHERE server_id = ?1 AND backup_name = ?2 AND status = 'success'
                 ORDER BY datetime(finished_at) DESC LIMIT 1",
                params![job.server_id, job.backup_name],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read backup history for {}", job))?;

        match raw {
            Some(timestamp) => {
                let parsed = DateTime::parse_from_rfc3339(&timestamp)
                    .map(|dt| dt.with_timezone(&Utc))
                    .with_context(|| {
                        format!("Invalid run timestamp {:?} for {}", timestamp, job)
                    })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    fn prune_runs_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute(
                "DELETE FROM backup_runs WHERE datetime(finished_at) < datetime(?1)",
                params![cutoff.to_rfc3339()],
            )
            .context("Failed to prune backup run history")?;
        Ok(deleted)
    }
}
