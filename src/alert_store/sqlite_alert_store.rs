use super::schema::ALERTS_VERSIONED_SCHEMAS;
use super::{AlertRecord, AlertStore};
use crate::monitoring::JobKey;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct SqliteAlertStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAlertStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open alert database")?;

        if is_new_db {
            // Fresh database - create with latest schema
            info!("Creating new alert database at {:?}", path);
            ALERTS_VERSIONED_SCHEMAS.last().unwrap().create(&conn)?;
        } else {
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION as i64;

            if db_version < 1 {
                anyhow::bail!(
                    "Alert database version {} is invalid (expected >= 1)",
                    db_version
                );
            }

            let current_schema_version = ALERTS_VERSIONED_SCHEMAS.last().unwrap().version as i64;

            let version_index = ALERTS_VERSIONED_SCHEMAS
                .iter()
                .position(|s| s.version == db_version as usize)
                .with_context(|| format!("Unknown alert database version {}", db_version))?;
            ALERTS_VERSIONED_SCHEMAS[version_index]
                .validate(&conn)
                .with_context(|| {
                    format!(
                        "Alert database schema validation failed for version {}",
                        db_version
                    )
                })?;

            if db_version < current_schema_version {
                info!(
                    "Migrating alert database from version {} to {}",
                    db_version, current_schema_version
                );
                Self::migrate_if_needed(&mut conn, db_version as usize)?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut latest_from = from_version;
        for schema in ALERTS_VERSIONED_SCHEMAS.iter().skip(from_version) {
            if schema.version > from_version {
                info!(
                    "Running alert database migration from version {} to {}",
                    latest_from, schema.version
                );
                if let Some(migration_fn) = schema.migration {
                    migration_fn(&tx).with_context(|| {
                        format!("Failed to run migration to version {}", schema.version)
                    })?;
                }
                latest_from = schema.version;
            }
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("Invalid {} timestamp in alert record: {:?}", column, raw))
    }
}

impl AlertStore for SqliteAlertStore {
    fn get_alert(&self, job: &JobKey) -> Result<Option<AlertRecord>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT expected_due_at, notified_at FROM overdue_alerts
                 WHERE server_id = ?1 AND backup_name = ?2",
                params![job.server_id, job.backup_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((expected_due_at, notified_at)) => Ok(Some(AlertRecord {
                job: job.clone(),
                expected_due_at: Self::parse_timestamp(&expected_due_at, "expected_due_at")?,
                notified_at: Self::parse_timestamp(&notified_at, "notified_at")?,
            })),
            None => Ok(None),
        }
    }

    fn record_alert(&self, record: &AlertRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO overdue_alerts (server_id, backup_name, expected_due_at, notified_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(server_id, backup_name) DO UPDATE SET
                 expected_due_at = excluded.expected_due_at,
                 notified_at = excluded.notified_at",
            params![
                record.job.server_id,
                record.job.backup_name,
                record.expected_due_at.to_rfc3339(),
                record.notified_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn clear_alert(&self, job: &JobKey) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM overdue_alerts WHERE server_id = ?1 AND backup_name = ?2",
            params![job.server_id, job.backup_name],
        )?;
        Ok(deleted > 0)
    }
}
