//! SQLite schema for the alert dedup database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

/// Overdue alerts table - one row per job currently overdue and notified
const OVERDUE_ALERTS_TABLE_V1: Table = Table {
    name: "overdue_alerts",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("server_id", &SqlType::Text, non_null = true),
        sqlite_column!("backup_name", &SqlType::Text, non_null = true),
        sqlite_column!("expected_due_at", &SqlType::Text, non_null = true),
        sqlite_column!("notified_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["server_id", "backup_name"]],
};

/// All versioned schemas for the alert database.
///
/// Version 1: overdue alerts table
pub const ALERTS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[OVERDUE_ALERTS_TABLE_V1],
    migration: None, // Initial version has no migration
}];
