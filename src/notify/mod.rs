//! Outbound alert delivery.
//!
//! The real delivery fan-out (push topics, email, per-user routing) lives in
//! the dashboard application; this service only hands it one request per
//! newly overdue occurrence.

mod webhook;

pub use webhook::WebhookAlertTransport;

use crate::monitoring::JobKey;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

/// Context handed to the delivery collaborator for one newly overdue job.
#[derive(Debug, Clone, PartialEq)]
pub struct OverdueAlert {
    pub job: JobKey,
    pub expected_due_at: DateTime<Utc>,
    pub hours_overdue: f64,
}

/// Delivery collaborator interface.
///
/// A failed send must surface as an error: the sweep then leaves the
/// occurrence unrecorded so delivery is retried on the next sweep.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn send_overdue_alert(&self, alert: &OverdueAlert) -> Result<()>;
}

/// Fallback transport used when no delivery endpoint is configured: the
/// alert is surfaced in the service log and considered delivered.
pub struct LogAlertTransport;

#[async_trait]
impl AlertTransport for LogAlertTransport {
    async fn send_overdue_alert(&self, alert: &OverdueAlert) -> Result<()> {
        info!(
            "Overdue backup {}: expected by {}, {:.1}h overdue (no delivery endpoint configured)",
            alert.job,
            alert.expected_due_at.to_rfc3339(),
            alert.hours_overdue
        );
        Ok(())
    }
}
