use super::{AlertTransport, OverdueAlert};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Forwards overdue alerts to the dashboard's notification endpoint as a
/// JSON POST. The endpoint owns templating and the actual push/email fan-out.
pub struct WebhookAlertTransport {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertTransport {
    pub fn new(url: String, timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertTransport for WebhookAlertTransport {
    async fn send_overdue_alert(&self, alert: &OverdueAlert) -> Result<()> {
        let payload = json!({
            "event": "backup_overdue",
            "serverId": alert.job.server_id,
            "backupName": alert.job.backup_name,
            "expectedDueAt": alert.expected_due_at.to_rfc3339(),
            "hoursOverdue": alert.hours_overdue,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to deliver overdue alert for {}", alert.job))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Delivery endpoint returned {} for {}",
                response.status(),
                alert.job
            );
        }
        Ok(())
    }
}
