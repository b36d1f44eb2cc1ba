use super::due_time::next_expected_run;
use super::models::{JobKey, SweepStatistics};
use crate::alert_store::{AlertRecord, AlertStore};
use crate::dashboard_store::{BackupHistory, ConfigSource};
use crate::notify::{AlertTransport, OverdueAlert};
use crate::server::metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decides which configured backup jobs are overdue and alerts each overdue
/// occurrence at most once.
///
/// The monitor itself is stateless between sweeps; the alert store carries
/// the dedup state and survives process restarts.
pub struct OverdueMonitor {
    config_source: Arc<dyn ConfigSource>,
    history: Arc<dyn BackupHistory>,
    alert_store: Arc<dyn AlertStore>,
    transport: Arc<dyn AlertTransport>,
}

impl OverdueMonitor {
    pub fn new(
        config_source: Arc<dyn ConfigSource>,
        history: Arc<dyn BackupHistory>,
        alert_store: Arc<dyn AlertStore>,
        transport: Arc<dyn AlertTransport>,
    ) -> Self {
        Self {
            config_source,
            history,
            alert_store,
            transport,
        }
    }

    /// Evaluate every configured backup job against `now`.
    ///
    /// Per-job failures (history read, alert store, delivery) skip only that
    /// job; the rest of the sweep continues.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> anyhow::Result<SweepStatistics> {
        let configs = self.config_source.backup_job_configs()?;
        let mut stats = SweepStatistics::default();

        for (job, config) in &configs {
            if !config.monitoring_enabled {
                continue;
            }
            if config.expected_interval_hours == 0 {
                warn!("Skipping {}: expected interval is not set", job);
                continue;
            }

            let last_run = match self.history.last_run_at(job) {
                Ok(Some(timestamp)) => timestamp,
                Ok(None) => continue, // nothing to compare against yet
                Err(err) => {
                    warn!("Skipping {}: failed to read backup history: {:#}", job, err);
                    continue;
                }
            };

            stats.checked_jobs += 1;

            let due = next_expected_run(
                last_run,
                config.expected_interval_hours,
                config.allowed_weekdays,
            );

            match due {
                Some(due_at) if now > due_at => {
                    stats.overdue_jobs_found += 1;
                    if let Err(err) = self.handle_overdue(job, due_at, now, &mut stats).await {
                        warn!("Skipping {}: {:#}", job, err);
                    }
                }
                _ => {
                    // Not overdue (or excluded by an empty weekday set): the
                    // current occurrence, if any, is resolved.
                    match self.alert_store.clear_alert(job) {
                        Ok(true) => debug!("{} recovered, cleared its alert record", job),
                        Ok(false) => {}
                        Err(err) => {
                            warn!("Failed to clear alert record for {}: {:#}", job, err)
                        }
                    }
                }
            }
        }

        if stats.notifications_sent > 0 {
            info!(
                "Overdue sweep: {} checked, {} overdue, {} notified",
                stats.checked_jobs, stats.overdue_jobs_found, stats.notifications_sent
            );
        } else {
            debug!(
                "Overdue sweep: {} checked, {} overdue, none notified",
                stats.checked_jobs, stats.overdue_jobs_found
            );
        }
        metrics::record_sweep(&stats);

        Ok(stats)
    }

    async fn handle_overdue(
        &self,
        job: &JobKey,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
        stats: &mut SweepStatistics,
    ) -> anyhow::Result<()> {
        match self.alert_store.get_alert(job)? {
            Some(existing) if existing.expected_due_at == due_at => {
                // Already notified for this occurrence.
                Ok(())
            }
            existing => {
                if existing.is_some() {
                    // A newer run moved the due time but the job is overdue
                    // again: the old occurrence is gone, this is a new one.
                    self.alert_store.clear_alert(job)?;
                }

                let hours_overdue = (now - due_at).num_minutes() as f64 / 60.0;
                let alert = OverdueAlert {
                    job: job.clone(),
                    expected_due_at: due_at,
                    hours_overdue,
                };

                if let Err(err) = self.transport.send_overdue_alert(&alert).await {
                    // Leave the occurrence unrecorded so delivery is retried
                    // on the next sweep.
                    warn!("Failed to deliver overdue alert for {}: {:#}", job, err);
                    return Ok(());
                }

                self.alert_store.record_alert(&AlertRecord {
                    job: job.clone(),
                    expected_due_at: due_at,
                    notified_at: now,
                })?;
                stats.notifications_sent += 1;
                info!(
                    "Notified overdue backup {}: expected by {}, {:.1}h overdue",
                    job,
                    due_at.to_rfc3339(),
                    hours_overdue
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_store::SqliteAlertStore;
    use crate::dashboard_store::TaskSettings;
    use crate::monitoring::{BackupJobConfig, WeekdaySet};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct StaticConfigSource {
        configs: Mutex<HashMap<JobKey, BackupJobConfig>>,
    }

    impl StaticConfigSource {
        fn new(configs: HashMap<JobKey, BackupJobConfig>) -> Self {
            Self {
                configs: Mutex::new(configs),
            }
        }
    }

    impl ConfigSource for StaticConfigSource {
        fn backup_job_configs(&self) -> anyhow::Result<HashMap<JobKey, BackupJobConfig>> {
            Ok(self.configs.lock().unwrap().clone())
        }

        fn scheduler_tasks(&self) -> anyhow::Result<Vec<TaskSettings>> {
            Ok(Vec::new())
        }

        fn retention_days(&self) -> anyhow::Result<u32> {
            Ok(0)
        }
    }

    struct StaticHistory {
        runs: Mutex<HashMap<JobKey, DateTime<Utc>>>,
    }

    impl StaticHistory {
        fn new(runs: HashMap<JobKey, DateTime<Utc>>) -> Self {
            Self {
                runs: Mutex::new(runs),
            }
        }

        fn set_last_run(&self, job: &JobKey, timestamp: DateTime<Utc>) {
            self.runs.lock().unwrap().insert(job.clone(), timestamp);
        }
    }

    impl BackupHistory for StaticHistory {
        fn last_run_at(&self, job: &JobKey) -> anyhow::Result<Option<DateTime<Utc>>> {
            Ok(self.runs.lock().unwrap().get(job).copied())
        }

        fn prune_runs_before(&self, _cutoff: DateTime<Utc>) -> anyhow::Result<usize> {
            Ok(0)
        }
    }

    struct RecordingTransport {
        sent: Mutex<Vec<OverdueAlert>>,
        fail_next: AtomicBool,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_next: AtomicBool::new(false),
            }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AlertTransport for RecordingTransport {
        async fn send_overdue_alert(&self, alert: &OverdueAlert) -> anyhow::Result<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                anyhow::bail!("transport unavailable");
            }
            self.sent.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    struct Harness {
        monitor: OverdueMonitor,
        config_source: Arc<StaticConfigSource>,
        history: Arc<StaticHistory>,
        alert_store: Arc<SqliteAlertStore>,
        transport: Arc<RecordingTransport>,
        _temp_dir: TempDir,
    }

    fn job() -> JobKey {
        JobKey::new("srv-1", "docs")
    }

    fn config(interval_hours: u32, weekdays: WeekdaySet, enabled: bool) -> BackupJobConfig {
        BackupJobConfig {
            expected_interval_hours: interval_hours,
            allowed_weekdays: weekdays,
            monitoring_enabled: enabled,
        }
    }

    fn harness(
        configs: HashMap<JobKey, BackupJobConfig>,
        runs: HashMap<JobKey, DateTime<Utc>>,
    ) -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let config_source = Arc::new(StaticConfigSource::new(configs));
        let history = Arc::new(StaticHistory::new(runs));
        let alert_store =
            Arc::new(SqliteAlertStore::new(temp_dir.path().join("alerts.db")).unwrap());
        let transport = Arc::new(RecordingTransport::new());

        let monitor = OverdueMonitor::new(
            config_source.clone(),
            history.clone(),
            alert_store.clone(),
            transport.clone(),
        );

        Harness {
            monitor,
            config_source,
            history,
            alert_store,
            transport,
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_overdue_job_notified_once() {
        let now = Utc::now();
        let h = harness(
            [(job(), config(24, WeekdaySet::ALL, true))].into(),
            [(job(), now - Duration::hours(30))].into(),
        );

        let stats = h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(stats.checked_jobs, 1);
        assert_eq!(stats.overdue_jobs_found, 1);
        assert_eq!(stats.notifications_sent, 1);
        assert!(h.alert_store.has_alert(&job()).unwrap());

        // Second sweep with no change: still overdue, no new notification.
        let stats = h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(stats.overdue_jobs_found, 1);
        assert_eq!(stats.notifications_sent, 0);
        assert_eq!(h.transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_job_within_interval_is_not_overdue() {
        let now = Utc::now();
        let h = harness(
            [(job(), config(24, WeekdaySet::ALL, true))].into(),
            [(job(), now - Duration::hours(10))].into(),
        );

        let stats = h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(stats.checked_jobs, 1);
        assert_eq!(stats.overdue_jobs_found, 0);
        assert_eq!(stats.notifications_sent, 0);
        assert!(!h.alert_store.has_alert(&job()).unwrap());
    }

    #[tokio::test]
    async fn test_fresh_run_resolves_occurrence() {
        let now = Utc::now();
        let h = harness(
            [(job(), config(24, WeekdaySet::ALL, true))].into(),
            [(job(), now - Duration::hours(30))].into(),
        );

        h.monitor.run_sweep(now).await.unwrap();
        assert!(h.alert_store.has_alert(&job()).unwrap());

        // A run ten minutes ago resolves the occurrence.
        h.history.set_last_run(&job(), now - Duration::minutes(10));
        let stats = h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(stats.overdue_jobs_found, 0);
        assert!(!h.alert_store.has_alert(&job()).unwrap());
    }

    #[tokio::test]
    async fn test_newer_run_still_overdue_is_a_new_occurrence() {
        let now = Utc::now();
        let h = harness(
            [(job(), config(24, WeekdaySet::ALL, true))].into(),
            [(job(), now - Duration::hours(72))].into(),
        );

        h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(h.transport.sent_count(), 1);
        let first = h.alert_store.get_alert(&job()).unwrap().unwrap();

        // A newer run arrives, but it is itself older than the interval, so
        // the job is overdue again under a fresh due time.
        h.history.set_last_run(&job(), now - Duration::hours(40));
        let stats = h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(stats.notifications_sent, 1);
        assert_eq!(h.transport.sent_count(), 2);

        let second = h.alert_store.get_alert(&job()).unwrap().unwrap();
        assert_ne!(first.expected_due_at, second.expected_due_at);
    }

    #[tokio::test]
    async fn test_disabled_monitoring_is_skipped() {
        let now = Utc::now();
        let h = harness(
            [(job(), config(24, WeekdaySet::ALL, false))].into(),
            [(job(), now - Duration::hours(100))].into(),
        );

        let stats = h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(stats.checked_jobs, 0);
        assert_eq!(h.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_job_without_history_is_skipped() {
        let now = Utc::now();
        let h = harness(
            [(job(), config(24, WeekdaySet::ALL, true))].into(),
            HashMap::new(),
        );

        let stats = h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(stats.checked_jobs, 0);
        assert_eq!(stats.overdue_jobs_found, 0);
    }

    #[tokio::test]
    async fn test_empty_weekday_set_never_overdue() {
        let now = Utc::now();
        let h = harness(
            [(job(), config(24, WeekdaySet::EMPTY, true))].into(),
            [(job(), now - Duration::days(365))].into(),
        );

        let stats = h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(stats.checked_jobs, 1);
        assert_eq!(stats.overdue_jobs_found, 0);
        assert_eq!(h.transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_weekday_set_clears_stale_record() {
        let now = Utc::now();
        let h = harness(
            [(job(), config(24, WeekdaySet::EMPTY, true))].into(),
            [(job(), now - Duration::days(365))].into(),
        );

        // A record left over from before the weekday restriction was applied.
        h.alert_store
            .record_alert(&AlertRecord {
                job: job(),
                expected_due_at: now - Duration::days(300),
                notified_at: now - Duration::days(300),
            })
            .unwrap();

        h.monitor.run_sweep(now).await.unwrap();
        assert!(!h.alert_store.has_alert(&job()).unwrap());
    }

    #[tokio::test]
    async fn test_delivery_failure_retries_next_sweep() {
        let now = Utc::now();
        let h = harness(
            [(job(), config(24, WeekdaySet::ALL, true))].into(),
            [(job(), now - Duration::hours(30))].into(),
        );

        h.transport.fail_next.store(true, Ordering::SeqCst);
        let stats = h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(stats.overdue_jobs_found, 1);
        assert_eq!(stats.notifications_sent, 0);
        // Occurrence not marked alerted, so the next sweep retries.
        assert!(!h.alert_store.has_alert(&job()).unwrap());

        let stats = h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(stats.notifications_sent, 1);
        assert_eq!(h.transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_one_bad_job_does_not_abort_sweep() {
        let now = Utc::now();
        let other = JobKey::new("srv-2", "media");
        let h = harness(
            [
                (job(), config(0, WeekdaySet::ALL, true)), // invalid interval
                (other.clone(), config(24, WeekdaySet::ALL, true)),
            ]
            .into(),
            [(other.clone(), now - Duration::hours(30))].into(),
        );

        let stats = h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(stats.checked_jobs, 1);
        assert_eq!(stats.notifications_sent, 1);
        assert!(h.alert_store.has_alert(&other).unwrap());
    }

    #[tokio::test]
    async fn test_config_change_invalidation_realerts_under_new_terms() {
        let now = Utc::now();
        let h = harness(
            [(job(), config(24, WeekdaySet::ALL, true))].into(),
            [(job(), now - Duration::hours(30))].into(),
        );

        h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(h.transport.sent_count(), 1);

        // The operator tightens the interval from 24h to 12h. The write path
        // invalidates the record, so the next sweep re-alerts on new terms.
        let old = h.config_source.backup_job_configs().unwrap();
        let new: HashMap<_, _> = [(job(), config(12, WeekdaySet::ALL, true))].into();
        h.alert_store
            .invalidate_on_config_change(&old, &new)
            .unwrap();
        *h.config_source.configs.lock().unwrap() = new;

        let stats = h.monitor.run_sweep(now).await.unwrap();
        assert_eq!(stats.notifications_sent, 1);
        assert_eq!(h.transport.sent_count(), 2);
    }
}
