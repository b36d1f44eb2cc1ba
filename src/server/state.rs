use crate::alert_store::AlertStore;
use crate::dashboard_store::ConfigSource;
use crate::monitoring::{BackupJobConfig, JobKey};
use crate::scheduler::TaskRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared state handed to every control-surface handler.
#[derive(Clone)]
pub struct ServerState {
    pub registry: Arc<TaskRegistry>,
    pub config_source: Arc<dyn ConfigSource>,
    pub alert_store: Arc<dyn AlertStore>,

    /// Last-seen backup job configuration, diffed on reload to invalidate
    /// alert records made stale by configuration edits.
    pub job_configs: Arc<RwLock<HashMap<JobKey, BackupJobConfig>>>,
}

impl ServerState {
    pub fn new(
        registry: Arc<TaskRegistry>,
        config_source: Arc<dyn ConfigSource>,
        alert_store: Arc<dyn AlertStore>,
        initial_job_configs: HashMap<JobKey, BackupJobConfig>,
    ) -> Self {
        Self {
            registry,
            config_source,
            alert_store,
            job_configs: Arc::new(RwLock::new(initial_job_configs)),
        }
    }
}
