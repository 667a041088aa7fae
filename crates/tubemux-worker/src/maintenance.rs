//! Periodic cache eviction and artifact sweep.
//!
//! Each run:
//! - evicts cache entries older than the max age and deletes their artifacts
//! - sweeps the artifact directory for files older than the same age

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use tubemux_media::wait_for_cancel;
use tubemux_storage::{ArtifactStore, ResultCache};

/// Outcome of one maintenance run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub evicted_entries: usize,
    /// Artifacts of evicted entries that were removed
    pub evicted_artifacts: usize,
    pub swept_files: usize,
    pub sweep_failures: usize,
}

/// Background service removing expired results.
pub struct MaintenanceScheduler {
    cache: Arc<ResultCache>,
    store: Arc<ArtifactStore>,
    max_age: Duration,
    period: Duration,
}

impl MaintenanceScheduler {
    pub fn new(
        cache: Arc<ResultCache>,
        store: Arc<ArtifactStore>,
        max_age: Duration,
        period: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            max_age,
            period,
        }
    }

    /// Run one eviction and sweep pass as of `now`.
    ///
    /// Individual failures are logged and skipped.
    pub async fn run_once(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        let max_age = chrono::Duration::from_std(self.max_age)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));

        match self.cache.evict_older_than(max_age, now).await {
            Ok(evicted) => {
                report.evicted_entries = evicted.len();
                for entry in &evicted {
                    if self.store.delete(&entry.artifact_path).await {
                        report.evicted_artifacts += 1;
                    }
                }
            }
            Err(e) => error!("Cache eviction failed: {}", e),
        }

        match self
            .store
            .sweep_older_than(self.max_age, SystemTime::from(now))
            .await
        {
            Ok(sweep) => {
                report.swept_files = sweep.deleted.len();
                report.sweep_failures = sweep.failed;
            }
            Err(e) => error!("Artifact sweep failed: {}", e),
        }

        metrics::counter!("tubemux_maintenance_runs_total").increment(1);
        metrics::counter!("tubemux_cache_evictions_total").increment(report.evicted_entries as u64);
        metrics::counter!("tubemux_swept_files_total").increment(report.swept_files as u64);

        info!(
            evicted_entries = report.evicted_entries,
            evicted_artifacts = report.evicted_artifacts,
            swept_files = report.swept_files,
            sweep_failures = report.sweep_failures,
            "Maintenance run finished"
        );

        report
    }

    /// Run until `shutdown` flips to `true`. The first pass runs immediately.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(
            "Starting maintenance scheduler (interval: {:?}, max age: {:?})",
            self.period, self.max_age
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let stop = wait_for_cancel(shutdown);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    info!("Maintenance scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.run_once(Utc::now()).await;
                }
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
