//! Per-job log lines.
//!
//! A [`JobLogger`] is created once a submission misses the cache and follows
//! the job to its terminal phase. Every line carries the job id and the cache
//! key, so a single conversion can be traced through fetch, merge and
//! finalize in aggregated output.

use std::time::Duration;
use tracing::{debug, error, info, warn, Level, Span};

use tubemux_models::{CacheKey, JobId, JobPhase};

#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    key: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, key: &CacheKey) -> Self {
        Self {
            job_id: job_id.clone(),
            key: key.to_string(),
        }
    }

    /// Span for the job's pipeline task.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, key = %self.key)
    }

    pub fn accepted(&self, title: &str) {
        info!(job_id = %self.job_id, key = %self.key, title, "Job accepted");
    }

    pub fn phase(&self, phase: JobPhase) {
        info!(
            job_id = %self.job_id,
            key = %self.key,
            phase = phase.as_str(),
            "Job entered phase"
        );
    }

    pub fn fetched(&self, video_bytes: u64, audio_bytes: u64) {
        info!(
            job_id = %self.job_id,
            video_bytes,
            audio_bytes,
            "Both streams fetched"
        );
    }

    /// Merge progress. Only gated whole percents reach this.
    pub fn progress(&self, percent: u8) {
        debug!(job_id = %self.job_id, percent, "Merge progress");
    }

    /// Terminal line for the job. `detail` is the artifact reference on
    /// success and the error otherwise.
    pub fn finished(&self, outcome: JobPhase, detail: &str, removed: usize, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        let outcome_name = outcome.as_str();
        match outcome_level(outcome) {
            Level::INFO => info!(
                job_id = %self.job_id,
                key = %self.key,
                outcome = outcome_name,
                elapsed_ms,
                "Job finished: {}", detail
            ),
            Level::WARN => warn!(
                job_id = %self.job_id,
                key = %self.key,
                outcome = outcome_name,
                removed,
                elapsed_ms,
                "Job finished: {}", detail
            ),
            _ => error!(
                job_id = %self.job_id,
                key = %self.key,
                outcome = outcome_name,
                removed,
                elapsed_ms,
                "Job finished: {}", detail
            ),
        }
    }
}

/// Level of the terminal line for `outcome`.
///
/// Anything other than a completion or a cancellation is logged as an error.
pub fn outcome_level(outcome: JobPhase) -> Level {
    match outcome {
        JobPhase::Completed => Level::INFO,
        JobPhase::Cancelled => Level::WARN,
        _ => Level::ERROR,
    }
}
