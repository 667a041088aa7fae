//! Active job arena.
//!
//! The registry is the single source of truth for which jobs are in flight.
//! Phase changes and cancellation both go through its lock, which is what
//! makes the commit point race-free: a job that reached
//! [`JobPhase::Finalizing`] can no longer be taken by `cancel` (which then
//! reports `AlreadyCommitted`), and a job taken by `cancel` can no longer
//! enter `Finalizing`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{oneshot, watch};
use tracing::debug;

use tubemux_models::{JobId, JobPhase};
use tubemux_storage::JobPaths;

use crate::error::{PipelineError, PipelineResult};

/// Point-in-time view of an active job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJobSnapshot {
    pub job_id: JobId,
    pub source_ref: String,
    pub phase: JobPhase,
    pub started_at: DateTime<Utc>,
}

struct ActiveJob {
    ticket: u64,
    source_ref: String,
    phase: JobPhase,
    started_at: DateTime<Utc>,
    cancel_tx: watch::Sender<bool>,
    paths: JobPaths,
    finished_rx: oneshot::Receiver<()>,
}

/// Owned by the task driving a job. Dropping it signals that the task has
/// released every process and file handle.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    ticket: u64,
    cancel_rx: watch::Receiver<bool>,
    _finished_tx: oneshot::Sender<()>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Receiver flipped to `true` when the job is cancelled.
    pub fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}

/// What `cancel` needs after removing a job from the arena.
#[derive(Debug)]
pub struct CancelTicket {
    pub cancel_tx: watch::Sender<bool>,
    pub paths: JobPaths,
    pub finished_rx: oneshot::Receiver<()>,
    pub phase: JobPhase,
}

/// Arena of in-flight jobs keyed by [`JobId`].
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, ActiveJob>>,
    next_ticket: AtomicU64,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry").field("active", &self.len()).finish()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, ActiveJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a job in [`JobPhase::Fetching`].
    ///
    /// Fails with `AlreadyActive` if a job with the same id is in flight.
    pub fn register(
        &self,
        job_id: JobId,
        source_ref: &str,
        paths: JobPaths,
    ) -> PipelineResult<JobHandle> {
        let mut jobs = self.jobs();
        if jobs.contains_key(&job_id) {
            return Err(PipelineError::already_active(job_id.as_str()));
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (finished_tx, finished_rx) = oneshot::channel();

        jobs.insert(
            job_id.clone(),
            ActiveJob {
                ticket,
                source_ref: source_ref.to_string(),
                phase: JobPhase::Fetching,
                started_at: Utc::now(),
                cancel_tx,
                paths,
                finished_rx,
            },
        );
        debug!(job_id = %job_id, active = jobs.len(), "Job registered");

        Ok(JobHandle {
            job_id,
            ticket,
            cancel_rx,
            _finished_tx: finished_tx,
        })
    }

    /// Move the job to `next`.
    ///
    /// Fails with `Cancelled` if the job is no longer in the arena, which
    /// only happens when `cancel` took it.
    pub fn advance(&self, handle: &JobHandle, next: JobPhase) -> PipelineResult<()> {
        let mut jobs = self.jobs();
        let job = jobs
            .get_mut(&handle.job_id)
            .filter(|job| job.ticket == handle.ticket)
            .ok_or_else(|| PipelineError::cancelled(handle.job_id.as_str()))?;

        if !job.phase.can_transition_to(next) {
            return Err(PipelineError::internal(format!(
                "illegal phase transition {} -> {} for job {}",
                job.phase, next, handle.job_id
            )));
        }

        job.phase = next;
        Ok(())
    }

    /// Remove the job at the end of its task. A job already taken by
    /// `cancel` (or replaced under the same id) is left alone.
    pub fn complete(&self, handle: JobHandle, outcome: JobPhase) {
        let mut jobs = self.jobs();
        let owned = jobs
            .get(&handle.job_id)
            .map(|job| job.ticket == handle.ticket)
            .unwrap_or(false);
        if owned {
            jobs.remove(&handle.job_id);
        }
        debug!(
            job_id = %handle.job_id,
            outcome = outcome.as_str(),
            active = jobs.len(),
            "Job deregistered"
        );
        drop(jobs);
        drop(handle);
    }

    /// Take a job out of the arena for cancellation.
    ///
    /// Fails with `NotFound` for unknown ids and `AlreadyCommitted` for jobs
    /// past their commit point, which stay in the arena.
    pub fn take_for_cancel(&self, job_id: &JobId) -> PipelineResult<CancelTicket> {
        let mut jobs = self.jobs();
        let phase = jobs
            .get(job_id)
            .map(|job| job.phase)
            .ok_or_else(|| PipelineError::not_found(job_id.as_str()))?;
        if !phase.is_cancellable() {
            return Err(PipelineError::already_committed(job_id.as_str()));
        }
        let job = jobs
            .remove(job_id)
            .ok_or_else(|| PipelineError::not_found(job_id.as_str()))?;

        Ok(CancelTicket {
            cancel_tx: job.cancel_tx,
            paths: job.paths,
            finished_rx: job.finished_rx,
            phase: job.phase,
        })
    }

    pub fn phase(&self, job_id: &JobId) -> Option<JobPhase> {
        self.jobs().get(job_id).map(|job| job.phase)
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.jobs().contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    /// Snapshot of all active jobs, oldest first.
    pub fn snapshot(&self) -> Vec<ActiveJobSnapshot> {
        let mut jobs: Vec<_> = self
            .jobs()
            .iter()
            .map(|(id, job)| ActiveJobSnapshot {
                job_id: id.clone(),
                source_ref: job.source_ref.clone(),
                phase: job.phase,
                started_at: job.started_at,
            })
            .collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn paths(id: &str) -> JobPaths {
        JobPaths {
            video: PathBuf::from(format!("/out/{}-video.part", id)),
            audio: PathBuf::from(format!("/out/{}-audio.part", id)),
            temp_output: PathBuf::from(format!("/out/{}-output.mp4", id)),
            final_output: PathBuf::from("/out/final.mp4"),
        }
    }

    #[test]
    fn test_duplicate_active_id_is_rejected() {
        let registry = JobRegistry::new();
        let _handle = registry.register(JobId::from("j1"), "abc", paths("j1")).unwrap();

        let err = registry
            .register(JobId::from("j1"), "abc", paths("j1"))
            .unwrap_err();
        assert_eq!(err.category(), "already_active");
    }

    #[test]
    fn test_phase_advance_and_complete() {
        let registry = JobRegistry::new();
        let handle = registry.register(JobId::from("j1"), "abc", paths("j1")).unwrap();

        registry.advance(&handle, JobPhase::Merging).unwrap();
        assert_eq!(registry.phase(&JobId::from("j1")), Some(JobPhase::Merging));
        assert!(registry.advance(&handle, JobPhase::Fetching).is_err());

        registry.complete(handle, JobPhase::Failed);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_takes_job_and_signals() {
        let registry = JobRegistry::new();
        let handle = registry.register(JobId::from("j1"), "abc", paths("j1")).unwrap();
        let mut cancel_rx = handle.cancel_signal();

        let ticket = registry.take_for_cancel(&JobId::from("j1")).unwrap();
        let err = registry.take_for_cancel(&JobId::from("j1")).unwrap_err();
        assert_eq!(err.category(), "not_found");
        ticket.cancel_tx.send(true).unwrap();
        cancel_rx.changed().await.unwrap();
        assert!(handle.is_cancelled());

        // The task notices on its next phase change
        let err = registry.advance(&handle, JobPhase::Merging).unwrap_err();
        assert!(err.is_cancelled());

        drop(handle);
        ticket.finished_rx.await.unwrap_err();
    }

    #[test]
    fn test_finalizing_job_cannot_be_cancelled() {
        let registry = JobRegistry::new();
        let handle = registry.register(JobId::from("j1"), "abc", paths("j1")).unwrap();
        registry.advance(&handle, JobPhase::Merging).unwrap();
        registry.advance(&handle, JobPhase::Finalizing).unwrap();

        let err = registry.take_for_cancel(&JobId::from("j1")).unwrap_err();
        assert_eq!(err.category(), "already_committed");
        assert!(registry.contains(&JobId::from("j1")));
        assert_eq!(registry.phase(&JobId::from("j1")), Some(JobPhase::Finalizing));
    }

    #[tokio::test]
    async fn test_cancel_after_task_released_receiver() {
        let registry = JobRegistry::new();
        let handle = registry.register(JobId::from("j1"), "abc", paths("j1")).unwrap();
        drop(handle);

        let ticket = registry.take_for_cancel(&JobId::from("j1")).unwrap();
        assert!(ticket.cancel_tx.send(true).is_err());
        ticket.finished_rx.await.unwrap_err();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_handle_does_not_remove_new_job() {
        let registry = JobRegistry::new();
        let old = registry.register(JobId::from("j1"), "abc", paths("j1")).unwrap();
        registry.take_for_cancel(&JobId::from("j1")).unwrap();

        let _new = registry.register(JobId::from("j1"), "def", paths("j1")).unwrap();
        registry.complete(old, JobPhase::Cancelled);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].source_ref, "def");
    }
}
