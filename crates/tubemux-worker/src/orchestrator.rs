//! Job orchestration: submit and cancel.
//!
//! A submission runs through
//!
//! ```text
//! validate -> lookup title -> cache check -> register
//!   -> fetch video + audio (joined) -> merge -> finalize -> cache insert
//! ```
//!
//! After registration the pipeline runs in its own task so that a caller
//! dropping the `submit` future never strands files or registry entries.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

use tubemux_media::{
    download_to_file, wait_for_cancel, MediaFetcher, MergeRequest, MetadataLookup, StreamVariant,
    Transcoder,
};
use tubemux_models::{
    CacheEntry, CacheKey, JobId, JobPhase, OutputFormat, ProgressEvent, Resolution, SubmitRequest,
};
use tubemux_progress::ProgressHub;
use tubemux_storage::{ArtifactStore, JobPaths, ResultCache};

use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::registry::{ActiveJobSnapshot, JobHandle, JobRegistry};

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Public path of the artifact
    pub artifact_reference: String,
    pub resolved_title: String,
    /// True when served from the result cache
    pub cached: bool,
}

/// Forwards whole-percent increases only.
#[derive(Debug, Default)]
pub struct PercentGate {
    last: Option<u8>,
}

impl PercentGate {
    /// Returns the whole percent to emit, if it is above everything emitted so far.
    pub fn offer(&mut self, percent: f64) -> Option<u8> {
        if !percent.is_finite() {
            return None;
        }
        let whole = percent.clamp(0.0, 100.0).floor() as u8;
        match self.last {
            Some(last) if whole <= last => None,
            _ => {
                self.last = Some(whole);
                Some(whole)
            }
        }
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

/// Collaborators wired into an orchestrator.
pub struct OrchestratorDeps {
    pub fetcher: Arc<dyn MediaFetcher>,
    pub transcoder: Arc<dyn Transcoder>,
    pub metadata: Arc<dyn MetadataLookup>,
    pub cache: Arc<ResultCache>,
    pub store: Arc<ArtifactStore>,
    pub hub: ProgressHub,
    pub registry: Arc<JobRegistry>,
}

struct Inner {
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn Transcoder>,
    metadata: Arc<dyn MetadataLookup>,
    cache: Arc<ResultCache>,
    store: Arc<ArtifactStore>,
    hub: ProgressHub,
    registry: Arc<JobRegistry>,
    cancel_grace: Duration,
}

/// Everything the pipeline task needs about one job.
struct JobContext {
    key: CacheKey,
    title: String,
    paths: JobPaths,
    logger: JobLogger,
}

/// Drives submissions through the pipeline. Cheap to clone.
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    pub fn new(deps: OrchestratorDeps, cancel_grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher: deps.fetcher,
                transcoder: deps.transcoder,
                metadata: deps.metadata,
                cache: deps.cache,
                store: deps.store,
                hub: deps.hub,
                registry: deps.registry,
                cancel_grace,
            }),
        }
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.inner.hub
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.inner.cache
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.inner.store
    }

    /// Snapshot of in-flight jobs.
    pub fn active_jobs(&self) -> Vec<ActiveJobSnapshot> {
        self.inner.registry.snapshot()
    }

    /// Run a submission to completion, or serve it from the cache.
    pub async fn submit(&self, request: SubmitRequest) -> PipelineResult<SubmitOutcome> {
        let inner = &self.inner;

        let format: OutputFormat = request
            .format
            .parse()
            .map_err(|e: tubemux_models::FormatParseError| PipelineError::validation(e.to_string()))?;
        let quality: Resolution = request
            .quality
            .parse()
            .map_err(|e: tubemux_models::ResolutionParseError| {
                PipelineError::validation(e.to_string())
            })?;
        if request.source_ref.trim().is_empty() {
            return Err(PipelineError::validation("source reference is empty"));
        }
        let job_id = request.job_id;
        if !job_id.is_valid() {
            return Err(PipelineError::validation(format!("invalid job id: {:?}", job_id.as_str())));
        }

        let key = CacheKey::new(request.source_ref, format, quality);

        let metadata = inner
            .metadata
            .lookup(&key.source_ref)
            .await
            .map_err(|e| PipelineError::lookup(e.to_string()))?;
        let title = metadata.title;

        if let Some(entry) = inner.cache.lookup(&key).await {
            if artifact_exists(&entry.artifact_path).await {
                info!(job_id = %job_id, key = %key, "Serving cached artifact");
                metrics::counter!("tubemux_cache_hits_total").increment(1);
                return Ok(SubmitOutcome {
                    artifact_reference: inner.store.artifact_reference(&entry.artifact_path),
                    resolved_title: title,
                    cached: true,
                });
            }

            warn!(
                job_id = %job_id,
                key = %key,
                path = %entry.artifact_path.display(),
                "Cached artifact is missing, dropping stale entry"
            );
            if let Err(e) = inner.cache.remove(&key).await {
                warn!(key = %key, "Failed to remove stale cache entry: {}", e);
            }
        }
        metrics::counter!("tubemux_cache_misses_total").increment(1);

        let artifact_name = ArtifactStore::artifact_name(&title, &key, &job_id);
        let paths = inner
            .store
            .allocate(&job_id, &artifact_name, format)
            .await
            .map_err(|e| PipelineError::cache_io(e.to_string()))?;

        let handle = inner.registry.register(job_id.clone(), &key.source_ref, paths.clone())?;

        let logger = JobLogger::new(&job_id, &key);
        let span = logger.span();
        let job = JobContext {
            key,
            title,
            paths,
            logger,
        };

        let task = tokio::spawn(Arc::clone(inner).run(handle, job).instrument(span));

        task.await
            .map_err(|e| PipelineError::internal(format!("job task for {} failed: {}", job_id, e)))?
    }

    /// Cancel an in-flight job and remove every file it allocated.
    ///
    /// Fails with `NotFound` for unknown ids and `AlreadyCommitted` once the
    /// job has entered finalize.
    pub async fn cancel(&self, job_id: &JobId) -> PipelineResult<()> {
        let inner = &self.inner;

        let ticket = inner.registry.take_for_cancel(job_id)?;

        info!(job_id = %job_id, phase = ticket.phase.as_str(), "Cancelling job");
        if ticket.cancel_tx.send(true).is_err() {
            debug!(job_id = %job_id, "Job task already released its cancel receiver");
        }

        if tokio::time::timeout(inner.cancel_grace, ticket.finished_rx)
            .await
            .is_err()
        {
            warn!(
                job_id = %job_id,
                grace_secs = inner.cancel_grace.as_secs(),
                "Job task did not stop within grace period"
            );
        }

        let removed = inner.store.delete_all(&ticket.paths).await;
        info!(job_id = %job_id, removed, "Job cancelled");
        metrics::counter!("tubemux_jobs_cancel_requests_total").increment(1);

        Ok(())
    }
}

impl Inner {
    /// Pipeline task body. Always deregisters the job and publishes a
    /// terminal event.
    async fn run(self: Arc<Self>, handle: JobHandle, job: JobContext) -> PipelineResult<SubmitOutcome> {
        let started = Instant::now();
        let mut gate = PercentGate::default();

        job.logger.accepted(&job.title);
        let result = self.execute(&handle, &job, &mut gate).await;

        // Final names are job scoped, so delete_all never reaches another
        // job's artifact
        let (outcome, final_percent) = match &result {
            Ok(reference) => {
                job.logger
                    .finished(JobPhase::Completed, reference, 0, started.elapsed());
                (JobPhase::Completed, 100)
            }
            Err(e) => {
                let removed = self.store.delete_all(&job.paths).await;
                let outcome = if e.is_cancelled() {
                    JobPhase::Cancelled
                } else {
                    JobPhase::Failed
                };
                job.logger
                    .finished(outcome, &e.to_string(), removed, started.elapsed());
                (outcome, gate.last().unwrap_or(0))
            }
        };

        self.hub
            .publish(ProgressEvent::finished(job.title.clone(), final_percent));
        self.registry.complete(handle, outcome);

        metrics::counter!("tubemux_jobs_total", "outcome" => outcome.as_str()).increment(1);
        metrics::histogram!("tubemux_job_duration_seconds", "outcome" => outcome.as_str())
            .record(started.elapsed().as_secs_f64());

        result.map(|artifact_reference| SubmitOutcome {
            artifact_reference,
            resolved_title: job.title,
            cached: false,
        })
    }

    async fn execute(
        &self,
        handle: &JobHandle,
        job: &JobContext,
        gate: &mut PercentGate,
    ) -> PipelineResult<String> {
        let job_id = handle.job_id().as_str();

        // Fetching: both streams share the job's cancellation scope
        job.logger.phase(JobPhase::Fetching);
        let source_ref = job.key.source_ref.as_str();
        let fetches = async {
            tokio::try_join!(
                download_to_file(
                    self.fetcher.as_ref(),
                    source_ref,
                    StreamVariant::Video(job.key.quality),
                    &job.paths.video,
                ),
                download_to_file(
                    self.fetcher.as_ref(),
                    source_ref,
                    StreamVariant::Audio,
                    &job.paths.audio,
                ),
            )
        };

        let (video_bytes, audio_bytes) = tokio::select! {
            res = fetches => res.map_err(|e| PipelineError::from_fetch(job_id, e))?,
            _ = wait_for_cancel(handle.cancel_signal()) => {
                return Err(PipelineError::cancelled(job_id));
            }
        };
        job.logger.fetched(video_bytes, audio_bytes);

        // Merging
        self.registry.advance(handle, JobPhase::Merging)?;
        job.logger.phase(JobPhase::Merging);

        let request = MergeRequest {
            video_path: job.paths.video.clone(),
            audio_path: job.paths.audio.clone(),
            output_path: job.paths.temp_output.clone(),
            format: job.key.format,
        };
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

        let merge = self
            .transcoder
            .merge(&request, progress_tx, handle.cancel_signal());
        tokio::pin!(merge);

        let merged = loop {
            tokio::select! {
                biased;
                Some(percent) = progress_rx.recv() => self.relay(gate, job, percent),
                res = &mut merge => break res,
            }
        };
        while let Ok(percent) = progress_rx.try_recv() {
            self.relay(gate, job, percent);
        }
        merged.map_err(|e| PipelineError::from_transcode(job_id, e))?;

        // Commit point: cancellation no longer applies past this line
        self.registry.advance(handle, JobPhase::Finalizing)?;
        job.logger.phase(JobPhase::Finalizing);

        self.store
            .finalize(&job.paths.temp_output, &job.paths.final_output)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    PipelineError::transcode("transcoder reported success but produced no output")
                } else {
                    PipelineError::cache_io(format!("failed to finalize artifact: {}", e))
                }
            })?;

        self.store.delete(&job.paths.video).await;
        self.store.delete(&job.paths.audio).await;

        let entry = CacheEntry::new(job.key.clone(), job.paths.final_output.clone(), Utc::now());
        self.cache
            .insert(entry)
            .await
            .map_err(|e| PipelineError::cache_io(e.to_string()))?;

        Ok(self.store.artifact_reference(&job.paths.final_output))
    }

    fn relay(&self, gate: &mut PercentGate, job: &JobContext, percent: f64) {
        if let Some(whole) = gate.offer(percent) {
            job.logger.progress(whole);
            self.hub.publish(ProgressEvent::active(job.title.as_str(), whole));
        }
    }
}

async fn artifact_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
