//! Pipeline error types.

use thiserror::Error;

use tubemux_media::MediaError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure of a submission or cancellation, by category.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Metadata lookup failed: {0}")]
    Lookup(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("Cache persistence failed: {0}")]
    CacheIo(String),

    #[error("Job cancelled: {0}")]
    Cancelled(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already active: {0}")]
    AlreadyActive(String),

    /// The job is finalizing its artifact and will complete normally.
    #[error("Job already committed: {0}")]
    AlreadyCommitted(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode(msg.into())
    }

    pub fn cache_io(msg: impl Into<String>) -> Self {
        Self::CacheIo(msg.into())
    }

    pub fn cancelled(job_id: impl Into<String>) -> Self {
        Self::Cancelled(job_id.into())
    }

    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self::NotFound(job_id.into())
    }

    pub fn already_active(job_id: impl Into<String>) -> Self {
        Self::AlreadyActive(job_id.into())
    }

    pub fn already_committed(job_id: impl Into<String>) -> Self {
        Self::AlreadyCommitted(job_id.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map a fetch-stage media error.
    pub(crate) fn from_fetch(job_id: &str, err: MediaError) -> Self {
        if err.is_cancelled() {
            Self::cancelled(job_id)
        } else {
            Self::fetch(err.to_string())
        }
    }

    /// Map a merge-stage media error.
    pub(crate) fn from_transcode(job_id: &str, err: MediaError) -> Self {
        if err.is_cancelled() {
            Self::cancelled(job_id)
        } else {
            Self::transcode(err.to_string())
        }
    }

    /// Stable snake_case code for this category.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::Lookup(_) => "lookup_error",
            PipelineError::Fetch(_) => "fetch_error",
            PipelineError::Transcode(_) => "transcode_error",
            PipelineError::CacheIo(_) => "cache_io_error",
            PipelineError::Cancelled(_) => "cancelled",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::AlreadyActive(_) => "already_active",
            PipelineError::AlreadyCommitted(_) => "already_committed",
            PipelineError::Internal(_) => "internal_error",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled(_))
    }

    /// Whether a caller may reasonably resubmit.
    ///
    /// Cancellation is intentional and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Lookup(_) | PipelineError::Fetch(_) | PipelineError::CacheIo(_)
        )
    }
}
