//! Request and response bodies of the submission surface.

use serde::{Deserialize, Serialize};

use crate::JobId;

/// Submission as received from a caller. Format and quality stay as raw
/// strings so that unknown values surface as validation errors rather than
/// deserialization failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(alias = "url")]
    pub source_ref: String,
    pub format: String,
    #[serde(alias = "resolution")]
    pub quality: String,
    pub job_id: JobId,
}

impl SubmitRequest {
    pub fn new(
        source_ref: impl Into<String>,
        format: impl Into<String>,
        quality: impl Into<String>,
        job_id: impl Into<JobId>,
    ) -> Self {
        Self {
            source_ref: source_ref.into(),
            format: format.into(),
            quality: quality.into(),
            job_id: job_id.into(),
        }
    }
}

/// Successful submission result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// Public path of the artifact, e.g. `/converted/my_video_1080p_1a2b3c4d.mp4`
    pub artifact_reference: String,
    pub resolved_title: String,
    /// True when served from the result cache
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
}

/// Metadata returned by the title lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}
