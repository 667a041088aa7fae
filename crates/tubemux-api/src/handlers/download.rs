//! Submission and cancellation handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::info;

use tubemux_models::{
    validate_source_url, CancelRequest, CancelResponse, SubmitRequest, SubmitResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Longest bare video id accepted without a URL around it.
const MAX_BARE_ID_LEN: usize = 64;

/// Normalize a caller supplied source reference.
///
/// Anything that looks like a URL must be a YouTube URL and is returned in
/// canonical form. Otherwise the value is taken as a bare video id.
pub fn normalize_source_ref(raw: &str) -> ApiResult<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::bad_request("sourceRef is required"));
    }

    if raw.contains('/') || raw.contains('.') {
        return validate_source_url(raw)
            .map(|url| url.to_string())
            .map_err(|e| ApiError::bad_request(format!("Invalid video URL: {}", e)));
    }

    let bare_id_ok = raw.len() <= MAX_BARE_ID_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !bare_id_ok {
        return Err(ApiError::bad_request("sourceRef is neither a URL nor a video id"));
    }

    Ok(raw.to_string())
}

/// POST /api/download
pub async fn submit_download(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<Json<SubmitResponse>> {
    let Json(mut request) = payload?;
    request.source_ref = normalize_source_ref(&request.source_ref)?;

    info!(
        job_id = %request.job_id,
        source = %request.source_ref,
        format = %request.format,
        quality = %request.quality,
        "Download requested"
    );

    match state.orchestrator.submit(request).await {
        Ok(outcome) => {
            metrics::record_submission(if outcome.cached { "cached" } else { "ok" });
            Ok(Json(SubmitResponse {
                artifact_reference: outcome.artifact_reference,
                resolved_title: outcome.resolved_title,
                cached: outcome.cached,
            }))
        }
        Err(e) => {
            metrics::record_submission(e.category());
            Err(e.into())
        }
    }
}

/// DELETE /api/download
pub async fn cancel_download(
    State(state): State<AppState>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> ApiResult<Json<CancelResponse>> {
    let Json(request) = payload?;

    state.orchestrator.cancel(&request.job_id).await?;

    Ok(Json(CancelResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepts_urls_and_ids() {
        assert_eq!(
            normalize_source_ref(" youtu.be/dQw4w9WgXcQ ").unwrap(),
            "https://youtu.be/dQw4w9WgXcQ"
        );
        assert_eq!(normalize_source_ref("dQw4w9WgXcQ").unwrap(), "dQw4w9WgXcQ");
        assert_eq!(normalize_source_ref("abc").unwrap(), "abc");
    }

    #[test]
    fn test_normalize_rejects_foreign_and_garbage() {
        assert_eq!(
            normalize_source_ref("https://vimeo.com/1").unwrap_err().code(),
            "validation_error"
        );
        assert!(normalize_source_ref("").is_err());
        assert!(normalize_source_ref("rm -rf").is_err());
    }
}
