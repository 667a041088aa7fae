//! API error types.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use tubemux_worker::PipelineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Pipeline(err) => match err {
                PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
                PipelineError::Lookup(_) | PipelineError::Fetch(_) => StatusCode::BAD_GATEWAY,
                PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
                PipelineError::Cancelled(_)
                | PipelineError::AlreadyActive(_)
                | PipelineError::AlreadyCommitted(_) => StatusCode::CONFLICT,
                PipelineError::Transcode(_)
                | PipelineError::CacheIo(_)
                | PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Stable machine readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "validation_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal_error",
            ApiError::Pipeline(err) => err.category(),
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if self.is_internal()
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            detail,
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_errors_map_to_status_and_code() {
        let cases = [
            (PipelineError::validation("bad"), StatusCode::BAD_REQUEST, "validation_error"),
            (PipelineError::lookup("down"), StatusCode::BAD_GATEWAY, "lookup_error"),
            (PipelineError::fetch("403"), StatusCode::BAD_GATEWAY, "fetch_error"),
            (PipelineError::transcode("x"), StatusCode::INTERNAL_SERVER_ERROR, "transcode_error"),
            (PipelineError::not_found("j3"), StatusCode::NOT_FOUND, "not_found"),
            (PipelineError::cancelled("j1"), StatusCode::CONFLICT, "cancelled"),
            (PipelineError::already_active("j1"), StatusCode::CONFLICT, "already_active"),
            (
                PipelineError::already_committed("j1"),
                StatusCode::CONFLICT,
                "already_committed",
            ),
        ];

        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status_code(), status);
            assert_eq!(api.code(), code);
        }
    }
}
