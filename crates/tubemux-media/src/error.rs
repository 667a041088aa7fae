//! Failures of the yt-dlp fetch, the noembed title lookup and the ffmpeg
//! merge.

use std::path::PathBuf;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

/// Why a fetch, lookup, probe or merge did not produce its output.
///
/// Missing binaries are reported at startup by the readiness check as well
/// as at first use.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The merge cannot start: `ffmpeg` is not on `PATH`.
    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    /// Duration probing is unavailable: `ffprobe` is not on `PATH`.
    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    /// Streams cannot be fetched: `yt-dlp` is not on `PATH`.
    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    /// ffmpeg exited non-zero while muxing the video and audio parts.
    /// `stderr` holds the tail of its output.
    #[error("ffmpeg merge failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// ffprobe could not read the duration of a fetched part.
    #[error("ffprobe failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    /// yt-dlp failed to resolve or stream one variant, or its byte stream
    /// broke off mid-transfer.
    #[error("Stream download failed: {message}")]
    DownloadFailed { message: String },

    /// noembed was unreachable or returned no title for the video.
    #[error("Title lookup failed: {message}")]
    LookupFailed { message: String },

    /// A fetched part expected on disk is missing.
    #[error("Media file not found: {0}")]
    FileNotFound(PathBuf),

    /// The job's cancellation signal fired and the subprocess was killed.
    #[error("Operation cancelled")]
    Cancelled,

    /// A subprocess exceeded its deadline, in seconds.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed ffprobe JSON output.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Local setup failure, such as an uncaptured subprocess pipe.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    pub fn lookup_failed(message: impl Into<String>) -> Self {
        Self::LookupFailed {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this is the job's own cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_cancellation_is_cancelled() {
        assert!(MediaError::Cancelled.is_cancelled());
        assert!(!MediaError::Timeout(30).is_cancelled());
        assert!(!MediaError::download_failed("HTTP 403").is_cancelled());
    }

    #[test]
    fn test_messages_name_the_stage() {
        let err = MediaError::ffmpeg_failed("exit status 1", None, Some(1));
        assert_eq!(err.to_string(), "ffmpeg merge failed: exit status 1");
        assert_eq!(
            MediaError::lookup_failed("no matching providers found").to_string(),
            "Title lookup failed: no matching providers found"
        );
    }
}
