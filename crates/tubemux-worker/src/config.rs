//! Pipeline configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tubemux_media::DEFAULT_NOEMBED_URL;
use tubemux_progress::DEFAULT_SUBSCRIBER_BUFFER;
use tubemux_storage::DEFAULT_PUBLIC_PREFIX;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding intermediate and final artifacts
    pub output_dir: PathBuf,
    /// Result cache index file
    pub cache_path: PathBuf,
    /// URL prefix artifacts are served under
    pub public_prefix: String,
    /// Age after which cache entries and artifact files are removed
    pub max_age: Duration,
    /// Period of the maintenance loop
    pub maintenance_interval: Duration,
    /// How long `cancel` waits for a job task to release its processes
    pub cancel_grace: Duration,
    /// Per-subscriber progress buffer
    pub subscriber_buffer: usize,
    pub ytdlp_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub noembed_url: String,
    /// Hard limit on a single merge, if any
    pub merge_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/converted"),
            cache_path: PathBuf::from("data/cache.json"),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
            max_age: Duration::from_secs(24 * 3600),
            maintenance_interval: Duration::from_secs(24 * 3600),
            cancel_grace: Duration::from_secs(10),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            noembed_url: DEFAULT_NOEMBED_URL.to_string(),
            merge_timeout_secs: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            output_dir: std::env::var("TUBEMUX_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            cache_path: std::env::var("TUBEMUX_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            public_prefix: std::env::var("TUBEMUX_PUBLIC_PREFIX").unwrap_or(defaults.public_prefix),
            max_age: env_parse("TUBEMUX_MAX_AGE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_age),
            maintenance_interval: env_parse::<u64>("TUBEMUX_MAINTENANCE_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.maintenance_interval),
            cancel_grace: env_parse("TUBEMUX_CANCEL_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cancel_grace),
            subscriber_buffer: env_parse::<usize>("TUBEMUX_SUBSCRIBER_BUFFER")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.subscriber_buffer),
            ytdlp_path: std::env::var("TUBEMUX_YTDLP_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ytdlp_path),
            ffmpeg_path: std::env::var("TUBEMUX_FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            noembed_url: std::env::var("NOEMBED_URL").unwrap_or(defaults.noembed_url),
            merge_timeout_secs: env_parse("TUBEMUX_MERGE_TIMEOUT_SECS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_age, Duration::from_secs(86400));
        assert_eq!(config.maintenance_interval, Duration::from_secs(86400));
        assert_eq!(config.cancel_grace, Duration::from_secs(10));
        assert_eq!(config.public_prefix, "/converted");
        assert!(config.merge_timeout_secs.is_none());
    }
}
