//! Two-input merge through an external transcoder.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use tubemux_models::OutputFormat;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::probe_duration;

/// Inputs and output of one merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub output_path: PathBuf,
    pub format: OutputFormat,
}

/// Merges a video-only and an audio-only input into one container.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run the merge to completion.
    ///
    /// Fractional percentages in `0.0..=100.0` are sent on `progress` as the
    /// merge advances. When `cancel` flips to `true` the merge stops and
    /// returns [`crate::MediaError::Cancelled`].
    async fn merge(
        &self,
        request: &MergeRequest,
        progress: mpsc::UnboundedSender<f64>,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()>;
}

/// [`Transcoder`] backed by the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout_secs: Option<u64>,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegTranscoder {
    /// Use `ffmpeg` as the binary; ffprobe is looked up next to it.
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        let ffmpeg = ffmpeg.into();
        let ffprobe = sibling_ffprobe(&ffmpeg);
        Self {
            ffmpeg,
            ffprobe,
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Build the merge command for `request`.
    pub fn merge_command(request: &MergeRequest) -> FfmpegCommand {
        let cmd = FfmpegCommand::new(&request.output_path)
            .input(&request.video_path)
            .input(&request.audio_path);

        // Output paths end in a job-scoped extension, so the muxer is explicit
        match request.format {
            OutputFormat::Mp4 => cmd
                .map("0:v:0")
                .map("1:a:0")
                .video_codec("libx264")
                .preset("veryfast")
                .crf(20)
                .audio_codec("aac")
                .audio_bitrate("192k")
                .output_args(["-movflags", "+faststart"])
                .container("mp4"),
            OutputFormat::Mov => cmd
                .map("0:v:0")
                .map("1:a:0")
                .video_codec("libx264")
                .preset("veryfast")
                .crf(20)
                .audio_codec("aac")
                .audio_bitrate("192k")
                .container("mov"),
            OutputFormat::Mkv => cmd
                .map("0:v:0")
                .map("1:a:0")
                .video_codec("copy")
                .audio_codec("copy")
                .container("matroska"),
            OutputFormat::Webm => cmd
                .map("0:v:0")
                .map("1:a:0")
                .video_codec("libvpx-vp9")
                .crf(32)
                .output_args(["-b:v", "0", "-row-mt", "1"])
                .audio_codec("libopus")
                .audio_bitrate("128k")
                .container("webm"),
            OutputFormat::Mp3 => cmd
                .map("1:a:0")
                .no_video()
                .audio_codec("libmp3lame")
                .output_args(["-q:a", "2"])
                .container("mp3"),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn merge(
        &self,
        request: &MergeRequest,
        progress: mpsc::UnboundedSender<f64>,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        let timing_input = if request.format.is_audio_only() {
            &request.audio_path
        } else {
            &request.video_path
        };

        let total_ms = match probe_duration(&self.ffprobe, timing_input).await {
            Ok(secs) => Some((secs * 1000.0) as i64),
            Err(e) => {
                warn!(
                    input = %timing_input.display(),
                    "Duration probe failed, merge progress limited to completion: {}", e
                );
                None
            }
        };

        let cmd = Self::merge_command(request);
        debug!(output = %request.output_path.display(), format = %request.format, "Starting merge");

        let mut runner = FfmpegRunner::new()
            .with_program(&self.ffmpeg)
            .with_cancel(cancel);
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }

        runner
            .run_with_progress(&cmd, move |p| {
                let percent = if p.is_complete {
                    Some(100.0)
                } else {
                    total_ms.map(|total| p.percentage(total))
                };
                if let Some(percent) = percent {
                    // Receiver gone means nobody is listening; not an error
                    let _ = progress.send(percent);
                }
            })
            .await
    }
}

/// `ffprobe` in the same directory as `ffmpeg`, or bare `ffprobe` for PATH lookup.
fn sibling_ffprobe(ffmpeg: &std::path::Path) -> PathBuf {
    match ffmpeg.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join("ffprobe"),
        _ => PathBuf::from("ffprobe"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(format: OutputFormat) -> MergeRequest {
        MergeRequest {
            video_path: PathBuf::from("/out/j1-video.part"),
            audio_path: PathBuf::from("/out/j1-audio.part"),
            output_path: PathBuf::from(format!("/out/j1-output.{}", format.extension())),
            format,
        }
    }

    fn value_after(args: &[String], flag: &str) -> Option<String> {
        let idx = args.iter().position(|a| a == flag)?;
        args.get(idx + 1).cloned()
    }

    #[test]
    fn test_mp4_merge_maps_both_inputs() {
        let args = FfmpegTranscoder::merge_command(&request(OutputFormat::Mp4)).build_args();
        assert!(args.contains(&"0:v:0".to_string()));
        assert!(args.contains(&"1:a:0".to_string()));
        assert_eq!(value_after(&args, "-c:a").as_deref(), Some("aac"));
        assert_eq!(value_after(&args, "-f").as_deref(), Some("mp4"));
        assert_eq!(args.last().unwrap(), "/out/j1-output.mp4");
    }

    #[test]
    fn test_mp3_merge_drops_video() {
        let args = FfmpegTranscoder::merge_command(&request(OutputFormat::Mp3)).build_args();
        assert!(args.contains(&"-vn".to_string()));
        assert!(!args.contains(&"0:v:0".to_string()));
        assert_eq!(value_after(&args, "-c:a").as_deref(), Some("libmp3lame"));
    }

    #[test]
    fn test_every_format_sets_a_muxer() {
        for format in OutputFormat::ALL {
            let args = FfmpegTranscoder::merge_command(&request(*format)).build_args();
            assert!(value_after(&args, "-f").is_some(), "no muxer for {}", format);
        }
    }

    #[test]
    fn test_sibling_ffprobe() {
        assert_eq!(sibling_ffprobe(std::path::Path::new("ffmpeg")), PathBuf::from("ffprobe"));
        assert_eq!(
            sibling_ffprobe(std::path::Path::new("/opt/ff/bin/ffmpeg")),
            PathBuf::from("/opt/ff/bin/ffprobe")
        );
    }

    #[tokio::test]
    async fn test_merge_without_ffmpeg_fails() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/bin/ffmpeg");
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let err = transcoder
            .merge(&request(OutputFormat::Mp4), tx, cancel_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::MediaError::FfmpegNotFound));
    }
}
