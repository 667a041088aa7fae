//! External media boundaries for the tubemux pipeline.
//!
//! This crate provides:
//! - [`MediaFetcher`] with a yt-dlp implementation streaming to stdout
//! - [`Transcoder`] with an FFmpeg implementation and `-progress pipe:2` parsing
//! - [`MetadataLookup`] with a noembed implementation
//! - Cancellation via `watch` channels; child processes die on drop

pub mod cancel;
pub mod command;
pub mod error;
pub mod fetch;
pub mod metadata;
pub mod probe;
pub mod progress;
pub mod transcode;

pub use cancel::wait_for_cancel;
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fetch::{download_to_file, ByteStream, MediaFetcher, StreamVariant, YtDlpFetcher};
pub use metadata::{MetadataLookup, NoembedClient, DEFAULT_NOEMBED_URL};
pub use probe::probe_duration;
pub use progress::FfmpegProgress;
pub use transcode::{FfmpegTranscoder, MergeRequest, Transcoder};
