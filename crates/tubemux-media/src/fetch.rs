//! Media stream fetching.
//!
//! A [`MediaFetcher`] turns a source reference plus a [`StreamVariant`] into a
//! stream of byte chunks. Dropping the stream aborts the fetch; for
//! [`YtDlpFetcher`] that kills the yt-dlp child process.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use tubemux_models::Resolution;

use crate::error::{MediaError, MediaResult};

/// Stream of raw media bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = MediaResult<Vec<u8>>> + Send>>;

/// Size of each chunk read from the fetcher process.
const CHUNK_SIZE: usize = 64 * 1024;

/// Number of yt-dlp stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 10;

/// Which elementary stream to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamVariant {
    /// Best video-only stream no taller than the given resolution
    Video(Resolution),
    /// Best audio-only stream
    Audio,
}

impl StreamVariant {
    /// yt-dlp `-f` format selector for this variant.
    pub fn format_selector(&self) -> String {
        match self {
            StreamVariant::Video(res) => {
                format!("bestvideo[height<={h}]/bestvideo", h = res.height())
            }
            StreamVariant::Audio => "bestaudio".to_string(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StreamVariant::Video(_) => "video",
            StreamVariant::Audio => "audio",
        }
    }
}

/// Source of raw media streams.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Open a byte stream for `variant` of `source_ref`.
    async fn open(&self, source_ref: &str, variant: StreamVariant) -> MediaResult<ByteStream>;
}

/// Open `variant` and write it to `path`, returning the number of bytes written.
///
/// The file is synced before returning. On error a partially written file is
/// left behind for the caller to clean up.
pub async fn download_to_file(
    fetcher: &dyn MediaFetcher,
    source_ref: &str,
    variant: StreamVariant,
    path: &Path,
) -> MediaResult<u64> {
    let mut stream = fetcher.open(source_ref, variant).await?;
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_data().await?;

    debug!(
        variant = variant.label(),
        path = %path.display(),
        bytes = written,
        "Stream written to disk"
    );

    Ok(written)
}

/// Fetcher backed by the yt-dlp CLI writing to stdout.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl YtDlpFetcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Extra arguments passed before the format selector (cookies, proxies, ...).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    fn build_args(&self, source_ref: &str, variant: StreamVariant) -> Vec<String> {
        let mut args = vec![
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--no-playlist".to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.push("-f".to_string());
        args.push(variant.format_selector());
        args.push("-o".to_string());
        args.push("-".to_string());
        // Keep the reference from being read as an option
        args.push("--".to_string());
        args.push(source_ref.to_string());
        args
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn open(&self, source_ref: &str, variant: StreamVariant) -> MediaResult<ByteStream> {
        let program = which::which(&self.program).map_err(|_| MediaError::YtDlpNotFound)?;
        let args = self.build_args(source_ref, variant);

        info!(
            source_ref = %source_ref,
            variant = variant.label(),
            "Starting yt-dlp stream"
        );
        debug!("Running yt-dlp: {} {}", program.display(), args.join(" "));

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("yt-dlp stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("yt-dlp stderr not captured"))?;

        let state = ChildStream {
            child,
            stdout,
            stderr_tail: Some(tokio::spawn(collect_stderr_tail(stderr))),
            finished: false,
        };

        Ok(Box::pin(futures_util::stream::unfold(state, next_chunk)))
    }
}

struct ChildStream {
    child: Child,
    stdout: ChildStdout,
    stderr_tail: Option<JoinHandle<String>>,
    finished: bool,
}

async fn next_chunk(mut state: ChildStream) -> Option<(MediaResult<Vec<u8>>, ChildStream)> {
    if state.finished {
        return None;
    }

    let mut buf = vec![0u8; CHUNK_SIZE];
    match state.stdout.read(&mut buf).await {
        Ok(0) => {
            state.finished = true;
            match state.child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => {
                    let tail = match state.stderr_tail.take() {
                        Some(handle) => handle.await.unwrap_or_default(),
                        None => String::new(),
                    };
                    let reason = tail.lines().last().unwrap_or("unknown error").to_string();
                    let code = status
                        .code()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string());
                    Some((
                        Err(MediaError::download_failed(format!(
                            "yt-dlp exited with {}: {}",
                            code, reason
                        ))),
                        state,
                    ))
                }
                Err(e) => Some((Err(e.into()), state)),
            }
        }
        Ok(n) => {
            buf.truncate(n);
            Some((Ok(buf), state))
        }
        Err(e) => {
            state.finished = true;
            Some((Err(e.into()), state))
        }
    }
}

async fn collect_stderr_tail(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Vec::from(tail).join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    struct ChunkFetcher(Vec<MediaResult<Vec<u8>>>);

    #[async_trait]
    impl MediaFetcher for ChunkFetcher {
        async fn open(&self, _source_ref: &str, _variant: StreamVariant) -> MediaResult<ByteStream> {
            let items: Vec<MediaResult<Vec<u8>>> = self
                .0
                .iter()
                .map(|item| match item {
                    Ok(bytes) => Ok(bytes.clone()),
                    Err(_) => Err(MediaError::download_failed("boom")),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    #[test]
    fn test_format_selectors() {
        assert_eq!(
            StreamVariant::Video(Resolution::P720).format_selector(),
            "bestvideo[height<=720]/bestvideo"
        );
        assert_eq!(StreamVariant::Audio.format_selector(), "bestaudio");
    }

    #[test]
    fn test_ytdlp_args_pipe_to_stdout() {
        let fetcher = YtDlpFetcher::default().with_args(["--cookies", "c.txt"]);
        let args = fetcher.build_args("-abc", StreamVariant::Audio);

        let o = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[o + 1], "-");
        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args.last().unwrap(), "-abc");
        assert!(args.contains(&"--cookies".to_string()));
    }

    #[tokio::test]
    async fn test_download_to_file_writes_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j1-video.part");
        let fetcher = ChunkFetcher(vec![Ok(b"abc".to_vec()), Ok(b"def".to_vec())]);

        let written = download_to_file(&fetcher, "abc", StreamVariant::Audio, &path)
            .await
            .unwrap();

        assert_eq!(written, 6);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_download_to_file_propagates_stream_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j1-audio.part");
        let fetcher = ChunkFetcher(vec![
            Ok(b"abc".to_vec()),
            Err(MediaError::download_failed("boom")),
        ]);

        let err = download_to_file(&fetcher, "abc", StreamVariant::Audio, &path)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_ytdlp_binary() {
        let fetcher = YtDlpFetcher::new("definitely-not-yt-dlp-binary");
        let err = fetcher.open("abc", StreamVariant::Audio).await.err().unwrap();
        assert!(matches!(err, MediaError::YtDlpNotFound));
    }
}
