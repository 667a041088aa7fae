//! In-memory collaborators for pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

use tubemux_media::{
    wait_for_cancel, ByteStream, MediaError, MediaFetcher, MediaResult, MergeRequest,
    MetadataLookup, StreamVariant, Transcoder,
};
use tubemux_models::VideoMetadata;
use tubemux_progress::ProgressHub;
use tubemux_storage::{ArtifactStore, ResultCache};
use tubemux_worker::{JobOrchestrator, JobRegistry, OrchestratorDeps};

pub const TITLE: &str = "Big Buck Bunny";

pub struct FakeMetadata {
    pub calls: AtomicUsize,
    pub fail: bool,
}

#[async_trait]
impl MetadataLookup for FakeMetadata {
    async fn lookup(&self, _source_ref: &str) -> MediaResult<VideoMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MediaError::lookup_failed("no matching providers found"));
        }
        Ok(VideoMetadata {
            title: TITLE.to_string(),
            thumbnail_url: None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Both streams deliver a few chunks and end
    Succeed,
    /// The audio stream fails after one chunk
    FailAudio,
    /// Streams deliver one chunk and never finish
    Hang,
}

pub struct FakeFetcher {
    pub calls: AtomicUsize,
    pub mode: FetchMode,
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn open(&self, _source_ref: &str, variant: StreamVariant) -> MediaResult<ByteStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let first = stream::iter(vec![Ok(variant.label().as_bytes().to_vec())]);

        let stream: ByteStream = match (self.mode, variant) {
            (FetchMode::Succeed, _) | (FetchMode::FailAudio, StreamVariant::Video(_)) => {
                Box::pin(first.chain(stream::iter(vec![Ok(vec![0u8; 1024]), Ok(vec![1u8; 512])])))
            }
            (FetchMode::FailAudio, StreamVariant::Audio) => Box::pin(
                first.chain(stream::iter(vec![Err(MediaError::download_failed("HTTP 403"))])),
            ),
            (FetchMode::Hang, _) => Box::pin(first.chain(stream::pending())),
        };
        Ok(stream)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeMode {
    /// Report the given percents, then write the output
    Succeed(Vec<f64>),
    /// Report success without writing the output
    NoOutput,
    /// Exit with an error after writing a partial output
    Fail,
    /// Write a partial output and wait for cancellation
    HangUntilCancel,
}

pub struct FakeTranscoder {
    pub calls: AtomicUsize,
    pub mode: TranscodeMode,
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn merge(
        &self,
        request: &MergeRequest,
        progress: mpsc::UnboundedSender<f64>,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(request.video_path.exists(), "video input missing");
        assert!(request.audio_path.exists(), "audio input missing");

        match &self.mode {
            TranscodeMode::Succeed(percents) => {
                for pct in percents {
                    let _ = progress.send(*pct);
                    tokio::task::yield_now().await;
                }
                tokio::fs::write(&request.output_path, b"merged").await?;
                Ok(())
            }
            TranscodeMode::NoOutput => Ok(()),
            TranscodeMode::Fail => {
                tokio::fs::write(&request.output_path, b"partial").await?;
                Err(MediaError::ffmpeg_failed("exit status 1", None, Some(1)))
            }
            TranscodeMode::HangUntilCancel => {
                let _ = progress.send(12.5);
                tokio::fs::write(&request.output_path, b"partial").await?;
                wait_for_cancel(cancel).await;
                Err(MediaError::Cancelled)
            }
        }
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub orchestrator: JobOrchestrator,
    pub cache: Arc<ResultCache>,
    pub store: Arc<ArtifactStore>,
    pub hub: ProgressHub,
    pub registry: Arc<JobRegistry>,
    pub metadata: Arc<FakeMetadata>,
    pub fetcher: Arc<FakeFetcher>,
    pub transcoder: Arc<FakeTranscoder>,
}

impl Harness {
    pub async fn new(fetch: FetchMode, transcode: TranscodeMode) -> Self {
        Self::build(fetch, transcode, false).await
    }

    pub async fn with_failing_lookup() -> Self {
        Self::build(FetchMode::Succeed, TranscodeMode::Succeed(vec![]), true).await
    }

    async fn build(fetch: FetchMode, transcode: TranscodeMode, lookup_fails: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(ResultCache::open(dir.path().join("cache.json")).await.unwrap());
        let store = Arc::new(ArtifactStore::new(dir.path().join("converted")));
        let hub = ProgressHub::default();
        let registry = Arc::new(JobRegistry::new());
        let metadata = Arc::new(FakeMetadata {
            calls: AtomicUsize::new(0),
            fail: lookup_fails,
        });
        let fetcher = Arc::new(FakeFetcher {
            calls: AtomicUsize::new(0),
            mode: fetch,
        });
        let transcoder = Arc::new(FakeTranscoder {
            calls: AtomicUsize::new(0),
            mode: transcode,
        });

        let orchestrator = JobOrchestrator::new(
            OrchestratorDeps {
                fetcher: fetcher.clone(),
                transcoder: transcoder.clone(),
                metadata: metadata.clone(),
                cache: cache.clone(),
                store: store.clone(),
                hub: hub.clone(),
                registry: registry.clone(),
            },
            Duration::from_secs(5),
        );

        Self {
            dir,
            orchestrator,
            cache,
            store,
            hub,
            registry,
            metadata,
            fetcher,
            transcoder,
        }
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    /// Every file currently in the artifact directory.
    pub fn files(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(self.root()) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        files
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetcher.calls.load(Ordering::SeqCst)
    }

    pub fn transcode_calls(&self) -> usize {
        self.transcoder.calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.metadata.calls.load(Ordering::SeqCst)
    }
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
