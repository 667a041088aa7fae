//! Application state.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use tubemux_media::command::check_binary;
use tubemux_media::{FfmpegTranscoder, MediaError, NoembedClient, YtDlpFetcher};
use tubemux_progress::ProgressHub;
use tubemux_storage::{ArtifactStore, ResultCache};
use tubemux_worker::{JobOrchestrator, JobRegistry, OrchestratorDeps, PipelineConfig};

use crate::config::ApiConfig;

/// External program the pipeline shells out to.
#[derive(Debug, Clone)]
pub struct RequiredTool {
    pub name: &'static str,
    pub program: PathBuf,
}

impl RequiredTool {
    /// Whether the program resolves on `PATH` (or as given).
    pub fn is_available(&self) -> bool {
        let missing = match self.name {
            "ffmpeg" => MediaError::FfmpegNotFound,
            _ => MediaError::YtDlpNotFound,
        };
        check_binary(&self.program, missing).is_ok()
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: JobOrchestrator,
    pub tools: Arc<Vec<RequiredTool>>,
}

impl AppState {
    /// Wire the production collaborators from `pipeline`.
    pub async fn new(config: ApiConfig, pipeline: &PipelineConfig) -> anyhow::Result<Self> {
        let store = ArtifactStore::new(&pipeline.output_dir)
            .with_public_prefix(&pipeline.public_prefix)
            .protect(&pipeline.cache_path);
        store
            .ensure_root()
            .await
            .with_context(|| format!("creating {}", pipeline.output_dir.display()))?;

        if let Some(parent) = pipeline.cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let cache = ResultCache::open(&pipeline.cache_path)
            .await
            .with_context(|| format!("opening cache index {}", pipeline.cache_path.display()))?;
        info!(
            path = %pipeline.cache_path.display(),
            entries = cache.len().await,
            "Result cache loaded"
        );

        let mut transcoder = FfmpegTranscoder::new(&pipeline.ffmpeg_path);
        if let Some(secs) = pipeline.merge_timeout_secs {
            transcoder = transcoder.with_timeout(secs);
        }
        let metadata =
            NoembedClient::new(&pipeline.noembed_url).context("building metadata client")?;

        let orchestrator = JobOrchestrator::new(
            OrchestratorDeps {
                fetcher: Arc::new(YtDlpFetcher::new(&pipeline.ytdlp_path)),
                transcoder: Arc::new(transcoder),
                metadata: Arc::new(metadata),
                cache: Arc::new(cache),
                store: Arc::new(store),
                hub: ProgressHub::new(pipeline.subscriber_buffer),
                registry: Arc::new(JobRegistry::new()),
            },
            pipeline.cancel_grace,
        );

        let tools = vec![
            RequiredTool {
                name: "yt-dlp",
                program: pipeline.ytdlp_path.clone(),
            },
            RequiredTool {
                name: "ffmpeg",
                program: pipeline.ffmpeg_path.clone(),
            },
        ];
        for tool in tools.iter().filter(|t| !t.is_available()) {
            warn!(
                tool = tool.name,
                program = %tool.program.display(),
                "Required tool not found, submissions will fail"
            );
        }

        Ok(Self::from_parts(config, orchestrator, tools))
    }

    /// Assemble state around an existing orchestrator.
    pub fn from_parts(
        config: ApiConfig,
        orchestrator: JobOrchestrator,
        tools: Vec<RequiredTool>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            tools: Arc::new(tools),
        }
    }

    pub fn hub(&self) -> &ProgressHub {
        self.orchestrator.hub()
    }
}
