//! On-disk artifact layout.
//!
//! Every job gets three job-scoped intermediate paths and one final path, all
//! inside the store root so that the final rename never crosses filesystems:
//!
//! ```text
//! <root>/<job>-video.part
//! <root>/<job>-audio.part
//! <root>/<job>-output.<ext>
//! <root>/<sanitized title>_<resolution>_<fingerprint8>_<job>.<ext>
//! ```
//!
//! The final name carries the job id too, so a job's cleanup never touches an
//! artifact committed by another job for the same key.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, warn};

use tubemux_models::{sanitize_title_for_storage, CacheKey, JobId, OutputFormat};

use crate::error::{StorageError, StorageResult};

/// Public URL prefix under which artifacts are served.
pub const DEFAULT_PUBLIC_PREFIX: &str = "/converted";

/// Length of the key fingerprint embedded in final names.
const FINGERPRINT_LEN: usize = 8;

/// Paths allocated for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub video: PathBuf,
    pub audio: PathBuf,
    pub temp_output: PathBuf,
    pub final_output: PathBuf,
}

impl JobPaths {
    /// Files that never survive a job.
    pub fn intermediates(&self) -> [&Path; 3] {
        [&self.video, &self.audio, &self.temp_output]
    }

    pub fn all(&self) -> [&Path; 4] {
        [&self.video, &self.audio, &self.temp_output, &self.final_output]
    }
}

/// Outcome of an age-based directory sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Regular files examined
    pub scanned: usize,
    pub deleted: Vec<PathBuf>,
    /// Files that were old enough but could not be removed
    pub failed: usize,
}

/// Filesystem store for intermediate and final artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    public_prefix: String,
    protected: Vec<PathBuf>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
            protected: Vec::new(),
        }
    }

    pub fn with_public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    /// Never sweep `path`, e.g. a cache index kept inside the root.
    pub fn protect(mut self, path: impl Into<PathBuf>) -> Self {
        self.protected.push(path.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    /// Create the root directory if missing.
    pub async fn ensure_root(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Final file name for `title` under `key`, produced by `job_id`.
    ///
    /// The fingerprint keeps distinct keys with equal titles apart. The job
    /// id keeps concurrent jobs for the same key apart.
    pub fn artifact_name(title: &str, key: &CacheKey, job_id: &JobId) -> String {
        let fingerprint = key.fingerprint();
        format!(
            "{}_{}_{}_{}.{}",
            sanitize_title_for_storage(title),
            key.quality,
            &fingerprint[..FINGERPRINT_LEN],
            job_id,
            key.format.extension()
        )
    }

    /// Allocate the job's paths, creating the root if needed.
    pub async fn allocate(
        &self,
        job_id: &JobId,
        artifact_name: &str,
        format: OutputFormat,
    ) -> StorageResult<JobPaths> {
        if !job_id.is_valid() {
            return Err(StorageError::invalid_name(job_id.as_str()));
        }
        if artifact_name.is_empty()
            || artifact_name.contains(['/', '\\'])
            || artifact_name.starts_with('.')
        {
            return Err(StorageError::invalid_name(artifact_name));
        }

        self.ensure_root().await?;

        let paths = JobPaths {
            video: self.root.join(format!("{}-video.part", job_id)),
            audio: self.root.join(format!("{}-audio.part", job_id)),
            temp_output: self
                .root
                .join(format!("{}-output.{}", job_id, format.extension())),
            final_output: self.root.join(artifact_name),
        };

        debug!(job_id = %job_id, final_output = %paths.final_output.display(), "Allocated job paths");
        Ok(paths)
    }

    /// Atomically move `temp` over `final_path`.
    pub async fn finalize(&self, temp: &Path, final_path: &Path) -> StorageResult<()> {
        match fs::rename(temp, final_path).await {
            Ok(()) => {
                debug!(from = %temp.display(), to = %final_path.display(), "Artifact finalized");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(temp.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `path` if present. Returns whether a file was removed.
    ///
    /// Failures other than absence are logged and swallowed.
    pub async fn delete(&self, path: &Path) -> bool {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted file");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), "Failed to delete file: {}", e);
                false
            }
        }
    }

    /// Best-effort removal of every path of a job. Returns how many were removed.
    pub async fn delete_all(&self, paths: &JobPaths) -> usize {
        let mut removed = 0;
        for path in paths.all() {
            if self.delete(path).await {
                removed += 1;
            }
        }
        removed
    }

    /// Delete regular files directly under the root whose mtime is more than
    /// `max_age` before `now`.
    pub async fn sweep_older_than(
        &self,
        max_age: Duration,
        now: SystemTime,
    ) -> StorageResult<SweepReport> {
        let mut report = SweepReport::default();

        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();

            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), "Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !metadata.is_file() || self.protected.iter().any(|p| p == &path) {
                continue;
            }
            report.scanned += 1;

            let modified = match metadata.modified() {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), "No mtime available: {}", e);
                    continue;
                }
            };

            // Future mtimes yield Err and are treated as fresh
            let is_old = now
                .duration_since(modified)
                .map(|age| age > max_age)
                .unwrap_or(false);
            if !is_old {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => report.deleted.push(path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), "Sweep failed to delete file: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            root = %self.root.display(),
            scanned = report.scanned,
            deleted = report.deleted.len(),
            failed = report.failed,
            "Artifact sweep finished"
        );

        Ok(report)
    }

    /// Public URL path of an artifact: `<prefix>/<file name>`.
    pub fn artifact_reference(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{}/{}", self.public_prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tubemux_models::Resolution;

    fn key() -> CacheKey {
        CacheKey::new("abc", OutputFormat::Mp4, Resolution::P1080)
    }

    fn set_mtime(path: &Path, when: SystemTime) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(when).unwrap();
    }

    #[test]
    fn test_artifact_name_layout() {
        let job = JobId::from("j1");
        let name = ArtifactStore::artifact_name("My Video!", &key(), &job);
        assert!(name.starts_with("my_video__1080p_"), "{}", name);
        assert!(name.ends_with("_j1.mp4"), "{}", name);

        let other = CacheKey::new("abc", OutputFormat::Mp4, Resolution::P720);
        assert_ne!(
            ArtifactStore::artifact_name("t", &key(), &job),
            ArtifactStore::artifact_name("t", &other, &job)
        );
    }

    #[tokio::test]
    async fn test_same_key_jobs_get_distinct_final_paths() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let (first, second) = (JobId::from("j1"), JobId::from("j2"));

        let a = store
            .allocate(&first, &ArtifactStore::artifact_name("t", &key(), &first), OutputFormat::Mp4)
            .await
            .unwrap();
        let b = store
            .allocate(&second, &ArtifactStore::artifact_name("t", &key(), &second), OutputFormat::Mp4)
            .await
            .unwrap();

        assert_ne!(a.final_output, b.final_output);
        fs::write(&a.final_output, b"committed").await.unwrap();
        assert_eq!(store.delete_all(&b).await, 0);
        assert!(a.final_output.exists());
    }

    #[tokio::test]
    async fn test_allocate_namespaces_by_job() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("converted"));

        let paths = store
            .allocate(&JobId::from("j1"), "final.mp4", OutputFormat::Mp4)
            .await
            .unwrap();

        assert!(store.root().is_dir());
        assert!(paths.video.ends_with("j1-video.part"));
        assert!(paths.audio.ends_with("j1-audio.part"));
        assert!(paths.temp_output.ends_with("j1-output.mp4"));
        assert!(paths.final_output.ends_with("final.mp4"));
    }

    #[tokio::test]
    async fn test_allocate_rejects_unsafe_names() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        assert!(store
            .allocate(&JobId::from("../x"), "a.mp4", OutputFormat::Mp4)
            .await
            .is_err());
        assert!(store
            .allocate(&JobId::from("j1"), "../a.mp4", OutputFormat::Mp4)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_finalize_renames() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let temp = dir.path().join("j1-output.mp4");
        let final_path = dir.path().join("final.mp4");
        fs::write(&temp, b"merged").await.unwrap();

        store.finalize(&temp, &final_path).await.unwrap();

        assert!(!temp.exists());
        assert_eq!(fs::read(&final_path).await.unwrap(), b"merged");
    }

    #[tokio::test]
    async fn test_finalize_missing_temp_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        let err = store
            .finalize(&dir.path().join("missing.mp4"), &dir.path().join("final.mp4"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let path = dir.path().join("gone.part");

        assert!(!store.delete(&path).await);
        fs::write(&path, b"x").await.unwrap();
        assert!(store.delete(&path).await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_delete_all_removes_every_path() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let paths = store
            .allocate(&JobId::from("j1"), "final.mp4", OutputFormat::Mp4)
            .await
            .unwrap();
        fs::write(&paths.video, b"v").await.unwrap();
        fs::write(&paths.audio, b"a").await.unwrap();

        assert_eq!(store.delete_all(&paths).await, 2);
        for path in paths.all() {
            assert!(!path.exists());
        }
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_old_files() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("cache.json");
        let store = ArtifactStore::new(dir.path()).protect(&index);
        let now = SystemTime::now();
        let day = Duration::from_secs(24 * 3600);

        let old = dir.path().join("old.mp4");
        let fresh = dir.path().join("fresh.mp4");
        std::fs::write(&old, b"o").unwrap();
        std::fs::write(&fresh, b"f").unwrap();
        std::fs::write(&index, b"{}").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        set_mtime(&old, now - day - Duration::from_secs(60));
        set_mtime(&index, now - day * 2);

        let report = store.sweep_older_than(day, now).await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.deleted, vec![old.clone()]);
        assert_eq!(report.failed, 0);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(index.exists());
        assert!(dir.path().join("nested").is_dir());
    }

    #[tokio::test]
    async fn test_sweep_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("absent"));
        let report = store
            .sweep_older_than(Duration::from_secs(1), SystemTime::now())
            .await
            .unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn test_artifact_reference() {
        let store = ArtifactStore::new("/srv/out");
        assert_eq!(
            store.artifact_reference(Path::new("/srv/out/a_1080p_deadbeef.mp4")),
            "/converted/a_1080p_deadbeef.mp4"
        );
        let store = ArtifactStore::new("/srv/out").with_public_prefix("/files/");
        assert_eq!(store.artifact_reference(Path::new("/srv/out/a.mp3")), "/files/a.mp3");
    }
}
