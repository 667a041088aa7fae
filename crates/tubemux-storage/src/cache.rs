//! Persistent result cache.
//!
//! The index is a single JSON document of the form `{ "cache": [...] }`.
//! Every mutation rewrites it through a sibling temp file and a rename, so a
//! crash leaves either the old or the new index on disk.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use tubemux_models::{CacheEntry, CacheKey};

use crate::error::{StorageError, StorageResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default)]
    cache: Vec<CacheEntry>,
}

/// Write-through cache of completed artifacts keyed by [`CacheKey`].
#[derive(Debug)]
pub struct ResultCache {
    path: PathBuf,
    entries: Mutex<Vec<CacheEntry>>,
}

impl ResultCache {
    /// Load the index at `path`. A missing or empty file yields an empty cache.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();

        let entries = match fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => {
                let doc: CacheDocument = serde_json::from_slice(&bytes).map_err(|e| {
                    StorageError::corrupt_index(format!("{}: {}", path.display(), e))
                })?;
                doc.cache
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), entries = entries.len(), "Result cache loaded");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entries = self.entries.lock().await;
        entries.iter().find(|e| e.matches(key)).cloned()
    }

    /// Insert `entry`, replacing any entry with the same key.
    ///
    /// The index is on disk before this returns. On a write failure the
    /// in-memory state is left unchanged.
    pub async fn insert(&self, entry: CacheEntry) -> StorageResult<()> {
        let mut entries = self.entries.lock().await;
        let key = entry.key();

        let mut next = entries.clone();
        match next.iter_mut().find(|e| e.matches(&key)) {
            Some(existing) => *existing = entry,
            None => next.push(entry),
        }

        self.persist(&next).await?;
        *entries = next;

        debug!(key = %key, entries = entries.len(), "Cache entry stored");
        Ok(())
    }

    /// Remove the entry for `key`, returning it if present.
    pub async fn remove(&self, key: &CacheKey) -> StorageResult<Option<CacheEntry>> {
        let mut entries = self.entries.lock().await;

        let Some(idx) = entries.iter().position(|e| e.matches(key)) else {
            return Ok(None);
        };

        let mut next = entries.clone();
        let removed = next.remove(idx);
        self.persist(&next).await?;
        *entries = next;

        debug!(key = %key, "Cache entry removed");
        Ok(Some(removed))
    }

    /// Drop entries whose age at `now` exceeds `max_age` and return them.
    ///
    /// Artifact files are left alone.
    pub async fn evict_older_than(
        &self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<CacheEntry>> {
        let mut entries = self.entries.lock().await;

        let (expired, kept): (Vec<_>, Vec<_>) = entries
            .iter()
            .cloned()
            .partition(|e| e.age(now) > max_age);

        if expired.is_empty() {
            return Ok(expired);
        }

        self.persist(&kept).await?;
        *entries = kept;

        info!(
            evicted = expired.len(),
            remaining = entries.len(),
            "Evicted expired cache entries"
        );
        Ok(expired)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Snapshot of all entries.
    pub async fn entries(&self) -> Vec<CacheEntry> {
        self.entries.lock().await.clone()
    }

    async fn persist(&self, entries: &[CacheEntry]) -> StorageResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let doc = CacheDocument {
            cache: entries.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cache.json".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        Ok(())
    }
}
