//! Result cache records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

use crate::{OutputFormat, Resolution};

/// Fingerprint of a reusable result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub source_ref: String,
    pub format: OutputFormat,
    pub quality: Resolution,
}

impl CacheKey {
    pub fn new(source_ref: impl Into<String>, format: OutputFormat, quality: Resolution) -> Self {
        Self {
            source_ref: source_ref.into().trim().to_string(),
            format,
            quality,
        }
    }

    /// Hex SHA-256 over the key fields.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_ref.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.format.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.quality.as_str().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.source_ref, self.format, self.quality)
    }
}

/// A completed artifact registered in the result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub source_ref: String,
    pub format: OutputFormat,
    pub quality: Resolution,
    /// Absolute path of the final artifact
    pub artifact_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, artifact_path: impl Into<PathBuf>, created_at: DateTime<Utc>) -> Self {
        Self {
            source_ref: key.source_ref,
            format: key.format,
            quality: key.quality,
            artifact_path: artifact_path.into(),
            created_at,
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey {
            source_ref: self.source_ref.clone(),
            format: self.format,
            quality: self.quality,
        }
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        self.source_ref == key.source_ref && self.format == key.format && self.quality == key.quality
    }

    /// Age at `now`; negative ages (clock skew) count as zero.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.created_at).max(chrono::Duration::zero())
    }
}
