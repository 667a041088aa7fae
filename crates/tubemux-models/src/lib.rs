//! Shared data models for the tubemux pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job identifiers and lifecycle phases
//! - Output formats and resolution tiers
//! - Result cache keys and entries
//! - Progress notifications
//! - Submission request/response bodies

pub mod cache;
pub mod format;
pub mod job;
pub mod progress;
pub mod request;
pub mod utils;

// Re-export common types
pub use cache::{CacheEntry, CacheKey};
pub use format::{FormatParseError, OutputFormat, Resolution, ResolutionParseError};
pub use job::{JobId, JobPhase};
pub use progress::ProgressEvent;
pub use request::{CancelRequest, CancelResponse, SubmitRequest, SubmitResponse, VideoMetadata};
pub use utils::{is_valid_youtube_url, sanitize_title_for_storage, validate_source_url, SourceUrlError};
