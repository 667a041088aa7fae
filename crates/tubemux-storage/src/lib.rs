//! Local storage for the tubemux pipeline.
//!
//! - [`ArtifactStore`]: job path allocation, atomic finalize, best-effort
//!   deletion and age-based sweeping of the output directory
//! - [`ResultCache`]: JSON index of completed artifacts, written through on
//!   every mutation

pub mod artifact;
pub mod cache;
pub mod error;

pub use artifact::{ArtifactStore, JobPaths, SweepReport, DEFAULT_PUBLIC_PREFIX};
pub use cache::ResultCache;
pub use error::{StorageError, StorageResult};
