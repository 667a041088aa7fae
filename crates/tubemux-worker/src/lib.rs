//! Job pipeline for tubemux.
//!
//! This crate provides:
//! - [`JobOrchestrator`]: submit and cancel with full cleanup
//! - [`JobRegistry`]: the arena of in-flight jobs
//! - [`MaintenanceScheduler`]: periodic cache eviction and artifact sweep
//! - [`PipelineConfig`]: environment driven configuration

pub mod config;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod orchestrator;
pub mod registry;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use logging::JobLogger;
pub use maintenance::{MaintenanceReport, MaintenanceScheduler};
pub use orchestrator::{JobOrchestrator, OrchestratorDeps, PercentGate, SubmitOutcome};
pub use registry::{ActiveJobSnapshot, JobHandle, JobRegistry};
