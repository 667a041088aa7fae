//! Axum HTTP API server.
//!
//! This crate provides:
//! - Download submission and cancellation over JSON
//! - Progress push over Server-Sent Events and WebSocket
//! - Static serving of finished artifacts
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, RequiredTool};
