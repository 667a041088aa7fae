//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tracing::warn;

use crate::events::{progress_events, ws_progress};
use crate::handlers::{cancel_download, health, list_jobs, ready, submit_download};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Mount point for artifact downloads, if the prefix can be mounted.
fn artifact_mount(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!("/{}", trimmed))
}

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let api_routes = Router::new()
        .route("/download", post(submit_download).delete(cancel_download))
        .route("/download/events", get(progress_events))
        .route("/jobs", get(list_jobs));

    let ws_routes = Router::new().route("/ws/progress", get(ws_progress));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let store = state.orchestrator.store();
    let mut router = Router::new()
        .nest("/api", api_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes);

    match artifact_mount(store.public_prefix()) {
        Some(mount) => {
            router = router.nest_service(&mount, ServeDir::new(store.root()));
        }
        None => warn!(
            prefix = store.public_prefix(),
            "Public prefix cannot be mounted, artifacts are not served"
        ),
    }

    router
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_mount() {
        assert_eq!(artifact_mount("/converted").as_deref(), Some("/converted"));
        assert_eq!(artifact_mount("files/").as_deref(), Some("/files"));
        assert_eq!(artifact_mount("/"), None);
        assert_eq!(artifact_mount(""), None);
    }
}
