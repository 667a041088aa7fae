//! Active job listing.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use tubemux_worker::ActiveJobSnapshot;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ActiveJobsResponse {
    pub jobs: Vec<ActiveJobSnapshot>,
    pub count: usize,
}

/// GET /api/jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<ActiveJobsResponse> {
    let jobs = state.orchestrator.active_jobs();
    Json(ActiveJobsResponse {
        count: jobs.len(),
        jobs,
    })
}
