//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "tubemux_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "tubemux_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "tubemux_http_requests_in_flight";

    // Progress subscriber metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "tubemux_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "tubemux_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "tubemux_ws_messages_sent_total";
    pub const SSE_CONNECTIONS_TOTAL: &str = "tubemux_sse_connections_total";
    pub const PROGRESS_SUBSCRIBERS: &str = "tubemux_progress_subscribers";

    // Submission metrics
    pub const SUBMISSIONS_TOTAL: &str = "tubemux_submissions_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a WebSocket connection.
pub fn record_ws_connection() {
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
}

/// Update active WebSocket connections gauge.
pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

/// Record a progress frame written to a WebSocket.
pub fn record_ws_message_sent(message_type: &str) {
    let labels = [("type", message_type.to_string())];
    counter!(names::WS_MESSAGES_SENT, &labels).increment(1);
}

/// Record an SSE stream being opened.
pub fn record_sse_connection() {
    counter!(names::SSE_CONNECTIONS_TOTAL).increment(1);
}

/// Update the progress subscriber gauge.
pub fn set_progress_subscribers(count: usize) {
    gauge!(names::PROGRESS_SUBSCRIBERS).set(count as f64);
}

/// Record a submission by outcome code (`ok`, `cached` or an error code).
pub fn record_submission(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::SUBMISSIONS_TOTAL, &labels).increment(1);
}

/// Route template for metric labels, so artifact names don't explode cardinality.
fn route_label(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = route_label(&request);
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
