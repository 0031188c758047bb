//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the Prometheus recorder and return the handle `/metrics` renders.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "edu3d_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "edu3d_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "edu3d_http_requests_in_flight";

    // Queue metrics
    pub const QUEUE_LENGTH: &str = "edu3d_queue_length";
    pub const QUEUE_DLQ_LENGTH: &str = "edu3d_queue_dlq_length";
    pub const JOBS_ENQUEUED_TOTAL: &str = "edu3d_jobs_enqueued_total";

    // Health
    pub const HEALTH_CHECK_FAILURES_TOTAL: &str = "edu3d_health_check_failures_total";

    // Rate limiting
    pub const RATE_LIMIT_HITS_TOTAL: &str = "edu3d_rate_limit_hits_total";
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn set_queue_length(length: u64) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

pub fn set_dlq_length(length: u64) {
    gauge!(names::QUEUE_DLQ_LENGTH).set(length as f64);
}

/// Record job enqueued, labelled by generation method.
pub fn record_job_enqueued(method: &str) {
    let labels = [("method", method.to_string())];
    counter!(names::JOBS_ENQUEUED_TOTAL, &labels).increment(1);
}

pub fn record_health_check_failure(check: &str) {
    let labels = [("check", check.to_string())];
    counter!(names::HEALTH_CHECK_FAILURES_TOTAL, &labels).increment(1);
}

/// `scope` is `user` (submission limiter) or `ip` (per-IP limiter).
pub fn record_rate_limit_hit(scope: &str, endpoint: &str) {
    let labels = [
        ("scope", scope.to_string()),
        ("endpoint", sanitize_path(endpoint)),
    ];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

static JOB_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/jobs/[A-Za-z0-9-]+").unwrap());
static EXAMPLE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/examples/[^/]+(/[^/]+)?$").unwrap());

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    let path = JOB_PATH.replace_all(path, "/jobs/:job_id");
    let path = EXAMPLE_PATH.replace(&path, |caps: &regex_lite::Captures| {
        if caps.get(1).is_some() {
            "/examples/:subject/:key".to_string()
        } else {
            "/examples/:subject".to_string()
        }
    });
    path.into_owned()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/jobs/550e8400-e29b-41d4-a716-446655440000/result"),
            "/api/jobs/:job_id/result"
        );
        assert_eq!(
            sanitize_path("/api/examples/Physics/gravity_and_planetary_motion"),
            "/api/examples/:subject/:key"
        );
        assert_eq!(sanitize_path("/api/examples/Biology"), "/api/examples/:subject");
        assert_eq!(sanitize_path("/api/examples"), "/api/examples");
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
