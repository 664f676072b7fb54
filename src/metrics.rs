//! Prometheus metrics for HerdStore.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a Tower-compatible middleware for
//! HTTP RED metrics, and exposes the `/metrics/prometheus` endpoint handler.
//! The JSON document at `/metrics` (see [`crate::node::MetricsDoc`]) stays
//! the authoritative counter surface; the Prometheus side covers request
//! rate/error/duration for scraping.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "herdstore_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "herdstore_http_request_duration_seconds";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes the metrics endpoints from self-instrumentation to avoid
/// feedback loops.  Must be the outermost layer so it captures the full
/// request lifecycle.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    // Do not instrument the metrics endpoints themselves.
    if matches!(req.uri().path(), "/metrics" | "/metrics/prometheus") {
        return next.run(req).await;
    }

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize an actual request path to a route template for metric labels.
///
/// This prevents high-cardinality labels from unique key names.
///
/// Examples:
/// - `/health` -> `/health`
/// - `/write` -> `/write`
/// - `/read/user42` -> `/read/{key}`
/// - `/no/such/route` -> `/unknown`
fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/write" | "/replicate" | "/health" | "/new_leader" | "/new_peer" | "/metrics"
        | "/metrics/prometheus" | "/dump" => path.to_string(),
        _ if path.starts_with("/read/") => "/read/{key}".to_string(),
        _ => "/unknown".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics/prometheus` -- Render Prometheus exposition format text.
///
/// Renders empty output when the recorder was never installed (router
/// tests run without one) rather than failing the request.
pub async fn prometheus_handler() -> impl IntoResponse {
    let body = PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_exact_routes() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/write"), "/write");
        assert_eq!(normalize_path("/replicate"), "/replicate");
        assert_eq!(normalize_path("/metrics"), "/metrics");
        assert_eq!(normalize_path("/metrics/prometheus"), "/metrics/prometheus");
        assert_eq!(normalize_path("/dump"), "/dump");
    }

    #[test]
    fn test_normalize_path_read_collapses_key() {
        assert_eq!(normalize_path("/read/color"), "/read/{key}");
        assert_eq!(normalize_path("/read/user/42"), "/read/{key}");
    }

    #[test]
    fn test_normalize_path_unknown_collapses() {
        assert_eq!(normalize_path("/no/such/route"), "/unknown");
        assert_eq!(normalize_path("/read"), "/unknown");
    }
}
