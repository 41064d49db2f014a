/// Metrics and telemetry for the TeleDrive API
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Auth cache hit/miss rates and single-flight joins
/// - Identity lookup retries
/// - Auth failures by reason
/// - User directory query times

use axum::{
    extract::{MatchedPath, Request},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Cache Metrics ==========

    /// Cache hits by cache type
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_hits_total",
        "Total number of cache hits",
        &["cache_type"]
    )
    .unwrap();

    /// Cache misses by cache type
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_misses_total",
        "Total number of cache misses",
        &["cache_type"]
    )
    .unwrap();

    /// Lookups that waited on another request's fill
    pub static ref CACHE_SINGLE_FLIGHT_JOINS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_single_flight_joins_total",
        "Total number of lookups that joined an in-flight fill",
        &["cache_type"]
    )
    .unwrap();

    // ========== Auth Metrics ==========

    /// Identity lookup retries
    pub static ref IDENTITY_RETRIES_TOTAL: IntCounter = register_int_counter!(
        "identity_retries_total",
        "Total number of users.getMe retries"
    )
    .unwrap();

    /// Auth failures by guard and reason
    pub static ref AUTH_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "auth_failures_total",
        "Total number of authentication failures",
        &["guard", "reason"]
    )
    .unwrap();

    // ========== Database Metrics ==========

    /// Database query duration in seconds
    pub static ref DB_QUERY_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_query_duration_seconds",
        "Database query latencies in seconds",
        &["operation", "table"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();
}

/// Render all metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// `GET /metrics`
pub async fn metrics_handler() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render_metrics(),
    )
        .into_response()
}

/// Middleware recording request counts and latencies
///
/// Uses the matched route template as the path label to keep cardinality low.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a cache access
pub fn record_cache_access(cache_type: &str, hit: bool) {
    let cache_type = cache_type.trim_end_matches(':');
    if hit {
        CACHE_HITS_TOTAL.with_label_values(&[cache_type]).inc();
    } else {
        CACHE_MISSES_TOTAL.with_label_values(&[cache_type]).inc();
    }
}

/// Record a lookup that joined an in-flight fill
pub fn record_single_flight_join(cache_type: &str) {
    CACHE_SINGLE_FLIGHT_JOINS_TOTAL
        .with_label_values(&[cache_type.trim_end_matches(':')])
        .inc();
}

/// Record a users.getMe retry
pub fn record_identity_retry() {
    IDENTITY_RETRIES_TOTAL.inc();
}

/// Record an auth failure
pub fn record_auth_failure(guard: &str, reason: &str) {
    AUTH_FAILURES_TOTAL.with_label_values(&[guard, reason]).inc();
}

/// Record a database query
pub fn record_db_query(operation: &str, table: &str, duration: f64) {
    DB_QUERY_DURATION_SECONDS
        .with_label_values(&[operation, table])
        .observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/v1/users/me", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_record_cache_access() {
        record_cache_access("auth:", true);
        record_cache_access("auth:", false);
        record_single_flight_join("auth:");
        let metrics = render_metrics();
        assert!(metrics.contains("cache_hits_total{cache_type=\"auth\"}"));
        assert!(metrics.contains("cache_misses_total"));
        assert!(metrics.contains("cache_single_flight_joins_total"));
    }

    #[test]
    fn test_record_auth_metrics() {
        record_identity_retry();
        record_auth_failure("required", "invalid_token");
        let metrics = render_metrics();
        assert!(metrics.contains("identity_retries_total"));
        assert!(metrics.contains("auth_failures_total"));
    }

    #[test]
    fn test_record_db_query() {
        record_db_query("SELECT", "users", 0.001);
        assert!(render_metrics().contains("db_query_duration_seconds"));
    }
}
