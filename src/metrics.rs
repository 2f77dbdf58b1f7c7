/// Metrics and telemetry for the IPAM admin service
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Permission cache hit/miss rates
/// - Policy denials and login outcomes
/// - Audit ledger writes and failures

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

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
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
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

    // ========== Access Control Metrics ==========

    /// Denied policy checks by reason
    pub static ref POLICY_DENIALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "policy_denials_total",
        "Total number of denied access checks",
        &["reason"]
    )
    .unwrap();

    /// Login attempts by outcome
    pub static ref LOGINS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "logins_total",
        "Total number of login attempts",
        &["outcome"]
    )
    .unwrap();

    // ========== User Lifecycle Metrics ==========

    /// Self-service registrations
    pub static ref REGISTRATIONS_TOTAL: IntCounter = register_int_counter!(
        "registrations_total",
        "Total number of self-service registrations"
    )
    .unwrap();

    /// Status transitions by from/to status
    pub static ref STATUS_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "user_status_transitions_total",
        "Total number of user status transitions",
        &["from", "to"]
    )
    .unwrap();

    // ========== Audit Metrics ==========

    /// Audit entries written by event
    pub static ref AUDIT_ENTRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "audit_entries_total",
        "Total number of audit entries written",
        &["event"]
    )
    .unwrap();

    /// Audit writes that failed after the audited mutation committed
    pub static ref AUDIT_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "audit_failures_total",
        "Total number of failed audit writes",
        &["event"]
    )
    .unwrap();

    // ========== Error Metrics ==========

    /// Errors by error type
    pub static ref ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "errors_total",
        "Total number of errors returned to clients",
        &["error_type"]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
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
    if hit {
        CACHE_HITS_TOTAL.with_label_values(&[cache_type]).inc();
    } else {
        CACHE_MISSES_TOTAL.with_label_values(&[cache_type]).inc();
    }
}

/// Record a denied access check
pub fn record_policy_denial(reason: &str) {
    POLICY_DENIALS_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a login attempt
pub fn record_login(success: bool) {
    LOGINS_TOTAL
        .with_label_values(&[if success { "success" } else { "failure" }])
        .inc();
}

/// Record a self-service registration
pub fn record_registration() {
    REGISTRATIONS_TOTAL.inc();
}

/// Record a user status transition
pub fn record_status_transition(from: &str, to: &str) {
    STATUS_TRANSITIONS_TOTAL.with_label_values(&[from, to]).inc();
}

/// Record a persisted audit entry
pub fn record_audit_entry(event: &str) {
    AUDIT_ENTRIES_TOTAL.with_label_values(&[event]).inc();
}

/// Record an audit write that was lost
pub fn record_audit_failure(event: &str) {
    AUDIT_FAILURES_TOTAL.with_label_values(&[event]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
