//! Prometheus metrics for qbsync-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for database query duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "qbsync_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for matching operations.
pub static MATCH_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "qbsync_match_operations_total",
        "Total number of matching operations",
        &["entity", "method"]
    )
    .expect("Failed to register MATCH_OPERATIONS")
});

/// Counter for validation outcomes.
pub static VALIDATION_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "qbsync_validation_operations_total",
        "Total number of invoice validations",
        &["status"]
    )
    .expect("Failed to register VALIDATION_OPERATIONS")
});

/// Counter for sync attempts.
pub static SYNC_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "qbsync_sync_operations_total",
        "Total number of invoice sync attempts",
        &["outcome"]
    )
    .expect("Failed to register SYNC_OPERATIONS")
});

/// Histogram for outbound QuickBooks request duration.
pub static QB_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "qbsync_qb_request_duration_seconds",
        "QuickBooks API request duration in seconds",
        &["operation"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register QB_REQUEST_DURATION")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "qbsync_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&MATCH_OPERATIONS);
    Lazy::force(&VALIDATION_OPERATIONS);
    Lazy::force(&SYNC_OPERATIONS);
    Lazy::force(&QB_REQUEST_DURATION);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
