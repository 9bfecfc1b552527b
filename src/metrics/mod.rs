//! Metrics Module
//!
//! Prometheus-compatible metrics for the ingestion pipeline and the
//! read endpoint:
//! - HTTP request metrics (count, latency, in-flight)
//! - Order processing metrics (outcome counts, latency)
//! - Kafka consumer metrics (messages, errors, latency)
//! - Cache metrics (hits, misses, operation latency)
//! - Database metrics (query latency)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Metric names as constants for consistency
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "http_requests_in_flight";

    pub const ORDERS_PROCESSED_TOTAL: &str = "orders_processed_total";
    pub const ORDER_PROCESSING_DURATION_SECONDS: &str = "order_processing_duration_seconds";

    pub const KAFKA_MESSAGES_PROCESSED_TOTAL: &str = "kafka_messages_processed_total";
    pub const KAFKA_PROCESSING_DURATION_SECONDS: &str = "kafka_processing_duration_seconds";
    pub const KAFKA_ERRORS_TOTAL: &str = "kafka_errors_total";

    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_OPERATION_DURATION_SECONDS: &str = "cache_operation_duration_seconds";

    pub const DB_QUERY_DURATION_SECONDS: &str = "database_query_duration_seconds";
}

/// Label keys
pub mod labels {
    pub const METHOD: &str = "method";
    pub const ENDPOINT: &str = "endpoint";
    pub const STATUS: &str = "status";
    pub const ERROR_TYPE: &str = "error_type";
    pub const OPERATION: &str = "operation";
    pub const QUERY_TYPE: &str = "query_type";
}

/// Install the process-wide Prometheus recorder and return the handle
/// the metrics listener renders from.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )?
        .set_buckets_for_metric(
            Matcher::Full(names::ORDER_PROCESSING_DURATION_SECONDS.to_string()),
            &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0],
        )?
        .set_buckets_for_metric(
            Matcher::Full(names::KAFKA_PROCESSING_DURATION_SECONDS.to_string()),
            &[0.01, 0.05, 0.1, 0.5, 1.0, 2.0],
        )?
        .set_buckets_for_metric(
            Matcher::Full(names::CACHE_OPERATION_DURATION_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1],
        )?
        .set_buckets_for_metric(
            Matcher::Full(names::DB_QUERY_DURATION_SECONDS.to_string()),
            &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
        )?
        .install_recorder()
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record a completed HTTP request
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    counter!(
        names::HTTP_REQUESTS_TOTAL,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str.clone()
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        labels::METHOD => method.to_string(),
        labels::ENDPOINT => endpoint.to_string(),
        labels::STATUS => status_str
    )
    .record(duration_secs);
}

pub fn http_request_started() {
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
}

pub fn http_request_finished() {
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);
}

// ============================================================================
// Order Processing Metrics
// ============================================================================

/// Record an order processing outcome: `success`, `failed`,
/// `invalid`, `cancelled`.
pub fn record_order_processed(status: &str) {
    counter!(
        names::ORDERS_PROCESSED_TOTAL,
        labels::STATUS => status.to_string()
    )
    .increment(1);
}

pub fn record_order_processing_duration(duration_secs: f64) {
    histogram!(names::ORDER_PROCESSING_DURATION_SECONDS).record(duration_secs);
}

// ============================================================================
// Kafka Metrics
// ============================================================================

/// Record a consumed message outcome: `processed` or `poison`.
pub fn record_kafka_message(status: &str) {
    counter!(
        names::KAFKA_MESSAGES_PROCESSED_TOTAL,
        labels::STATUS => status.to_string()
    )
    .increment(1);
}

/// Record a consumer-side failure: `read`, `handler`, `offset_store`.
pub fn record_kafka_error(error_type: &str) {
    counter!(
        names::KAFKA_ERRORS_TOTAL,
        labels::ERROR_TYPE => error_type.to_string()
    )
    .increment(1);
}

pub fn record_kafka_processing_duration(duration_secs: f64) {
    histogram!(names::KAFKA_PROCESSING_DURATION_SECONDS).record(duration_secs);
}

// ============================================================================
// Cache Metrics
// ============================================================================

pub fn record_cache_hit() {
    counter!(names::CACHE_HITS_TOTAL).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

pub fn record_cache_operation(operation: &str, duration_secs: f64) {
    histogram!(
        names::CACHE_OPERATION_DURATION_SECONDS,
        labels::OPERATION => operation.to_string()
    )
    .record(duration_secs);
}

// ============================================================================
// Database Metrics
// ============================================================================

pub fn record_db_query(query_type: &str, duration_secs: f64) {
    histogram!(
        names::DB_QUERY_DURATION_SECONDS,
        labels::QUERY_TYPE => query_type.to_string()
    )
    .record(duration_secs);
}

// ============================================================================
// Timer Helper
// ============================================================================

/// Timer for measuring durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Elapsed time in whole milliseconds
    pub fn elapsed_millis(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
