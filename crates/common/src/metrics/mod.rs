//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all DocSift metrics
pub const METRICS_PREFIX: &str = "docsift";

/// Histogram buckets for per-document pipeline latency (in seconds);
/// inference dominates, so the tail is long
pub const PIPELINE_BUCKETS: &[f64] = &[
    0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00, 120.0, 300.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Pipeline metrics
    describe_counter!(
        format!("{}_documents_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Documents fully processed into staged submissions"
    );

    describe_counter!(
        format!("{}_documents_failed_total", METRICS_PREFIX),
        Unit::Count,
        "Documents routed to the dead-letter bucket"
    );

    describe_counter!(
        format!("{}_records_staged_total", METRICS_PREFIX),
        Unit::Count,
        "Submission records written to the staging store"
    );

    describe_histogram!(
        format!("{}_extraction_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-document extraction latency in seconds"
    );

    describe_counter!(
        format!("{}_leases_reclaimed_total", METRICS_PREFIX),
        Unit::Count,
        "Expired leases released back to incoming"
    );

    // Audit / promotion metrics
    describe_counter!(
        format!("{}_audit_decisions_total", METRICS_PREFIX),
        Unit::Count,
        "Audit status changes by outcome"
    );

    describe_counter!(
        format!("{}_records_promoted_total", METRICS_PREFIX),
        Unit::Count,
        "Records promoted into the production store"
    );

    // Model lifecycle metrics
    describe_counter!(
        format!("{}_retrains_total", METRICS_PREFIX),
        Unit::Count,
        "Retrain attempts by outcome"
    );

    describe_gauge!(
        format!("{}_feedback_pending", METRICS_PREFIX),
        Unit::Count,
        "Feedback accumulated for the active model version"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a completed document extraction
pub fn record_extraction(duration_secs: f64, records_staged: usize, success: bool) {
    if success {
        counter!(format!("{}_documents_processed_total", METRICS_PREFIX)).increment(1);
        counter!(format!("{}_records_staged_total", METRICS_PREFIX))
            .increment(records_staged as u64);
        histogram!(format!("{}_extraction_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    } else {
        counter!(format!("{}_documents_failed_total", METRICS_PREFIX)).increment(1);
    }
}

/// Helper to record reclaimed leases
pub fn record_lease_reclaims(count: usize) {
    if count > 0 {
        counter!(format!("{}_leases_reclaimed_total", METRICS_PREFIX)).increment(count as u64);
    }
}

/// Helper to record an audit decision
pub fn record_audit_decision(outcome: &str) {
    counter!(
        format!("{}_audit_decisions_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Helper to record a promotion
pub fn record_promotion(created: usize, updated: usize) {
    counter!(
        format!("{}_records_promoted_total", METRICS_PREFIX),
        "disposition" => "created"
    )
    .increment(created as u64);
    counter!(
        format!("{}_records_promoted_total", METRICS_PREFIX),
        "disposition" => "updated"
    )
    .increment(updated as u64);
}

/// Helper to publish the feedback accumulated for the active model version
pub fn record_feedback_pending(count: u64) {
    gauge!(format!("{}_feedback_pending", METRICS_PREFIX)).set(count as f64);
}

/// Helper to record a retrain attempt
pub fn record_retrain(outcome: &str) {
    counter!(
        format!("{}_retrains_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in PIPELINE_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("POST", "/v1/submissions/promote");
        std::thread::sleep(std::time::Duration::from_millis(10));
        metrics.finish(200);
        // Just verify it runs without panic
    }
}
