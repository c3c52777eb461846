//! Metrics and observability utilities
//!
//! Prometheus metrics for the intake pipeline, external collaborators and
//! the HTTP surface.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all RecordFlow metrics
pub const METRICS_PREFIX: &str = "recordflow";

/// Buckets for pipeline stages (OCR and LLM calls dominate)
pub const STAGE_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00, 120.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
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

    describe_counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        Unit::Count,
        "Documents accepted by upload intake"
    );

    describe_counter!(
        format!("{}_pipeline_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Background pipeline runs by final processing state"
    );

    describe_histogram!(
        format!("{}_pipeline_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Duration of each pipeline stage"
    );

    describe_counter!(
        format!("{}_extractions_total", METRICS_PREFIX),
        Unit::Count,
        "Text extractions by method and outcome"
    );

    describe_counter!(
        format!("{}_analysis_requests_total", METRICS_PREFIX),
        Unit::Count,
        "LLM analysis calls by operation and outcome"
    );

    describe_counter!(
        format!("{}_ledger_writes_total", METRICS_PREFIX),
        Unit::Count,
        "Audit ledger writes by outcome"
    );

    describe_counter!(
        format!("{}_notifications_created_total", METRICS_PREFIX),
        Unit::Count,
        "In-app notifications created"
    );

    describe_counter!(
        format!("{}_emails_total", METRICS_PREFIX),
        Unit::Count,
        "Notification emails by outcome"
    );

    describe_counter!(
        format!("{}_routing_confirmations_total", METRICS_PREFIX),
        Unit::Count,
        "Routing confirmations by mode"
    );

    describe_counter!(
        format!("{}_version_conflicts_total", METRICS_PREFIX),
        Unit::Count,
        "Optimistic concurrency conflicts on document writes"
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

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

pub fn record_upload(media_type: &str) {
    counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        "media_type" => media_type.to_string()
    )
    .increment(1);
}

pub fn record_stage(stage: &'static str, duration_secs: f64) {
    histogram!(
        format!("{}_pipeline_stage_duration_seconds", METRICS_PREFIX),
        "stage" => stage
    )
    .record(duration_secs);
}

pub fn record_pipeline_run(final_state: &'static str) {
    counter!(
        format!("{}_pipeline_runs_total", METRICS_PREFIX),
        "state" => final_state
    )
    .increment(1);
}

/// `method` is `embedded`, `ocr` or `plain`
pub fn record_extraction(method: &'static str, success: bool) {
    counter!(
        format!("{}_extractions_total", METRICS_PREFIX),
        "method" => method,
        "outcome" => outcome(success)
    )
    .increment(1);
}

pub fn record_analysis(operation: &'static str, fell_back: bool) {
    counter!(
        format!("{}_analysis_requests_total", METRICS_PREFIX),
        "operation" => operation,
        "outcome" => if fell_back { "fallback" } else { "success" }
    )
    .increment(1);
}

pub fn record_ledger_write(logged: bool) {
    counter!(
        format!("{}_ledger_writes_total", METRICS_PREFIX),
        "outcome" => if logged { "logged" } else { "skipped" }
    )
    .increment(1);
}

pub fn record_fanout(notified: usize, emails_sent: usize, email_failures: usize) {
    counter!(format!("{}_notifications_created_total", METRICS_PREFIX)).increment(notified as u64);
    counter!(format!("{}_emails_total", METRICS_PREFIX), "outcome" => "success")
        .increment(emails_sent as u64);
    counter!(format!("{}_emails_total", METRICS_PREFIX), "outcome" => "failure")
        .increment(email_failures as u64);
}

/// `mode` is `accept` or `override`
pub fn record_routing_confirmation(mode: &'static str) {
    counter!(
        format!("{}_routing_confirmations_total", METRICS_PREFIX),
        "mode" => mode
    )
    .increment(1);
}

pub fn record_version_conflict() {
    counter!(format!("{}_version_conflicts_total", METRICS_PREFIX)).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in STAGE_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops
        record_extraction("ocr", false);
        record_fanout(3, 2, 1);
        RequestMetrics::start("GET", "/v1/health").finish(200);
    }
}
