//! Metrics and observability utilities
//!
//! Prometheus metrics with SLO-aligned histograms and a shared
//! `gptlens_` prefix. Labels never carry hashes or other per-user values.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all GPTLens metrics
pub const METRICS_PREFIX: &str = "gptlens";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: ingest P99 < 50ms, dashboard reads P99 < 500ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - ingest P99 target
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms - dashboard P99 target
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
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

    // Ingest metrics
    describe_counter!(
        format!("{}_events_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Events accepted by the collector, by type"
    );

    describe_counter!(
        format!("{}_ingest_rejections_total", METRICS_PREFIX),
        Unit::Count,
        "Collector requests rejected, by reason"
    );

    describe_counter!(
        format!("{}_rate_limit_denials_total", METRICS_PREFIX),
        Unit::Count,
        "Requests denied by the per-app limiter"
    );

    // Dashboard metrics
    describe_histogram!(
        format!("{}_aggregation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Report computation latency in seconds"
    );

    // Retention metrics
    describe_counter!(
        format!("{}_cleanup_deleted_total", METRICS_PREFIX),
        Unit::Count,
        "Rows removed by retention cleanup, by plan"
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

/// Record one accepted event
pub fn record_event_ingested(event_type: &str) {
    counter!(
        format!("{}_events_ingested_total", METRICS_PREFIX),
        "type" => event_type.to_string()
    )
    .increment(1);
}

/// Record a rejected collector request
pub fn record_ingest_rejection(reason: &str) {
    counter!(
        format!("{}_ingest_rejections_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record how long one report took to compute
pub fn record_aggregation(report: &'static str, duration_secs: f64) {
    histogram!(
        format!("{}_aggregation_duration_seconds", METRICS_PREFIX),
        "report" => report
    )
    .record(duration_secs);
}

/// Record rows removed by a cleanup pass
pub fn record_cleanup(plan: &str, events: u64, daily_metrics: u64) {
    counter!(
        format!("{}_cleanup_deleted_total", METRICS_PREFIX),
        "plan" => plan.to_string(),
        "table" => "events"
    )
    .increment(events);

    counter!(
        format!("{}_cleanup_deleted_total", METRICS_PREFIX),
        "plan" => plan.to_string(),
        "table" => "daily_metrics"
    )
    .increment(daily_metrics);
}
