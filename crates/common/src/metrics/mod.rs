//! Metrics and observability utilities
//!
//! Prometheus metrics for the generation pipeline with standardized naming.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ThesisForge metrics
pub const METRICS_PREFIX: &str = "thesisforge";

/// Buckets for upstream calls (language model, renderer); these run for seconds to minutes
pub const UPSTREAM_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 1m
    120.0,  // 2m
    300.0,  // 5m
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

    // Retrieval metrics
    describe_counter!(
        format!("{}_paper_searches_total", METRICS_PREFIX),
        Unit::Count,
        "Total paper search calls"
    );

    describe_histogram!(
        format!("{}_paper_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Paper search latency in seconds"
    );

    // Language model metrics
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total language model requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model latency in seconds"
    );

    // Pipeline metrics
    describe_counter!(
        format!("{}_sections_total", METRICS_PREFIX),
        Unit::Count,
        "Literature review sections by outcome"
    );

    describe_counter!(
        format!("{}_citations_reconciled_total", METRICS_PREFIX),
        Unit::Count,
        "Citation reconciliation results by outcome"
    );

    describe_counter!(
        format!("{}_chapters_generated_total", METRICS_PREFIX),
        Unit::Count,
        "Chapters generated by type"
    );

    describe_counter!(
        format!("{}_documents_rendered_total", METRICS_PREFIX),
        Unit::Count,
        "Document renderer handoffs by outcome"
    );

    describe_histogram!(
        format!("{}_render_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Document renderer latency in seconds"
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

fn status_label(success: bool) -> &'static str {
    if success { "success" } else { "error" }
}

/// Helper to record a paper search call
pub fn record_paper_search(duration_secs: f64, result_count: usize, success: bool) {
    counter!(
        format!("{}_paper_searches_total", METRICS_PREFIX),
        "status" => status_label(success)
    )
    .increment(1);

    if success {
        histogram!(format!("{}_paper_search_duration_seconds", METRICS_PREFIX))
            .record(duration_secs);
        tracing::debug!(result_count, "Paper search recorded");
    }
}

/// Helper to record a language model call
pub fn record_llm_request(stage: &str, model: &str, duration_secs: f64, success: bool) {
    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "stage" => stage.to_string(),
        "model" => model.to_string(),
        "status" => status_label(success)
    )
    .increment(1);

    histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        "stage" => stage.to_string()
    )
    .record(duration_secs);
}

/// Helper to record one literature review section (`generated`, `failed`, `skipped`, `fallback`)
pub fn record_section(outcome: &'static str) {
    counter!(
        format!("{}_sections_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Helper to record reconciliation outcomes for one run
pub fn record_reconciliation(inserted: usize, existing: usize, duplicates: usize, failed: usize) {
    for (outcome, count) in [
        ("inserted", inserted),
        ("existing", existing),
        ("duplicate", duplicates),
        ("failed", failed),
    ] {
        if count > 0 {
            counter!(
                format!("{}_citations_reconciled_total", METRICS_PREFIX),
                "outcome" => outcome
            )
            .increment(count as u64);
        }
    }
}

/// Helper to record a saved chapter
pub fn record_chapter_generated(chapter_type: &str) {
    counter!(
        format!("{}_chapters_generated_total", METRICS_PREFIX),
        "type" => chapter_type.to_string()
    )
    .increment(1);
}

/// Helper to record a renderer handoff
pub fn record_render(duration_secs: f64, success: bool) {
    counter!(
        format!("{}_documents_rendered_total", METRICS_PREFIX),
        "status" => status_label(success)
    )
    .increment(1);

    histogram!(format!("{}_render_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}
