//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for the citation pipeline
//! with standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all Citator metrics
pub const METRICS_PREFIX: &str = "citator";

/// Buckets for per-opinion pipeline latency (in seconds)
pub const OPINION_BUCKETS: &[f64] = &[
    0.010, // 10ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Pipeline metrics
    describe_counter!(
        format!("{}_opinions_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Total opinions run through the citation pipeline"
    );

    describe_histogram!(
        format!("{}_opinion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-opinion pipeline latency in seconds"
    );

    describe_counter!(
        format!("{}_citations_found_total", METRICS_PREFIX),
        Unit::Count,
        "Citations extracted, by outcome"
    );

    // Index metrics
    describe_counter!(
        format!("{}_index_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total corpus index queries"
    );

    describe_histogram!(
        format!("{}_index_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Corpus index query latency in seconds"
    );

    // Parallel citation metrics
    describe_counter!(
        format!("{}_parallel_edges_total", METRICS_PREFIX),
        Unit::Count,
        "Parallel citation edges processed, by outcome"
    );

    // Queue metrics
    describe_gauge!(
        format!("{}_queue_depth", METRICS_PREFIX),
        Unit::Count,
        "Approximate number of messages in queue"
    );

    describe_counter!(
        format!("{}_jobs_dispatched_total", METRICS_PREFIX),
        Unit::Count,
        "Total citation jobs dispatched by the batch driver"
    );

    describe_counter!(
        format!("{}_queue_messages_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Total queue messages processed"
    );

    tracing::info!("Metrics registered");
}

/// Record one opinion run
pub fn record_opinion_run(duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_opinions_processed_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    histogram!(format!("{}_opinion_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record extracted citations by outcome (resolved, unmatched, ambiguous)
pub fn record_citations(outcome: &'static str, count: usize) {
    counter!(
        format!("{}_citations_found_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(count as u64);
}

/// Record a corpus index query
pub fn record_index_query(duration_secs: f64, kind: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_index_queries_total", METRICS_PREFIX),
        "kind" => kind,
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_index_query_duration_seconds", METRICS_PREFIX),
        "kind" => kind
    )
    .record(duration_secs);
}

/// Record a parallel-citation edge outcome
pub fn record_promotion(outcome: &'static str) {
    counter!(
        format!("{}_parallel_edges_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record dispatched jobs and the observed queue depth
pub fn record_dispatch(queue: &str, opinions: usize, depth: Option<u64>) {
    counter!(
        format!("{}_jobs_dispatched_total", METRICS_PREFIX),
        "queue" => queue.to_string()
    )
    .increment(1);

    if let Some(depth) = depth {
        gauge!(
            format!("{}_queue_depth", METRICS_PREFIX),
            "queue" => queue.to_string()
        )
        .set(depth as f64);
    }

    tracing::trace!(queue, opinions, "Dispatch recorded");
}

/// Record a processed queue message
pub fn record_message(success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_queue_messages_processed_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);
}
