// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder can collect these. Components
//! that record on their own hot paths (claim retries, publishes, evictions,
//! sweep timings, error kinds) call `metrics::counter!` directly; the
//! helpers here cover the cross-cutting gateway and process metrics.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all berth metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("berth_http_requests_total", "HTTP requests by method, route, and status");
    describe_counter!("berth_errors_total", "Surfaced errors by stable error code");
    describe_counter!("berth_claim_retries_total", "Port claim insert races retried");
    describe_counter!("berth_publishes_total", "Messages published by channel");
    describe_counter!(
        "berth_subscriber_evictions_total",
        "Subscribers evicted for slow consumption"
    );
    describe_counter!("berth_rate_limited_total", "Requests refused by the rate limiter");
    describe_counter!("berth_reaper_sweeps_total", "Completed reaper sweeps");
    describe_counter!(
        "berth_reaper_resurrections_total",
        "Resurrection entries created by the reaper"
    );
    describe_gauge!("berth_live_subscribers", "Currently attached SSE subscribers");
    describe_gauge!("berth_memory_heap_bytes", "Heap bytes allocated (jemalloc)");
    describe_gauge!("berth_memory_resident_bytes", "Resident bytes (jemalloc)");
    describe_histogram!("berth_reaper_sweep_seconds", "Reaper sweep duration in seconds");
}

/// Record one handled HTTP request.
pub fn record_http_request(method: &str, route: &str, status: u16) {
    metrics::counter!(
        "berth_http_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Set the jemalloc heap gauge.
pub fn set_memory_heap(bytes: f64) {
    metrics::gauge!("berth_memory_heap_bytes").set(bytes);
}

/// Set the jemalloc resident gauge.
pub fn set_memory_resident(bytes: f64) {
    metrics::gauge!("berth_memory_resident_bytes").set(bytes);
}
