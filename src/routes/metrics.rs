//! Prometheus metrics endpoint
//!
//! Exposes relay metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    // Force initialization of the lazy static
    let _ = &*PROMETHEUS_HANDLE;

    register_metrics();
}

fn register_metrics() {
    metrics::describe_counter!(
        "relay_requests_total",
        "Chat requests by outcome (rejected, completed, upstream_error, disconnected)"
    );
    metrics::describe_counter!("relay_frames_total", "Outbound SSE frames by kind");
    metrics::describe_counter!(
        "relay_chunks_dropped_total",
        "Upstream chunks not relayed, by reason"
    );
    metrics::describe_histogram!(
        "relay_stream_duration_seconds",
        "Duration of relayed streams in seconds"
    );
    metrics::describe_gauge!("relay_active_streams", "Number of streams being relayed");
}

/// Prometheus metrics endpoint handler
///
/// Returns metrics in Prometheus text format for scraping.
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE.render()
}

/// Record how a chat request ended
pub fn record_relay_outcome(outcome: &str) {
    metrics::counter!("relay_requests_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record the duration of a finished stream
pub fn record_stream_duration(duration_secs: f64) {
    metrics::histogram!("relay_stream_duration_seconds").record(duration_secs);
}

/// Record one outbound frame
pub fn record_frame(kind: &'static str) {
    metrics::counter!("relay_frames_total", "kind" => kind).increment(1);
}

/// Record a dropped upstream chunk
pub fn record_dropped_chunk(reason: &'static str) {
    metrics::counter!("relay_chunks_dropped_total", "reason" => reason).increment(1);
}

/// Track streams currently being relayed
pub fn adjust_active_streams(delta: f64) {
    let gauge = metrics::gauge!("relay_active_streams");
    if delta >= 0.0 {
        gauge.increment(delta);
    } else {
        gauge.decrement(-delta);
    }
}
