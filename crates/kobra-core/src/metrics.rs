//! Prometheus metric definitions for load runs
//!
//! Metrics are registered lazily on first access using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::{CoreError, CoreResult};
use crate::outcome::RequestOutcome;

/// Requests issued by virtual users, by action and outcome
pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "kobra_requests_total",
        "Total number of requests issued by virtual users",
        &["action", "outcome"]
    )
    .expect("Failed to register request counter")
});

/// Request latency histogram
pub static REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "kobra_request_duration_seconds",
        "Request latency in seconds",
        &["action"],
        // Buckets: 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register request duration histogram")
});

/// Virtual users currently past login and not yet stopped
pub static ACTIVE_USERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("kobra_active_users", "Number of running virtual users")
        .expect("Failed to register active users gauge")
});

/// Virtual users that never got past login
pub static STARTUP_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "kobra_startup_failures_total",
        "Virtual users stopped by a failed login"
    )
    .expect("Failed to register startup failure counter")
});

/// Cycles that issued no request (self-transfer draws)
pub static NOOP_CYCLES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "kobra_noop_cycles_total",
        "Cycles skipped without issuing a request",
        &["action"]
    )
    .expect("Failed to register no-op cycle counter")
});

/// Record one outcome in the request counter and latency histogram.
pub fn observe_outcome(outcome: &RequestOutcome) {
    let label = if outcome.success { "success" } else { "failure" };
    REQUESTS_TOTAL
        .with_label_values(&[outcome.action_name.as_str(), label])
        .inc();
    REQUEST_DURATION
        .with_label_values(&[outcome.action_name.as_str()])
        .observe(outcome.latency.as_secs_f64());
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> CoreResult<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| CoreError::SerializationError(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| CoreError::SerializationError(e.to_string()))
}
