//! Provider call metrics.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const PROVIDER_CALLS_TOTAL: &str = "scenecast_provider_calls_total";
    pub const PROVIDER_RETRIES_TOTAL: &str = "scenecast_provider_retries_total";
    pub const CHAIN_EXHAUSTED_TOTAL: &str = "scenecast_chain_exhausted_total";
}

/// Record one back-end call and its outcome (`success`, `transient`, `terminal`).
pub fn record_call(capability: &str, backend: &str, outcome: &str) {
    counter!(
        names::PROVIDER_CALLS_TOTAL,
        "capability" => capability.to_string(),
        "backend" => backend.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_retry(backend: &str) {
    counter!(names::PROVIDER_RETRIES_TOTAL, "backend" => backend.to_string()).increment(1);
}

pub fn record_exhausted(capability: &str) {
    counter!(names::CHAIN_EXHAUSTED_TOTAL, "capability" => capability.to_string()).increment(1);
}
