//! Worker metrics.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "scenecast_jobs_total";
    pub const JOB_DURATION_SECONDS: &str = "scenecast_job_duration_seconds";
    pub const SCENES_TOTAL: &str = "scenecast_scenes_total";
    pub const DOSSIER_BUILDS_TOTAL: &str = "scenecast_dossier_builds_total";
    pub const ALIGNMENT_FALLBACKS_TOTAL: &str = "scenecast_alignment_fallbacks_total";
}

/// Record a job reaching a terminal state.
pub fn record_job(state: &str, duration_secs: f64) {
    counter!(names::JOBS_TOTAL, "state" => state.to_string()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "state" => state.to_string()).record(duration_secs);
}

pub fn record_scene(status: &str) {
    counter!(names::SCENES_TOTAL, "status" => status.to_string()).increment(1);
}

/// `outcome` is `usable`, `retried` or `placeholder`.
pub fn record_dossier_build(outcome: &str) {
    counter!(names::DOSSIER_BUILDS_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

pub fn record_alignment_fallback(kind: &str) {
    counter!(names::ALIGNMENT_FALLBACKS_TOTAL, "kind" => kind.to_string()).increment(1);
}
