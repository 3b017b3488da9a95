//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for batch jobs with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use scenecast_models::{JobId, ProjectId};

/// Job logger for structured logging with consistent formatting.
///
/// Every event carries the job ID and the project it renders.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    project_id: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, project_id: &ProjectId) -> Self {
        Self {
            job_id: job_id.to_string(),
            project_id: project_id.to_string(),
        }
    }

    /// Create a new job logger from string IDs.
    pub fn from_string(job_id: &str, project_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            project_id: project_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            "Job progress: {}", message
        );
    }

    /// Log a degradation. The job keeps running.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            project_id = %self.project_id
        )
    }
}
