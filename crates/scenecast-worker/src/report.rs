//! Final batch report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scenecast_models::{BatchJob, BatchJobState, JobId, ProjectId, SceneFailure};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub project_id: ProjectId,
    pub state: BatchJobState,
    pub scenes_total: usize,
    pub scenes_generated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<String>,
    /// Every failed scene with its classified error
    #[serde(default)]
    pub scene_failures: Vec<SceneFailure>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl From<&BatchJob> for JobReport {
    fn from(job: &BatchJob) -> Self {
        let duration_secs = match (job.started_at, job.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        };
        Self {
            job_id: job.id.clone(),
            project_id: job.project_id.clone(),
            state: job.state,
            scenes_total: job.scenes_total,
            scenes_generated: job.scenes_generated,
            error_summary: job.error_summary.clone(),
            scene_failures: job.scene_failures.clone(),
            warnings: job.warnings.clone(),
            duration_secs,
        }
    }
}

/// Per-job outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub jobs: Vec<JobReport>,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub generated_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn from_jobs(jobs: &[BatchJob]) -> Self {
        let count = |state: BatchJobState| jobs.iter().filter(|j| j.state == state).count();
        Self {
            jobs: jobs.iter().map(JobReport::from).collect(),
            succeeded: count(BatchJobState::Succeeded),
            failed: count(BatchJobState::Failed),
            cancelled: count(BatchJobState::Cancelled),
            generated_at: Utc::now(),
        }
    }

    /// Jobs that produced every scene.
    pub fn fully_succeeded(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.state == BatchJobState::Succeeded && j.scene_failures.is_empty())
            .count()
    }

    /// Plain-text table for logs and the console.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} jobs: {} succeeded, {} failed, {} cancelled\n",
            self.jobs.len(),
            self.succeeded,
            self.failed,
            self.cancelled
        );
        out.push_str(&format!(
            "{:<36}  {:<10}  {:>9}  {}\n",
            "project", "state", "scenes", "error"
        ));
        for job in &self.jobs {
            out.push_str(&format!(
                "{:<36}  {:<10}  {:>4}/{:<4}  {}\n",
                job.project_id.as_str(),
                job.state.as_str(),
                job.scenes_generated,
                job.scenes_total,
                job.error_summary.as_deref().unwrap_or("-")
            ));
            for failure in &job.scene_failures {
                out.push_str(&format!(
                    "    scene {}: {}\n",
                    failure.scene_index, failure.error
                ));
            }
        }
        out
    }
}
