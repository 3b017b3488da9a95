//! Batch jobs and their state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::ProjectId;

/// Unique identifier for a batch job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state: `queued -> running -> {succeeded, failed, cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchJobState {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl BatchJobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchJobState::Queued => "queued",
            BatchJobState::Running => "running",
            BatchJobState::Succeeded => "succeeded",
            BatchJobState::Failed => "failed",
            BatchJobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchJobState::Succeeded | BatchJobState::Failed | BatchJobState::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// A queued job may be cancelled before it ever starts.
    pub fn can_transition_to(&self, next: BatchJobState) -> bool {
        matches!(
            (self, next),
            (BatchJobState::Queued, BatchJobState::Running)
                | (BatchJobState::Queued, BatchJobState::Cancelled)
                | (BatchJobState::Running, BatchJobState::Succeeded)
                | (BatchJobState::Running, BatchJobState::Failed)
                | (BatchJobState::Running, BatchJobState::Cancelled)
        )
    }
}

impl fmt::Display for BatchJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: BatchJobState,
    pub to: BatchJobState,
}

/// A scene that could not be generated, with its classified error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneFailure {
    pub scene_index: usize,
    pub error: String,
}

/// One project's pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchJob {
    pub id: JobId,
    pub project_id: ProjectId,
    pub state: BatchJobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<String>,
    #[serde(default)]
    pub scene_failures: Vec<SceneFailure>,
    #[serde(default)]
    pub scenes_total: usize,
    #[serde(default)]
    pub scenes_generated: usize,
    /// Non-fatal degradations recorded while running
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            id: JobId::new(),
            project_id,
            state: BatchJobState::Queued,
            error_summary: None,
            scene_failures: Vec::new(),
            scenes_total: 0,
            scenes_generated: 0,
            warnings: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    fn transition(&mut self, next: BatchJobState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(BatchJobState::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn succeed(&mut self) -> Result<(), TransitionError> {
        self.transition(BatchJobState::Succeeded)
    }

    pub fn fail(&mut self, summary: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(BatchJobState::Failed)?;
        self.error_summary = Some(summary.into());
        Ok(())
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(BatchJobState::Cancelled)?;
        self.error_summary = Some(reason.into());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_lifecycle() {
        let mut job = BatchJob::new(ProjectId::from_string("p1"));
        assert_eq!(job.state, BatchJobState::Queued);
        job.start().unwrap();
        assert!(job.started_at.is_some());
        job.succeed().unwrap();
        assert!(job.is_terminal());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = BatchJob::new(ProjectId::from_string("p1"));
        job.start().unwrap();
        job.fail("no usable scene assets").unwrap();
        let err = job.start().unwrap_err();
        assert_eq!(err.from, BatchJobState::Failed);
        assert!(job.succeed().is_err());
    }

    #[test]
    fn test_queued_job_cannot_succeed_directly() {
        let mut job = BatchJob::new(ProjectId::from_string("p1"));
        assert!(job.succeed().is_err());
        assert!(job.cancel("batch cancelled").is_ok());
        assert_eq!(job.error_summary.as_deref(), Some("batch cancelled"));
    }

    #[test]
    fn test_state_serde() {
        assert_eq!(
            serde_json::to_string(&BatchJobState::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
