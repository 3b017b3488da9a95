//! Projects: one narrated script with its audio and derived scenes.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CharacterDossier, ProjectSettings, Scene, SceneStatus, TranscriptionSegment};

/// Unique identifier for a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Generate a new random project ID.
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

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Overall project status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Created,
    /// Scenes computed, nothing generated yet
    Segmented,
    /// Every scene has an asset
    Completed,
    /// Some scenes failed
    PartiallyCompleted,
    Failed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Created => "created",
            ProjectStatus::Segmented => "segmented",
            ProjectStatus::Completed => "completed",
            ProjectStatus::PartiallyCompleted => "partially_completed",
            ProjectStatus::Failed => "failed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }
}

/// A narrated script with its transcription and derived scenes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    /// Global context string (who, when, where)
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub script: String,
    /// Audio file reference, if narrated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default)]
    pub segments: Vec<TranscriptionSegment>,
    #[serde(default)]
    pub settings: ProjectSettings,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dossier: Option<CharacterDossier>,
    #[serde(default)]
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(title: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            title: title.into(),
            context: String::new(),
            script: script.into(),
            audio: None,
            segments: Vec::new(),
            settings: ProjectSettings::default(),
            scenes: Vec::new(),
            dossier: None,
            status: ProjectStatus::Created,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: ProjectId) -> Self {
        self.id = id;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_segments(mut self, segments: Vec<TranscriptionSegment>) -> Self {
        self.segments = segments;
        self
    }

    pub fn with_settings(mut self, settings: ProjectSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn generated_count(&self) -> usize {
        self.scenes
            .iter()
            .filter(|s| s.status == SceneStatus::Generated)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.scenes
            .iter()
            .filter(|s| s.status == SceneStatus::Failed)
            .count()
    }

    /// Derive the project status from its scenes after generation.
    pub fn refresh_status(&mut self) {
        let generated = self.generated_count();
        self.status = if self.scenes.is_empty() || generated == 0 {
            ProjectStatus::Failed
        } else if generated == self.scenes.len() {
            ProjectStatus::Completed
        } else {
            ProjectStatus::PartiallyCompleted
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AssetRef;

    #[test]
    fn test_project_id_display() {
        let id = ProjectId::from_string("san-blas");
        assert_eq!(id.to_string(), "san-blas");
    }

    #[test]
    fn test_refresh_status_partial() {
        let mut project = Project::new("San Blas", "texto");
        project.scenes = vec![Scene::new(0, "a", 0.0, 1.0), Scene::new(1, "b", 1.0, 2.0)];
        project.scenes[0].mark_generated(AssetRef::new("a.webp"));
        project.scenes[1].mark_failed("content policy");
        project.refresh_status();
        assert_eq!(project.status, ProjectStatus::PartiallyCompleted);
        assert_eq!(project.failed_count(), 1);
    }

    #[test]
    fn test_refresh_status_no_assets_is_failed() {
        let mut project = Project::new("t", "s");
        project.scenes = vec![Scene::new(0, "a", 0.0, 1.0)];
        project.refresh_status();
        assert_eq!(project.status, ProjectStatus::Failed);
    }
}
