//! Time-bounded scenes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{AssetRef, LifeStage};

/// Per-scene generation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    #[default]
    Pending,
    Generated,
    Failed,
}

impl SceneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneStatus::Pending => "pending",
            SceneStatus::Generated => "generated",
            SceneStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SceneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of the script paired with one generated visual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// 0-based position, stable across re-runs
    pub index: usize,
    /// Source script text
    pub text: String,
    /// Start of the scene on the audio timeline (seconds)
    pub start_time: f64,
    /// End of the scene on the audio timeline (seconds)
    pub end_time: f64,
    /// Life stage assigned by the stage detector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<LifeStage>,
    /// Compiled generation prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Generated asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetRef>,
    #[serde(default)]
    pub status: SceneStatus,
    /// Classified error of the last failed generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Scene {
    pub fn new(index: usize, text: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            index,
            text: text.into(),
            start_time,
            end_time,
            stage: None,
            prompt: None,
            asset: None,
            status: SceneStatus::Pending,
            error: None,
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }

    pub fn mark_generated(&mut self, asset: AssetRef) {
        self.asset = Some(asset);
        self.status = SceneStatus::Generated;
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = SceneStatus::Failed;
        self.error = Some(error.into());
    }
}
