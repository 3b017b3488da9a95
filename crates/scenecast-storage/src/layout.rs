//! On-disk records and file names of a project directory.
//!
//! ```text
//! <root>/<project_id>/
//!     manifest.json        title, context, audio, settings snapshot, status
//!     script.txt           narrated script
//!     transcription.json   timed segments
//!     scenes.json          scenes, generation settings, total duration
//!     dossier.json         character dossier
//!     assets/              generated images
//!     tmp/                 transient artifacts
//! <root>/reports/<stamp>.json
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scenecast_models::{
    Project, ProjectId, ProjectSettings, ProjectStatus, Scene, SegmentationSettings,
};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SCRIPT_FILE: &str = "script.txt";
pub const TRANSCRIPTION_FILE: &str = "transcription.json";
pub const SCENES_FILE: &str = "scenes.json";
pub const DOSSIER_FILE: &str = "dossier.json";
pub const ASSETS_DIR: &str = "assets";
pub const TRANSIENT_DIR: &str = "tmp";
pub const REPORTS_DIR: &str = "reports";

/// Project manifest: everything except the bulky derived data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub id: ProjectId,
    pub title: String,
    #[serde(default)]
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default)]
    pub settings: ProjectSettings,
    #[serde(default)]
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Project> for ProjectManifest {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            title: project.title.clone(),
            context: project.context.clone(),
            audio: project.audio.clone(),
            settings: project.settings.clone(),
            status: project.status,
            created_at: project.created_at,
        }
    }
}

/// Contents of `scenes.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenesFile {
    pub scenes: Vec<Scene>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<SegmentationSettings>,
    pub total_duration: f64,
    pub updated_at: DateTime<Utc>,
}

impl ScenesFile {
    pub fn new(scenes: Vec<Scene>, segmentation: Option<SegmentationSettings>) -> Self {
        let total_duration = scenes.last().map(|s| s.end_time).unwrap_or(0.0);
        Self {
            scenes,
            segmentation,
            total_duration,
            updated_at: Utc::now(),
        }
    }
}
