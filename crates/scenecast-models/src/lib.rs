//! Shared data models for the scenecast pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Projects, transcription segments and scenes
//! - Character dossiers and life stages
//! - Batch jobs and their state machine
//! - Generation requests, prompt templates and project settings

pub mod dossier;
pub mod generation;
pub mod job;
pub mod project;
pub mod scene;
pub mod settings;
pub mod template;
pub mod transcript;

// Re-export common types
pub use dossier::{CharacterDossier, DossierSection, LifeStage};
pub use generation::{AssetRef, Capability, GenerationRequest, ImageStyleParams};
pub use job::{BatchJob, BatchJobState, JobId, SceneFailure, TransitionError};
pub use project::{Project, ProjectId, ProjectStatus};
pub use scene::{Scene, SceneStatus};
pub use settings::{
    HistoricalContext, ProjectSettings, SegmentationMode, SegmentationSettings, StyleFamily,
};
pub use template::{PromptTemplate, TemplateConstraints};
pub use transcript::{transcript_duration, validate_segments, SegmentError, TranscriptionSegment};

/// Tolerance, in seconds, used when comparing scene boundaries.
pub const TIME_EPSILON: f64 = 1e-6;
