//! Pure script-processing algorithms.
//!
//! Nothing in this crate performs I/O: the worker feeds it transcripts,
//! scripts and settings, and persists whatever comes back.

pub mod aligner;
pub mod dossier;
pub mod error;
pub mod history;
pub mod prompt;
pub mod segmenter;
pub mod stage;
pub mod templates;
pub mod text;

pub use aligner::{
    estimated_alignment, proportional_alignment, Alignment, AlignmentSettings, TimedSpan,
    TranscriptAligner,
};
pub use dossier::parse_dossier_sections;
pub use error::{AlignmentError, TemplateError};
pub use history::infer_historical_context;
pub use prompt::{scene_focus, CompiledPrompt, PromptCompiler, SceneBindings};
pub use segmenter::SceneSegmenter;
pub use stage::{KeywordDomain, KeywordEntry, KeywordTable, StageDetectionSettings, StageDetector};
pub use templates::TemplateLibrary;
