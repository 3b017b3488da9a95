//! Capability traits implemented by each back-end.

use async_trait::async_trait;
use scenecast_models::{AssetRef, ImageStyleParams, Scene, TranscriptionSegment};
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// Chat-style text generation.
#[async_trait]
pub trait TextGenerationProvider: Send + Sync {
    /// Back-end name used in logs and metrics.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
    ) -> ProviderResult<String>;
}

/// Prompt-to-image generation.
#[async_trait]
pub trait ImageGenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, style: &ImageStyleParams) -> ProviderResult<AssetRef>;
}

/// Speech-to-text with segment timing.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe the audio at `audio`, returning segments ordered by start time.
    async fn transcribe(&self, audio: &str) -> ProviderResult<Vec<TranscriptionSegment>>;
}

/// Rendering options handed to a [`VideoAssembler`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSpec {
    /// Burn scene text in as subtitles
    pub subtitles: bool,
    /// Transition name between scenes (e.g. "crossfade")
    pub transition: Option<String>,
    /// Overlay asset references
    pub overlays: Vec<String>,
}

/// Consumer of generated scenes; muxing itself is outside this workspace.
#[async_trait]
pub trait VideoAssembler: Send + Sync {
    async fn render(
        &self,
        scenes: &[Scene],
        audio: Option<&str>,
        spec: &RenderSpec,
    ) -> ProviderResult<String>;
}
