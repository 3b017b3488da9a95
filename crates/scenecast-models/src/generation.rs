//! Generation requests and their payloads.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of generative back-end a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Text,
    Image,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Text => "text",
            Capability::Image => "image",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A compiled, provider-ready request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationRequest {
    /// Name of the template the prompt was compiled from
    pub template: String,
    /// Placeholder values used during compilation
    pub bindings: BTreeMap<String, String>,
    pub capability: Capability,
    /// Number of dispatch attempts made so far
    #[serde(default)]
    pub attempt: u32,
    /// System instructions (text capability only)
    #[serde(default)]
    pub system_prompt: String,
    /// Final compiled user prompt
    pub prompt: String,
    /// Names of placeholders that had no binding
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unbound: Vec<String>,
}

impl GenerationRequest {
    pub fn text(system_prompt: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            template: String::new(),
            bindings: BTreeMap::new(),
            capability: Capability::Text,
            attempt: 0,
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            unbound: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.unbound.is_empty()
    }
}

/// Style parameters forwarded to image back-ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ImageStyleParams {
    pub aspect_ratio: String,
    pub output_format: String,
    pub output_quality: u8,
    pub megapixels: String,
    pub num_inference_steps: u32,
    pub go_fast: bool,
}

impl Default for ImageStyleParams {
    fn default() -> Self {
        Self {
            aspect_ratio: "16:9".to_string(),
            output_format: "webp".to_string(),
            output_quality: 85,
            megapixels: "1".to_string(),
            num_inference_steps: 4,
            go_fast: true,
        }
    }
}

/// Reference to a generated asset (URL or local path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct AssetRef {
    pub uri: String,
    /// Back-end that produced the asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

impl AssetRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            backend: None,
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }
}

impl std::fmt::Display for AssetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uri)
    }
}
