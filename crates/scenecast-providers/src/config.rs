//! Provider configuration records.
//!
//! These are plain deserializable values; loading and layering happens in
//! the worker, which embeds [`ProvidersConfig`] in its pipeline config.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Which client implementation backs a configured name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Gemini,
    Openai,
    Ollama,
    Replicate,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini",
            BackendKind::Openai => "openai",
            BackendKind::Ollama => "ollama",
            BackendKind::Replicate => "replicate",
        }
    }

    pub fn supports_text(&self) -> bool {
        !matches!(self, BackendKind::Replicate)
    }

    pub fn supports_image(&self) -> bool {
        matches!(self, BackendKind::Replicate)
    }

    pub fn supports_transcription(&self) -> bool {
        matches!(self, BackendKind::Openai)
    }

    /// Local back-ends do not need an API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, BackendKind::Ollama)
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "https://generativelanguage.googleapis.com",
            BackendKind::Openai => "https://api.openai.com/v1",
            BackendKind::Ollama => "http://localhost:11434/v1",
            BackendKind::Replicate => "https://api.replicate.com",
        }
    }
}

/// One named back-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Shared budget across every job in the process
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

impl BackendConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.kind.default_base_url().to_string())
    }
}

/// Retry settings as they appear in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy::new(settings.max_attempts)
            .with_base_delay(Duration::from_millis(settings.base_delay_ms))
            .with_max_delay(Duration::from_millis(settings.max_delay_ms))
    }
}

/// Back-end catalogue plus the fallback order per capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub text_chain: Vec<String>,
    pub image_chain: Vec<String>,
    /// Optional back-end used to transcribe audio that has no segments
    pub transcription: Option<String>,
    pub transcription_model: Option<String>,
    pub backends: BTreeMap<String, BackendConfig>,
}
