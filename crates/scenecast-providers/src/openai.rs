//! OpenAI-compatible chat and transcription back-end.
//!
//! Also used for Ollama, which exposes the same `/chat/completions`
//! surface under `/v1` and needs no API key.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use scenecast_models::TranscriptionSegment;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{TextGenerationProvider, TranscriptionProvider};

pub struct OpenAiProvider {
    name: String,
    api_key: Option<String>,
    base_url: String,
    transcription_model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

impl OpenAiProvider {
    pub fn new(
        name: impl Into<String>,
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: name.into(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transcription_model: "whisper-1".to_string(),
            client,
        })
    }

    pub fn with_transcription_model(mut self, model: impl Into<String>) -> Self {
        self.transcription_model = model.into();
        self
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl TextGenerationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
    ) -> ProviderResult<String> {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user_prompt,
        });

        let url = format!("{}/chat/completions", self.base_url);
        debug!(backend = %self.name, %url, model, "Sending chat completion request");

        let response = self
            .authorized(self.client.post(&url))
            .json(&ChatRequest {
                model,
                messages,
                temperature: 0.7,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(format!("chat response: {e}")))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::malformed("no choices in chat response"))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ProviderError::content_policy("completion filtered"));
        }

        choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::malformed("empty chat completion"))
    }
}

#[async_trait]
impl TranscriptionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transcribe(&self, audio: &str) -> ProviderResult<Vec<TranscriptionSegment>> {
        let bytes = tokio::fs::read(audio).await?;
        let file_name = Path::new(audio)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        let form = Form::new()
            .text("model", self.transcription_model.clone())
            .text("response_format", "verbose_json")
            .part("file", Part::bytes(bytes).file_name(file_name));

        let url = format!("{}/audio/transcriptions", self.base_url);
        debug!(backend = %self.name, %url, audio, "Sending transcription request");

        let response = self
            .authorized(self.client.post(&url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(format!("transcription response: {e}")))?;

        let mut segments: Vec<TranscriptionSegment> = body
            .segments
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .map(|s| TranscriptionSegment::new(s.text.trim(), s.start, s.end.max(s.start)))
            .collect();
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        if segments.is_empty() {
            return Err(ProviderError::malformed("transcription returned no segments"));
        }
        Ok(segments)
    }
}
