//! Replicate image back-end (flux-schnell and friends).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scenecast_models::{AssetRef, ImageStyleParams};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::ImageGenerationProvider;

pub struct ReplicateProvider {
    name: String,
    api_token: String,
    base_url: String,
    /// `owner/name` of the model
    model: String,
    poll_interval: Duration,
    client: Client,
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    aspect_ratio: &'a str,
    output_format: &'a str,
    output_quality: u8,
    megapixels: &'a str,
    num_inference_steps: u32,
    go_fast: bool,
    num_outputs: u32,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: String,
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

impl ReplicateProvider {
    pub fn new(
        name: impl Into<String>,
        api_token: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: name.into(),
            api_token: api_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            poll_interval: Duration::from_secs(1),
            client,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn fetch(&self, url: &str) -> ProviderResult<Prediction> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> ProviderResult<Prediction> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(format!("prediction: {e}")))
    }
}

/// First URL in a prediction output, which may be a string or a list.
fn first_output_url(output: &serde_json::Value) -> Option<String> {
    match output {
        serde_json::Value::String(url) => Some(url.clone()),
        serde_json::Value::Array(items) => items.iter().find_map(first_output_url),
        _ => None,
    }
}

fn failed_prediction(error: Option<String>) -> ProviderError {
    let message = error.unwrap_or_else(|| "prediction failed".to_string());
    let lower = message.to_lowercase();
    if lower.contains("nsfw") || lower.contains("safety") || lower.contains("content policy") {
        ProviderError::content_policy(message)
    } else {
        ProviderError::malformed(message)
    }
}

#[async_trait]
impl ImageGenerationProvider for ReplicateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, style: &ImageStyleParams) -> ProviderResult<AssetRef> {
        let url = format!("{}/v1/models/{}/predictions", self.base_url, self.model);
        let request = PredictionRequest {
            input: PredictionInput {
                prompt,
                aspect_ratio: &style.aspect_ratio,
                output_format: &style.output_format,
                output_quality: style.output_quality,
                megapixels: &style.megapixels,
                num_inference_steps: style.num_inference_steps,
                go_fast: style.go_fast,
                num_outputs: 1,
            },
        };

        debug!(backend = %self.name, model = %self.model, "Creating prediction");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&request)
            .send()
            .await?;
        let mut prediction = Self::decode(response).await?;

        // The dispatcher's per-call timeout bounds this loop.
        loop {
            match prediction.status.as_str() {
                "succeeded" => {
                    let url = prediction
                        .output
                        .as_ref()
                        .and_then(first_output_url)
                        .ok_or_else(|| ProviderError::malformed("prediction has no output URL"))?;
                    return Ok(AssetRef::new(url).with_backend(self.name.clone()));
                }
                "failed" | "canceled" => return Err(failed_prediction(prediction.error)),
                _ => {
                    let poll_url = prediction
                        .urls
                        .as_ref()
                        .and_then(|u| u.get.clone())
                        .unwrap_or_else(|| {
                            format!("{}/v1/predictions/{}", self.base_url, prediction.id)
                        });
                    tokio::time::sleep(self.poll_interval).await;
                    prediction = self.fetch(&poll_url).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> ReplicateProvider {
        ReplicateProvider::new(
            "replicate",
            "r8_test",
            server.uri(),
            "black-forest-labs/flux-schnell",
            Duration::from_secs(5),
        )
        .unwrap()
        .with_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_sync_prediction_returns_first_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/models/black-forest-labs/flux-schnell/predictions"))
            .and(header("authorization", "Bearer r8_test"))
            .and(body_partial_json(serde_json::json!({
                "input": {"aspect_ratio": "16:9", "output_format": "webp"}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "p1",
                "status": "succeeded",
                "output": ["https://replicate.delivery/p1/out-0.webp"]
            })))
            .mount(&server)
            .await;

        let asset = provider(&server)
            .generate("a bishop healing the sick", &ImageStyleParams::default())
            .await
            .unwrap();
        assert_eq!(asset.uri, "https://replicate.delivery/p1/out-0.webp");
        assert_eq!(asset.backend.as_deref(), Some("replicate"));
    }

    #[tokio::test]
    async fn test_polls_until_complete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "p2",
                "status": "processing",
                "urls": {"get": format!("{}/v1/predictions/p2", server.uri())}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "p2",
                "status": "succeeded",
                "output": "https://replicate.delivery/p2.webp"
            })))
            .mount(&server)
            .await;

        let asset = provider(&server)
            .generate("x", &ImageStyleParams::default())
            .await
            .unwrap();
        assert_eq!(asset.uri, "https://replicate.delivery/p2.webp");
    }

    #[tokio::test]
    async fn test_nsfw_failure_is_content_policy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "p3",
                "status": "failed",
                "error": "NSFW content detected. Try running it again, or try a different prompt."
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate("x", &ImageStyleParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ContentPolicy(_)));
    }
}
