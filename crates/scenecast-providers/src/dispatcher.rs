//! Generation dispatcher: ordered fallback chains with retry.
//!
//! For every back-end in a chain the dispatcher waits on the back-end's
//! shared rate limiter, calls it under a per-call timeout and classifies
//! the outcome. Transient failures are retried on the same back-end with
//! exponential backoff until the retry policy gives up; terminal failures
//! move straight on to the next back-end. When the chain is exhausted the
//! caller receives every back-end's final error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use scenecast_models::{AssetRef, Capability, GenerationRequest, ImageStyleParams};
use tracing::{debug, info, warn};

use crate::error::{BackendFailure, DispatchError, ProviderError, ProviderResult};
use crate::limiter::SharedRateLimiter;
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::traits::{ImageGenerationProvider, TextGenerationProvider};

pub type GenerationResult<T> = Result<T, DispatchError>;

/// A text back-end with the model it should be called with.
#[derive(Clone)]
pub struct TextBackend {
    pub model: String,
    pub provider: Arc<dyn TextGenerationProvider>,
    pub limiter: Option<Arc<SharedRateLimiter>>,
}

impl TextBackend {
    pub fn new(provider: Arc<dyn TextGenerationProvider>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            provider,
            limiter: None,
        }
    }

    pub fn with_limiter(mut self, limiter: Arc<SharedRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }
}

#[derive(Clone)]
pub struct ImageBackend {
    pub provider: Arc<dyn ImageGenerationProvider>,
    pub limiter: Option<Arc<SharedRateLimiter>>,
}

impl ImageBackend {
    pub fn new(provider: Arc<dyn ImageGenerationProvider>) -> Self {
        Self {
            provider,
            limiter: None,
        }
    }

    pub fn with_limiter(mut self, limiter: Arc<SharedRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }
}

/// Executes generation requests against the configured chains.
pub struct Dispatcher {
    text: Vec<TextBackend>,
    image: Vec<ImageBackend>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        text: Vec<TextBackend>,
        image: Vec<ImageBackend>,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            text,
            image,
            retry,
            call_timeout,
        }
    }

    pub fn text_backends(&self) -> Vec<&str> {
        self.text.iter().map(|b| b.provider.name()).collect()
    }

    pub fn image_backends(&self) -> Vec<&str> {
        self.image.iter().map(|b| b.provider.name()).collect()
    }

    /// Run a text request through the text chain.
    pub async fn generate_text(&self, request: &mut GenerationRequest) -> GenerationResult<String> {
        let slots: Vec<_> = self
            .text
            .iter()
            .map(|b| (b.provider.name(), b.limiter.as_deref()))
            .collect();
        let system = request.system_prompt.clone();
        let prompt = request.prompt.clone();

        self.run_chain(Capability::Text, &slots, &mut request.attempt, |idx| {
            let provider = Arc::clone(&self.text[idx].provider);
            let model = self.text[idx].model.clone();
            let system = system.clone();
            let prompt = prompt.clone();
            async move {
                let text = provider.generate(&system, &prompt, &model).await?;
                if text.trim().is_empty() {
                    return Err(ProviderError::malformed("empty completion"));
                }
                Ok(text)
            }
        })
        .await
    }

    /// Run an image request through the image chain.
    pub async fn generate_image(
        &self,
        request: &mut GenerationRequest,
        style: &ImageStyleParams,
    ) -> GenerationResult<AssetRef> {
        let slots: Vec<_> = self
            .image
            .iter()
            .map(|b| (b.provider.name(), b.limiter.as_deref()))
            .collect();
        let prompt = request.prompt.clone();

        self.run_chain(Capability::Image, &slots, &mut request.attempt, |idx| {
            let provider = Arc::clone(&self.image[idx].provider);
            let prompt = prompt.clone();
            let style = style.clone();
            async move { provider.generate(&prompt, &style).await }
        })
        .await
    }

    async fn run_chain<T, F, Fut>(
        &self,
        capability: Capability,
        slots: &[(&str, Option<&SharedRateLimiter>)],
        attempts_made: &mut u32,
        call: F,
    ) -> GenerationResult<T>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        if slots.is_empty() {
            return Err(DispatchError::NoBackends(capability));
        }

        let mut failures = Vec::with_capacity(slots.len());

        for (idx, (name, limiter)) in slots.iter().enumerate() {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                *attempts_made += 1;

                if let Some(limiter) = limiter {
                    limiter.until_ready().await;
                }

                debug!(capability = %capability, backend = %name, attempt, "Calling back-end");
                let outcome = match tokio::time::timeout(self.call_timeout, call(idx)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(self.call_timeout)),
                };

                let error = match outcome {
                    Ok(value) => {
                        metrics::record_call(capability.as_str(), name, "success");
                        if idx > 0 || attempt > 1 {
                            info!(
                                capability = %capability,
                                backend = %name,
                                attempt,
                                "Generation succeeded after fallback or retry"
                            );
                        }
                        return Ok(value);
                    }
                    Err(e) => e,
                };

                let class = error.class();
                metrics::record_call(capability.as_str(), name, class.as_str());

                if self.retry.should_retry(class, attempt) {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        capability = %capability,
                        backend = %name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying same back-end"
                    );
                    metrics::record_retry(name);
                    tokio::time::sleep(delay).await;
                    continue;
                }

                warn!(
                    capability = %capability,
                    backend = %name,
                    attempt,
                    class = %class,
                    error = %error,
                    "Abandoning back-end"
                );
                failures.push(BackendFailure {
                    backend: name.to_string(),
                    attempts: attempt,
                    class,
                    message: error.to_string(),
                });
                break;
            }
        }

        metrics::record_exhausted(capability.as_str());
        Err(DispatchError::Exhausted {
            capability,
            failures,
        })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("text", &self.text_backends())
            .field("image", &self.image_backends())
            .field("retry", &self.retry)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Text back-end that replays a scripted sequence of outcomes.
    struct ScriptedText {
        name: String,
        script: Mutex<VecDeque<ProviderResult<String>>>,
        calls: AtomicU32,
        delay: Option<Duration>,
    }

    impl ScriptedText {
        fn new(name: &str, script: Vec<ProviderResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
                delay: None,
            })
        }

        fn slow(name: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                script: Mutex::new(VecDeque::new()),
                calls: AtomicU32::new(0),
                delay: Some(delay),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerationProvider for ScriptedText {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _model: &str,
        ) -> ProviderResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(format!("{} default", self.name)))
        }
    }

    struct FixedImage {
        result: fn() -> ProviderResult<AssetRef>,
    }

    #[async_trait]
    impl ImageGenerationProvider for FixedImage {
        fn name(&self) -> &str {
            "fixed-image"
        }

        async fn generate(
            &self,
            _prompt: &str,
            _style: &ImageStyleParams,
        ) -> ProviderResult<AssetRef> {
            (self.result)()
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
    }

    fn text_dispatcher(backends: Vec<Arc<ScriptedText>>, retry: RetryPolicy) -> Dispatcher {
        let chain = backends
            .into_iter()
            .map(|b| TextBackend::new(b as Arc<dyn TextGenerationProvider>, "model"))
            .collect();
        Dispatcher::new(chain, Vec::new(), retry, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_transient_failures_then_success_stay_on_first_backend() {
        let a = ScriptedText::new(
            "a",
            vec![
                Err(ProviderError::RateLimited("429".into())),
                Err(ProviderError::Unavailable("503".into())),
                Ok("from a".into()),
            ],
        );
        let b = ScriptedText::new("b", vec![Ok("from b".into())]);
        let dispatcher = text_dispatcher(vec![a.clone(), b.clone()], fast_retry(3));

        let mut request = GenerationRequest::text("sys", "user");
        let result = dispatcher.generate_text(&mut request).await.unwrap();

        assert_eq!(result, "from a");
        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 0);
        assert_eq!(request.attempt, 3);
    }

    #[tokio::test]
    async fn test_terminal_failure_advances_immediately() {
        let a = ScriptedText::new(
            "a",
            vec![Err(ProviderError::InvalidCredentials("401".into()))],
        );
        let b = ScriptedText::new("b", vec![Ok("from b".into())]);
        let dispatcher = text_dispatcher(vec![a.clone(), b.clone()], fast_retry(3));

        let mut request = GenerationRequest::text("sys", "user");
        let result = dispatcher.generate_text(&mut request).await.unwrap();

        assert_eq!(result, "from b");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_limit_then_advance() {
        let a = ScriptedText::new(
            "a",
            vec![
                Err(ProviderError::RateLimited("429".into())),
                Err(ProviderError::RateLimited("429".into())),
            ],
        );
        let b = ScriptedText::new("b", vec![Ok("from b".into())]);
        let dispatcher = text_dispatcher(vec![a.clone(), b.clone()], fast_retry(2));

        let mut request = GenerationRequest::text("sys", "user");
        assert_eq!(dispatcher.generate_text(&mut request).await.unwrap(), "from b");
        assert_eq!(a.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_chain_enumerates_every_backend() {
        let a = ScriptedText::new("a", vec![Err(ProviderError::malformed("not json"))]);
        let b = ScriptedText::new(
            "b",
            vec![Err(ProviderError::content_policy("blocked"))],
        );
        let dispatcher = text_dispatcher(vec![a, b], fast_retry(3));

        let mut request = GenerationRequest::text("sys", "user");
        let err = dispatcher.generate_text(&mut request).await.unwrap_err();

        let failures = err.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].backend, "a");
        assert_eq!(failures[1].backend, "b");
        assert!(failures.iter().all(|f| f.class == ErrorClass::Terminal));
    }

    #[tokio::test]
    async fn test_empty_completion_is_terminal() {
        let a = ScriptedText::new("a", vec![Ok("   ".into())]);
        let b = ScriptedText::new("b", vec![Ok("usable".into())]);
        let dispatcher = text_dispatcher(vec![a.clone(), b], fast_retry(3));

        let mut request = GenerationRequest::text("sys", "user");
        assert_eq!(dispatcher.generate_text(&mut request).await.unwrap(), "usable");
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_call_timeout_is_transient_and_bounded() {
        let slow = ScriptedText::slow("slow", Duration::from_millis(200));
        let fallback = ScriptedText::new("fallback", vec![Ok("fast".into())]);
        let chain = vec![
            TextBackend::new(slow.clone() as Arc<dyn TextGenerationProvider>, "m"),
            TextBackend::new(fallback as Arc<dyn TextGenerationProvider>, "m"),
        ];
        let dispatcher =
            Dispatcher::new(chain, Vec::new(), fast_retry(2), Duration::from_millis(20));

        let mut request = GenerationRequest::text("sys", "user");
        assert_eq!(dispatcher.generate_text(&mut request).await.unwrap(), "fast");
        assert_eq!(slow.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_backends() {
        let dispatcher =
            Dispatcher::new(Vec::new(), Vec::new(), fast_retry(1), Duration::from_secs(1));
        let mut request = GenerationRequest::text("sys", "user");
        let err = dispatcher
            .generate_image(&mut request, &ImageStyleParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoBackends(Capability::Image)));
    }

    #[tokio::test]
    async fn test_image_chain_success() {
        let image = ImageBackend::new(Arc::new(FixedImage {
            result: || Ok(AssetRef::new("https://cdn/scene.webp")),
        }));
        let dispatcher =
            Dispatcher::new(Vec::new(), vec![image], fast_retry(1), Duration::from_secs(1));
        let mut request = GenerationRequest::text("", "a bishop");
        let asset = dispatcher
            .generate_image(&mut request, &ImageStyleParams::default())
            .await
            .unwrap();
        assert_eq!(asset.uri, "https://cdn/scene.webp");
    }
}
