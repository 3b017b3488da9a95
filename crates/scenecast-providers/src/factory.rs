//! Configuration-driven construction of back-end chains.

use std::sync::Arc;
use std::time::Duration;

use scenecast_models::Capability;
use tracing::{info, warn};

use crate::config::{BackendConfig, BackendKind, ProvidersConfig};
use crate::dispatcher::{ImageBackend, TextBackend};
use crate::error::{ProviderError, ProviderResult};
use crate::gemini::GeminiProvider;
use crate::limiter::RateLimiterRegistry;
use crate::openai::OpenAiProvider;
use crate::replicate::ReplicateProvider;
use crate::traits::{TextGenerationProvider, TranscriptionProvider};

type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Resolved chains ready to hand to a dispatcher.
pub struct ProviderChains {
    pub text: Vec<TextBackend>,
    pub image: Vec<ImageBackend>,
    pub transcription: Option<Arc<dyn TranscriptionProvider>>,
}

/// Builds back-ends from [`ProvidersConfig`].
///
/// Back-ends whose credentials are missing are skipped with a warning; a
/// capability whose chain ends up empty is a configuration error.
pub struct ProviderFactory {
    config: ProvidersConfig,
    limiters: Arc<RateLimiterRegistry>,
    call_timeout: Duration,
    env: Box<EnvLookup>,
}

impl ProviderFactory {
    pub fn new(
        config: ProvidersConfig,
        limiters: Arc<RateLimiterRegistry>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            config,
            limiters,
            call_timeout,
            env: Box::new(|key| std::env::var(key).ok().filter(|v| !v.is_empty())),
        }
    }

    /// Replace the environment lookup used to resolve API keys.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    pub fn build(&self) -> ProviderResult<ProviderChains> {
        let chains = ProviderChains {
            text: self.text_chain()?,
            image: self.image_chain()?,
            transcription: self.transcription()?,
        };
        info!(
            text = ?chains.text.iter().map(|b| b.provider.name().to_string()).collect::<Vec<_>>(),
            image = ?chains.image.iter().map(|b| b.provider.name().to_string()).collect::<Vec<_>>(),
            transcription = chains.transcription.is_some(),
            "Provider chains resolved"
        );
        Ok(chains)
    }

    pub fn text_chain(&self) -> ProviderResult<Vec<TextBackend>> {
        let mut chain = Vec::new();
        for name in &self.config.text_chain {
            let backend = self.lookup(name, Capability::Text)?;
            let Some(api_key) = self.api_key(name, backend) else {
                continue;
            };
            let provider: Arc<dyn TextGenerationProvider> = match backend.kind {
                BackendKind::Gemini => Arc::new(GeminiProvider::new(
                    name.clone(),
                    api_key.unwrap_or_default(),
                    backend.base_url(),
                    self.call_timeout,
                )?),
                BackendKind::Openai | BackendKind::Ollama => Arc::new(OpenAiProvider::new(
                    name.clone(),
                    api_key,
                    backend.base_url(),
                    self.call_timeout,
                )?),
                BackendKind::Replicate => unsupported_kind(name, Capability::Text)?,
            };
            let mut entry = TextBackend::new(provider, backend.model.clone());
            if let Some(rpm) = backend.requests_per_minute {
                entry = entry.with_limiter(self.limiters.get_or_insert(name, rpm));
            }
            chain.push(entry);
        }
        if chain.is_empty() {
            return Err(ProviderError::config_error(
                "text chain is empty: configure at least one text back-end with credentials",
            ));
        }
        Ok(chain)
    }

    pub fn image_chain(&self) -> ProviderResult<Vec<ImageBackend>> {
        let mut chain = Vec::new();
        for name in &self.config.image_chain {
            let backend = self.lookup(name, Capability::Image)?;
            let Some(api_key) = self.api_key(name, backend) else {
                continue;
            };
            let provider = ReplicateProvider::new(
                name.clone(),
                api_key.unwrap_or_default(),
                backend.base_url(),
                backend.model.clone(),
                self.call_timeout,
            )?;
            let mut entry = ImageBackend::new(Arc::new(provider));
            if let Some(rpm) = backend.requests_per_minute {
                entry = entry.with_limiter(self.limiters.get_or_insert(name, rpm));
            }
            chain.push(entry);
        }
        if chain.is_empty() {
            return Err(ProviderError::config_error(
                "image chain is empty: configure at least one image back-end with credentials",
            ));
        }
        Ok(chain)
    }

    /// Optional transcription back-end; missing credentials disable it.
    pub fn transcription(&self) -> ProviderResult<Option<Arc<dyn TranscriptionProvider>>> {
        let Some(name) = &self.config.transcription else {
            return Ok(None);
        };
        let backend = self
            .config
            .backends
            .get(name)
            .ok_or_else(|| ProviderError::config_error(format!("unknown back-end '{name}'")))?;
        if !backend.kind.supports_transcription() {
            return Err(ProviderError::config_error(format!(
                "back-end '{name}' ({}) cannot transcribe audio",
                backend.kind.as_str()
            )));
        }
        let Some(api_key) = self.api_key(name, backend) else {
            return Ok(None);
        };
        let mut provider =
            OpenAiProvider::new(name.clone(), api_key, backend.base_url(), self.call_timeout)?;
        if let Some(model) = &self.config.transcription_model {
            provider = provider.with_transcription_model(model.clone());
        }
        Ok(Some(Arc::new(provider)))
    }

    fn lookup(&self, name: &str, capability: Capability) -> ProviderResult<&BackendConfig> {
        let backend = self
            .config
            .backends
            .get(name)
            .ok_or_else(|| ProviderError::config_error(format!("unknown back-end '{name}'")))?;
        let supported = match capability {
            Capability::Text => backend.kind.supports_text(),
            Capability::Image => backend.kind.supports_image(),
        };
        if !supported {
            return Err(ProviderError::config_error(format!(
                "back-end '{name}' ({}) does not support {capability} generation",
                backend.kind.as_str()
            )));
        }
        Ok(backend)
    }

    /// `None` when the back-end must be skipped; `Some(None)` when it needs no key.
    fn api_key(&self, name: &str, backend: &BackendConfig) -> Option<Option<String>> {
        if !backend.kind.requires_api_key() {
            return Some(backend.api_key_env.as_deref().and_then(|k| (self.env)(k)));
        }
        let Some(var) = backend.api_key_env.as_deref() else {
            warn!(backend = %name, "No api_key_env configured, skipping back-end");
            return None;
        };
        match (self.env)(var) {
            Some(key) => Some(Some(key)),
            None => {
                warn!(backend = %name, env = %var, "API key not set, skipping back-end");
                None
            }
        }
    }
}

fn unsupported_kind<T>(name: &str, capability: Capability) -> ProviderResult<T> {
    Err(ProviderError::config_error(format!(
        "back-end '{name}' does not support {capability} generation"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn backend(kind: BackendKind, model: &str, env: Option<&str>) -> BackendConfig {
        BackendConfig {
            kind,
            model: model.to_string(),
            base_url: None,
            api_key_env: env.map(str::to_string),
            requests_per_minute: Some(60),
        }
    }

    fn sample_config() -> ProvidersConfig {
        let mut backends = BTreeMap::new();
        let gemini =
            backend(BackendKind::Gemini, "gemini-1.5-flash-latest", Some("GEMINI_API_KEY"));
        let openai = backend(BackendKind::Openai, "gpt-4o-mini", Some("OPENAI_API_KEY"));
        let replicate = backend(
            BackendKind::Replicate,
            "black-forest-labs/flux-schnell",
            Some("REPLICATE_API_TOKEN"),
        );
        backends.insert("gemini".into(), gemini);
        backends.insert("openai".into(), openai);
        backends.insert("ollama".into(), backend(BackendKind::Ollama, "llama3", None));
        backends.insert("replicate".into(), replicate);
        ProvidersConfig {
            text_chain: vec!["gemini".into(), "openai".into(), "ollama".into()],
            image_chain: vec!["replicate".into()],
            transcription: Some("openai".into()),
            transcription_model: None,
            backends,
        }
    }

    fn factory(keys: &'static [(&'static str, &'static str)]) -> ProviderFactory {
        ProviderFactory::new(
            sample_config(),
            Arc::new(RateLimiterRegistry::new()),
            Duration::from_secs(5),
        )
        .with_env_lookup(move |var| {
            keys.iter()
                .find(|(k, _)| *k == var)
                .map(|(_, v)| v.to_string())
        })
    }

    #[test]
    fn test_missing_keys_skip_backends() {
        let f = factory(&[("REPLICATE_API_TOKEN", "r8")]);
        let chains = f.build().unwrap();
        let names: Vec<_> = chains.text.iter().map(|b| b.provider.name()).collect();
        assert_eq!(names, vec!["ollama"]);
        assert_eq!(chains.image.len(), 1);
        assert!(chains.transcription.is_none());
    }

    #[test]
    fn test_chain_order_preserved() {
        let f = factory(&[
            ("GEMINI_API_KEY", "g"),
            ("OPENAI_API_KEY", "o"),
            ("REPLICATE_API_TOKEN", "r8"),
        ]);
        let chains = f.build().unwrap();
        let names: Vec<_> = chains.text.iter().map(|b| b.provider.name()).collect();
        assert_eq!(names, vec!["gemini", "openai", "ollama"]);
        assert!(chains.transcription.is_some());
        assert_eq!(chains.text[1].model, "gpt-4o-mini");
    }

    #[test]
    fn test_empty_image_chain_is_configuration_error() {
        let f = factory(&[("GEMINI_API_KEY", "g")]);
        let err = f.build().err().unwrap();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_capability_mismatch_is_configuration_error() {
        let mut config = sample_config();
        config.image_chain = vec!["gemini".into()];
        let limiters = Arc::new(RateLimiterRegistry::new());
        let f = ProviderFactory::new(config, limiters, Duration::from_secs(5))
            .with_env_lookup(|_| Some("key".into()));
        assert!(matches!(f.image_chain(), Err(ProviderError::Configuration(_))));
    }

    #[test]
    fn test_limiters_shared_across_factories() {
        let registry = Arc::new(RateLimiterRegistry::new());
        let a = ProviderFactory::new(sample_config(), Arc::clone(&registry), Duration::from_secs(5))
            .with_env_lookup(|_| Some("key".into()));
        let b = ProviderFactory::new(sample_config(), Arc::clone(&registry), Duration::from_secs(5))
            .with_env_lookup(|_| Some("key".into()));
        let chain_a = a.image_chain().unwrap();
        let chain_b = b.image_chain().unwrap();
        assert!(Arc::ptr_eq(
            chain_a[0].limiter.as_ref().unwrap(),
            chain_b[0].limiter.as_ref().unwrap()
        ));
    }
}
