//! Character dossier builder and the per-project single-flight registry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use scenecast_models::{Capability, CharacterDossier, Project, ProjectId};
use scenecast_providers::Dispatcher;
use scenecast_script::{parse_dossier_sections, PromptCompiler, SceneBindings, TemplateLibrary};

use crate::metrics;

/// Builds attempts before falling back to placeholders.
const MAX_BUILD_ATTEMPTS: usize = 2;

/// Requests the four-section dossier from the text chain.
///
/// Never fails: an unusable response is retried once, after which the
/// project gets an all-placeholder dossier flagged as degraded.
pub struct DossierBuilder {
    dispatcher: Arc<Dispatcher>,
    templates: Arc<TemplateLibrary>,
}

impl DossierBuilder {
    pub fn new(dispatcher: Arc<Dispatcher>, templates: Arc<TemplateLibrary>) -> Self {
        Self {
            dispatcher,
            templates,
        }
    }

    pub async fn build(&self, project: &Project) -> CharacterDossier {
        let subject = project
            .settings
            .subject
            .clone()
            .unwrap_or_else(|| project.title.clone());
        let bindings = SceneBindings::new()
            .project(&project.title, &project.context)
            .set("subject", subject)
            .into_map();
        let compiled =
            PromptCompiler::compile(self.templates.dossier(), &bindings, Capability::Text);

        for attempt in 1..=MAX_BUILD_ATTEMPTS {
            let mut request = compiled.request.clone();
            match self.dispatcher.generate_text(&mut request).await {
                Ok(text) => {
                    let dossier = CharacterDossier::from_sections(parse_dossier_sections(&text));
                    if dossier.is_usable() {
                        info!(project_id = %project.id, attempt, "Character dossier built");
                        let outcome = if attempt == 1 { "usable" } else { "retried" };
                        metrics::record_dossier_build(outcome);
                        return dossier;
                    }
                    warn!(
                        project_id = %project.id,
                        attempt,
                        "Dossier response has no adulthood section"
                    );
                }
                Err(e) => {
                    warn!(
                        project_id = %project.id,
                        attempt,
                        error = %e,
                        "Dossier generation failed"
                    );
                }
            }
        }

        warn!(project_id = %project.id, "Using placeholder dossier (degraded mode)");
        metrics::record_dossier_build("placeholder");
        CharacterDossier::placeholder()
    }
}

/// One dossier per project, built at most once.
///
/// Concurrent requesters for the same project share a single in-flight
/// build and all receive the same `Arc`.
#[derive(Default)]
pub struct DossierRegistry {
    cells: Mutex<HashMap<ProjectId, Arc<OnceCell<Arc<CharacterDossier>>>>>,
}

impl DossierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the project's dossier, running `build` only if no build has
    /// completed or started yet.
    pub async fn get_or_build<F, Fut>(&self, id: &ProjectId, build: F) -> Arc<CharacterDossier>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CharacterDossier>,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            Arc::clone(cells.entry(id.clone()).or_default())
        };
        let dossier = cell
            .get_or_init(|| async {
                debug!(project_id = %id, "Building dossier");
                Arc::new(build().await)
            })
            .await;
        Arc::clone(dossier)
    }

    /// Install an existing dossier. Returns false if one is already present.
    pub async fn seed(&self, id: &ProjectId, dossier: CharacterDossier) -> bool {
        let mut cells = self.cells.lock().await;
        cells
            .entry(id.clone())
            .or_default()
            .set(Arc::new(dossier))
            .is_ok()
    }

    /// Drop the project's dossier so the next request rebuilds it.
    ///
    /// Requesters already waiting on an in-flight build still receive it.
    pub async fn invalidate(&self, id: &ProjectId) {
        if self.cells.lock().await.remove(id).is_some() {
            info!(project_id = %id, "Dossier invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use scenecast_models::LifeStage;
    use scenecast_providers::{
        ProviderError, ProviderResult, RetryPolicy, TextBackend, TextGenerationProvider,
    };

    const FULL_RESPONSE: &str = "CHILDHOOD: A thin boy with dark curls.\n\
        YOUTH: A tall student in a wool tunic.\n\
        ADULTHOOD: A bearded bishop in a red cope.\n\
        ELDER: A frail old man with a white beard.";

    /// Returns queued responses in order, counting calls.
    struct ScriptedText {
        responses: std::sync::Mutex<Vec<ProviderResult<String>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedText {
        fn new(responses: Vec<ProviderResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: std::sync::Mutex::new(responses),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(response: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                responses: std::sync::Mutex::new(vec![Ok(response.to_string())]),
                calls: AtomicUsize::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl TextGenerationProvider for ScriptedText {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _model: &str,
        ) -> ProviderResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                match responses.first() {
                    Some(Ok(text)) => Ok(text.clone()),
                    _ => Err(ProviderError::content_policy("blocked")),
                }
            }
        }
    }

    fn builder(provider: Arc<ScriptedText>) -> DossierBuilder {
        let dispatcher = Dispatcher::new(
            vec![TextBackend::new(provider, "test-model")],
            Vec::new(),
            RetryPolicy::new(1),
            Duration::from_secs(5),
        );
        DossierBuilder::new(Arc::new(dispatcher), Arc::new(TemplateLibrary::builtin()))
    }

    fn project() -> Project {
        Project::new("San Blas", "texto").with_context("obispo de Sebaste, siglo IV")
    }

    #[tokio::test]
    async fn test_build_parses_sections() {
        let provider = ScriptedText::new(vec![Ok(FULL_RESPONSE.to_string())]);
        let dossier = builder(Arc::clone(&provider)).build(&project()).await;

        assert!(!dossier.is_degraded());
        assert!(dossier.excerpt(LifeStage::Adulthood).contains("bishop"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_section_gets_placeholder() {
        let provider = ScriptedText::new(vec![Ok(
            "ADULTHOOD: A bearded bishop.\nELDER: An old man.".to_string()
        )]);
        let dossier = builder(provider).build(&project()).await;

        assert!(dossier.is_placeholder(LifeStage::Childhood));
        assert!(!dossier.is_placeholder(LifeStage::Adulthood));
        assert!(!dossier.is_degraded());
    }

    #[tokio::test]
    async fn test_unusable_response_is_retried_once() {
        let provider = ScriptedText::new(vec![
            Ok("CHILDHOOD: A small boy.".to_string()),
            Ok(FULL_RESPONSE.to_string()),
        ]);
        let dossier = builder(Arc::clone(&provider)).build(&project()).await;

        assert!(dossier.is_usable());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_falls_back_to_placeholder_dossier() {
        let provider = ScriptedText::new(vec![Err(ProviderError::content_policy("blocked"))]);
        let dossier = builder(Arc::clone(&provider)).build(&project()).await;

        assert!(dossier.is_degraded());
        assert!(LifeStage::ALL.iter().all(|s| dossier.is_placeholder(*s)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), MAX_BUILD_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_build() {
        let provider = ScriptedText::slow(FULL_RESPONSE, Duration::from_millis(50));
        let builder = Arc::new(builder(Arc::clone(&provider)));
        let registry = Arc::new(DossierRegistry::new());
        let project = Arc::new(project());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let builder = Arc::clone(&builder);
            let registry = Arc::clone(&registry);
            let project = Arc::clone(&project);
            handles.push(tokio::spawn(async move {
                registry
                    .get_or_build(&project.id, || async { builder.build(&project).await })
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|d| Arc::ptr_eq(d, &results[0])));
    }

    #[tokio::test]
    async fn test_seed_prevents_build_and_invalidate_forces_rebuild() {
        let registry = DossierRegistry::new();
        let id = ProjectId::from_string("p1");
        let builds = AtomicUsize::new(0);

        assert!(registry.seed(&id, CharacterDossier::placeholder()).await);
        assert!(!registry.seed(&id, CharacterDossier::placeholder()).await);

        let seeded = registry
            .get_or_build(&id, || async {
                builds.fetch_add(1, Ordering::SeqCst);
                CharacterDossier::from_sections(Default::default())
            })
            .await;
        assert!(seeded.is_degraded());
        assert_eq!(builds.load(Ordering::SeqCst), 0);

        registry.invalidate(&id).await;

        let rebuilt = registry
            .get_or_build(&id, || async {
                builds.fetch_add(1, Ordering::SeqCst);
                CharacterDossier::from_sections(Default::default())
            })
            .await;
        assert!(!rebuilt.is_degraded());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }
}
