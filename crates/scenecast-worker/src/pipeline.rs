//! Per-project pipeline.
//!
//! Stages run in order inside one job: validation, optional transcription,
//! alignment, segmentation, the dossier barrier, then per-scene stage
//! detection, prompt compilation and image dispatch fanned out up to
//! `max_scene_parallel`, and finally the assembly handoff. Cancellation is
//! checked between stages and before each scene starts; an external call in
//! flight is never interrupted.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use scenecast_models::{
    transcript_duration, validate_segments, AssetRef, Capability, CharacterDossier,
    HistoricalContext, LifeStage, Project, ProjectId, ProjectStatus, PromptTemplate, Scene,
    SceneFailure, SceneStatus, SegmentationSettings, TIME_EPSILON,
};
use scenecast_providers::{Dispatcher, TranscriptionProvider, VideoAssembler};
use scenecast_script::prompt::apply_constraints;
use scenecast_script::text::{collapse_whitespace, split_paragraphs};
use scenecast_script::{
    estimated_alignment, infer_historical_context, proportional_alignment, Alignment,
    AlignmentError, PromptCompiler, SceneBindings, SceneSegmenter, StageDetector,
    TemplateLibrary, TranscriptAligner,
};
use scenecast_storage::ProjectStore;

use crate::config::PipelineConfig;
use crate::dossier::{DossierBuilder, DossierRegistry};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Shared, immutable state every job runs against.
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub dispatcher: Arc<Dispatcher>,
    pub transcriber: Option<Arc<dyn TranscriptionProvider>>,
    pub assembler: Option<Arc<dyn VideoAssembler>>,
    pub store: ProjectStore,
    pub dossiers: Arc<DossierRegistry>,
    pub templates: Arc<TemplateLibrary>,
    pub detector: StageDetector,
    pub max_scene_parallel: usize,
}

impl PipelineContext {
    pub fn new(
        config: Arc<PipelineConfig>,
        dispatcher: Arc<Dispatcher>,
        store: ProjectStore,
    ) -> Self {
        let detector = StageDetector::from_settings(&config.stage_detection);
        Self {
            config,
            dispatcher,
            transcriber: None,
            assembler: None,
            store,
            dossiers: Arc::new(DossierRegistry::new()),
            templates: Arc::new(TemplateLibrary::builtin()),
            detector,
            max_scene_parallel: 2,
        }
    }

    pub fn with_transcriber(mut self, transcriber: Option<Arc<dyn TranscriptionProvider>>) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn with_assembler(mut self, assembler: Arc<dyn VideoAssembler>) -> Self {
        self.assembler = Some(assembler);
        self
    }

    pub fn with_templates(mut self, templates: TemplateLibrary) -> Self {
        self.templates = Arc::new(templates);
        self
    }

    pub fn with_max_scene_parallel(mut self, max: usize) -> Self {
        self.max_scene_parallel = max.max(1);
        self
    }
}

/// What a project run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectOutcome {
    pub scenes_total: usize,
    pub scenes_generated: usize,
    pub scene_failures: Vec<SceneFailure>,
    pub warnings: Vec<String>,
    /// Stopped early at a stage boundary
    pub cancelled: bool,
    /// Reference returned by the assembler
    pub output: Option<String>,
    pub assembly_error: Option<String>,
    /// Final state could not be written; scene results are still reported
    pub persistence_error: Option<String>,
}

/// Runs one project to completion. The scheduler only sees this seam.
#[async_trait]
pub trait ProjectRunner: Send + Sync {
    async fn run(
        &self,
        project_id: &ProjectId,
        cancel: CancellationToken,
        logger: &JobLogger,
    ) -> WorkerResult<ProjectOutcome>;
}

pub struct ProjectPipeline {
    ctx: Arc<PipelineContext>,
    dossier_builder: DossierBuilder,
}

/// Result of rendering one scene.
struct SceneRender {
    index: usize,
    stage: LifeStage,
    prompt: String,
    result: Result<AssetRef, String>,
    warnings: Vec<String>,
}

impl ProjectPipeline {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let dossier_builder =
            DossierBuilder::new(Arc::clone(&ctx.dispatcher), Arc::clone(&ctx.templates));
        Self {
            ctx,
            dossier_builder,
        }
    }

    /// Reject projects that cannot start. Every error here is a configuration error.
    fn validate(&self, project: &Project) -> WorkerResult<SegmentationSettings> {
        if split_paragraphs(&project.script).is_empty() {
            return Err(WorkerError::config_error(format!(
                "project {} has no script text",
                project.id
            )));
        }
        if let Some(name) = &project.settings.variable_set {
            if self.ctx.config.variable_set(name).is_none() {
                return Err(WorkerError::config_error(format!(
                    "project {} refers to unknown variable set '{name}'",
                    project.id
                )));
            }
        }
        let segmentation = project
            .settings
            .segmentation
            .clone()
            .unwrap_or_else(|| self.ctx.config.segmentation.clone());
        segmentation.validate().map_err(|e| {
            WorkerError::config_error(format!("project {} segmentation: {e}", project.id))
        })?;
        validate_segments(&project.segments, TIME_EPSILON).map_err(|e| {
            WorkerError::config_error(format!("project {} has invalid segments: {e}", project.id))
        })?;
        Ok(segmentation)
    }

    /// Transcribe narrated audio when no segments were supplied.
    async fn transcribe_if_needed(
        &self,
        project: &mut Project,
        warnings: &mut Vec<String>,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let (Some(audio), Some(transcriber)) = (&project.audio, &self.ctx.transcriber) else {
            return Ok(());
        };
        if !project.segments.is_empty() {
            return Ok(());
        }

        logger.log_progress(&format!("transcribing {audio} with {}", transcriber.name()));
        match transcriber.transcribe(audio).await {
            Ok(segments) => {
                validate_segments(&segments, TIME_EPSILON)?;
                self.ctx.store.save_segments(&project.id, &segments).await?;
                project.segments = segments;
            }
            Err(e) => {
                let msg = format!("transcription failed, estimating timing from text: {e}");
                logger.log_warning(&msg);
                warnings.push(msg);
            }
        }
        Ok(())
    }

    fn align(&self, project: &Project, settings: &SegmentationSettings) -> Alignment {
        let paragraphs = split_paragraphs(&project.script);
        if project.segments.is_empty() {
            metrics::record_alignment_fallback("estimated");
            let mut alignment = estimated_alignment(&paragraphs, settings.words_per_second);
            alignment
                .warnings
                .push("no transcription; durations estimated from word count".into());
            return alignment;
        }

        let aligner = TranscriptAligner::new(self.ctx.config.alignment.clone());
        match aligner.align(&project.segments, &paragraphs) {
            Ok(alignment) => alignment,
            Err(AlignmentError::InsufficientCoverage { coverage, minimum }) => {
                metrics::record_alignment_fallback("proportional");
                let mut alignment =
                    proportional_alignment(&paragraphs, transcript_duration(&project.segments));
                alignment.warnings.push(format!(
                    "alignment coverage {coverage:.2} below {minimum:.2}; using proportional timing"
                ));
                alignment
            }
            Err(e) => {
                metrics::record_alignment_fallback("estimated");
                let mut alignment = estimated_alignment(&paragraphs, settings.words_per_second);
                alignment
                    .warnings
                    .push(format!("{e}; durations estimated from word count"));
                alignment
            }
        }
    }

    async fn write_alignment_artifact(&self, id: &ProjectId, alignment: &Alignment) {
        let spans: Vec<_> = alignment
            .spans
            .iter()
            .map(|s| {
                serde_json::json!({
                    "start": s.start,
                    "end": s.end,
                    "matched": s.matched,
                    "words": s.text.split_whitespace().count(),
                })
            })
            .collect();
        let body = serde_json::json!({
            "total_duration": alignment.total_duration,
            "coverage": alignment.coverage,
            "warnings": alignment.warnings,
            "spans": spans,
        });
        let result = async {
            let dir = self.ctx.store.transient_dir(id).await?;
            tokio::fs::write(dir.join("alignment.json"), serde_json::to_vec_pretty(&body)?).await?;
            Ok::<_, WorkerError>(())
        }
        .await;
        if let Err(e) = result {
            debug!(project_id = %id, error = %e, "Could not write alignment artifact");
        }
    }

    /// Explicit settings win, then the named variable set, then whatever the
    /// context string reveals for historically precise projects.
    fn historical_context(&self, project: &Project) -> HistoricalContext {
        let mut ctx = project.settings.historical.clone();
        if let Some(set) = project
            .settings
            .variable_set
            .as_deref()
            .and_then(|name| self.ctx.config.variable_set(name))
        {
            ctx = ctx.merged_with(set);
        }
        if project.settings.style.is_historical() {
            ctx = ctx.merged_with(&infer_historical_context(&project.context));
        }
        ctx
    }

    async fn render_scene(
        &self,
        project: &Project,
        scene: &Scene,
        template: &PromptTemplate,
        dossier: &CharacterDossier,
        historical: &HistoricalContext,
    ) -> SceneRender {
        let mut warnings = Vec::new();
        let stage = self.ctx.detector.detect(&scene.text);

        let bindings = SceneBindings::new()
            .scene(&scene.text)
            .character(stage, dossier.excerpt(stage))
            .project(&project.title, &project.context)
            .theme(historical.theme.as_deref())
            .historical(historical)
            .into_map();
        let compiled = PromptCompiler::compile(template, &bindings, Capability::Image);
        for error in &compiled.errors {
            warnings.push(format!("scene {}: {error}", scene.index));
        }
        let mut request = compiled.request;

        if project.settings.prompt_refinement {
            let refine_bindings = SceneBindings::new()
                .set("prompt", request.prompt.clone())
                .into_map();
            let mut refine = PromptCompiler::compile(
                self.ctx.templates.refinement(),
                &refine_bindings,
                Capability::Text,
            )
            .request;
            match self.ctx.dispatcher.generate_text(&mut refine).await {
                Ok(text) => {
                    request.prompt =
                        apply_constraints(&collapse_whitespace(&text), &template.constraints);
                }
                Err(e) => warnings.push(format!(
                    "scene {}: prompt refinement failed, using compiled prompt: {e}",
                    scene.index
                )),
            }
        }

        debug!(
            project_id = %project.id,
            scene_index = scene.index,
            stage = %stage,
            "Dispatching scene"
        );
        let result = self
            .ctx
            .dispatcher
            .generate_image(&mut request, &project.settings.image_style)
            .await
            .map_err(|e| e.to_string());

        SceneRender {
            index: scene.index,
            stage,
            prompt: request.prompt,
            result,
            warnings,
        }
    }

    async fn finish(
        &self,
        project: &mut Project,
        segmentation: &SegmentationSettings,
        mut outcome: ProjectOutcome,
        logger: &JobLogger,
    ) -> ProjectOutcome {
        project.refresh_status();
        if outcome.cancelled {
            project.status = ProjectStatus::Cancelled;
        }
        let saved = async {
            self.ctx
                .store
                .save_scenes(&project.id, &project.scenes, Some(segmentation))
                .await?;
            self.ctx.store.save_manifest(project).await
        }
        .await;
        if let Err(e) = saved {
            let msg = format!("could not persist project state: {e}");
            logger.log_error(&msg);
            outcome.warnings.push(msg.clone());
            outcome.persistence_error = Some(msg);
        }

        outcome.scenes_total = project.scenes.len();
        outcome.scenes_generated = project.generated_count();
        outcome.scene_failures = project
            .scenes
            .iter()
            .filter(|s| s.status == SceneStatus::Failed)
            .map(|s| SceneFailure {
                scene_index: s.index,
                error: s.error.clone().unwrap_or_default(),
            })
            .collect();
        outcome
    }
}

/// Keep assets from an earlier run whose scenes are unchanged.
fn carry_over(previous: &[Scene], scenes: &mut [Scene]) -> usize {
    let mut kept = 0;
    for scene in scenes.iter_mut() {
        let Some(old) = previous.get(scene.index) else {
            continue;
        };
        let same = old.text == scene.text
            && (old.start_time - scene.start_time).abs() <= TIME_EPSILON
            && (old.end_time - scene.end_time).abs() <= TIME_EPSILON;
        if same && old.status == SceneStatus::Generated {
            *scene = old.clone();
            kept += 1;
        }
    }
    kept
}

#[async_trait]
impl ProjectRunner for ProjectPipeline {
    async fn run(
        &self,
        project_id: &ProjectId,
        cancel: CancellationToken,
        logger: &JobLogger,
    ) -> WorkerResult<ProjectOutcome> {
        let mut project = self.ctx.store.load(project_id).await?;
        let segmentation = self.validate(&project)?;
        let mut outcome = ProjectOutcome::default();

        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return Ok(outcome);
        }

        self.transcribe_if_needed(&mut project, &mut outcome.warnings, logger)
            .await?;

        let alignment = self.align(&project, &segmentation);
        for warning in &alignment.warnings {
            logger.log_warning(warning);
        }
        outcome.warnings.extend(alignment.warnings.iter().cloned());
        self.write_alignment_artifact(&project.id, &alignment).await;

        let mut scenes = SceneSegmenter::new(segmentation.clone()).segment(&alignment.spans);
        let kept = carry_over(&project.scenes, &mut scenes);
        logger.log_progress(&format!(
            "{} scenes over {:.1}s ({} already generated)",
            scenes.len(),
            alignment.total_duration,
            kept
        ));
        project.scenes = scenes;
        project.status = ProjectStatus::Segmented;
        self.ctx
            .store
            .save_scenes(&project.id, &project.scenes, Some(&segmentation))
            .await?;
        self.ctx.store.save_manifest(&project).await?;

        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return Ok(self.finish(&mut project, &segmentation, outcome, logger).await);
        }

        // Dossier barrier: every scene waits for the single build.
        let had_dossier = match project.dossier.take() {
            Some(existing) => {
                self.ctx.dossiers.seed(&project.id, existing).await;
                true
            }
            None => false,
        };
        let dossier = self
            .ctx
            .dossiers
            .get_or_build(&project.id, || self.dossier_builder.build(&project))
            .await;
        if !had_dossier {
            if let Err(e) = self.ctx.store.save_dossier(&project.id, &dossier).await {
                let msg = format!("could not persist dossier: {e}");
                logger.log_warning(&msg);
                outcome.warnings.push(msg);
            }
        }
        if dossier.is_degraded() {
            let msg = "character dossier unavailable; using placeholder descriptions";
            logger.log_warning(msg);
            outcome.warnings.push(msg.to_string());
        }
        project.dossier = Some(dossier.as_ref().clone());

        let historical = self.historical_context(&project);
        let fallback_template;
        let template = match self.ctx.templates.for_style(project.settings.style) {
            Ok(template) => template,
            Err(e) => {
                let msg = format!("{e}; using bare scene text");
                logger.log_warning(&msg);
                outcome.warnings.push(msg);
                fallback_template = PromptTemplate::new("minimal", "{scene_text}");
                &fallback_template
            }
        };

        let pending: Vec<Scene> = project
            .scenes
            .iter()
            .filter(|s| s.status != SceneStatus::Generated)
            .cloned()
            .collect();
        let project_ref = &project;
        let mut renders = stream::iter(pending)
            .map(|scene| {
                let cancel = cancel.clone();
                let dossier = Arc::clone(&dossier);
                let historical = &historical;
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(
                        self.render_scene(project_ref, &scene, template, &dossier, historical)
                            .await,
                    )
                }
            })
            .buffer_unordered(self.ctx.max_scene_parallel.max(1));

        let mut rendered = Vec::new();
        while let Some(render) = renders.next().await {
            if let Some(render) = render {
                rendered.push(render);
            }
        }
        drop(renders);

        for render in rendered {
            let Some(scene) = project.scenes.get_mut(render.index) else {
                continue;
            };
            for warning in &render.warnings {
                logger.log_warning(warning);
            }
            outcome.warnings.extend(render.warnings);
            scene.stage = Some(render.stage);
            scene.prompt = Some(render.prompt);
            match render.result {
                Ok(asset) => {
                    metrics::record_scene(SceneStatus::Generated.as_str());
                    scene.mark_generated(asset);
                }
                Err(error) => {
                    metrics::record_scene(SceneStatus::Failed.as_str());
                    logger.log_warning(&format!("scene {} failed: {error}", scene.index));
                    scene.mark_failed(error);
                }
            }
        }

        if cancel.is_cancelled() {
            outcome.cancelled = true;
        }
        let mut outcome = self.finish(&mut project, &segmentation, outcome, logger).await;

        if !outcome.cancelled && outcome.scenes_generated > 0 {
            if let Some(assembler) = &self.ctx.assembler {
                let generated: Vec<Scene> = project
                    .scenes
                    .iter()
                    .filter(|s| s.status == SceneStatus::Generated)
                    .cloned()
                    .collect();
                match assembler
                    .render(&generated, project.audio.as_deref(), &self.ctx.config.render)
                    .instrument(logger.create_span())
                    .await
                {
                    Ok(output) => outcome.output = Some(output),
                    Err(e) => {
                        let msg = format!("assembly failed: {e}");
                        logger.log_error(&msg);
                        outcome.assembly_error = Some(msg);
                    }
                }
            }
        }

        Ok(outcome)
    }
}
