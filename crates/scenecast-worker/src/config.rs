//! Worker and pipeline configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use scenecast_models::{HistoricalContext, SegmentationSettings};
use scenecast_providers::{ProvidersConfig, RenderSpec, RetrySettings};
use scenecast_script::{AlignmentSettings, StageDetectionSettings};

use crate::error::{WorkerError, WorkerResult};

/// Bundled pipeline defaults.
const DEFAULT_PIPELINE_CONFIG: &str = include_str!("../config/default.toml");

/// Process-level knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs running at the same time
    pub max_parallel_videos: usize,
    /// Image requests in flight per job
    pub max_scene_parallel: usize,
    /// Remove transient artifacts once a job is terminal
    pub auto_cleanup: bool,
    pub job_timeout: Duration,
    /// Timeout for a single back-end call
    pub call_timeout: Duration,
    pub projects_dir: PathBuf,
    /// Optional pipeline TOML layered over the bundled defaults
    pub pipeline_config: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_parallel_videos: 3,
            max_scene_parallel: 2,
            auto_cleanup: true,
            job_timeout: Duration::from_secs(3600), // 1 hour
            call_timeout: Duration::from_secs(120),
            projects_dir: PathBuf::from("projects"),
            pipeline_config: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_parallel_videos: std::env::var("SCENECAST_MAX_PARALLEL_VIDEOS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            max_scene_parallel: std::env::var("SCENECAST_MAX_SCENE_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            auto_cleanup: std::env::var("SCENECAST_AUTO_CLEANUP")
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(true),
            job_timeout: Duration::from_secs(
                std::env::var("SCENECAST_JOB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            call_timeout: Duration::from_secs(
                std::env::var("SCENECAST_CALL_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            projects_dir: std::env::var("SCENECAST_PROJECTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("projects")),
            pipeline_config: std::env::var("SCENECAST_CONFIG").ok().map(PathBuf::from),
        }
        .normalized()
    }

    /// Clamp the parallelism knobs: at least one job, and a per-job scene
    /// fan-out no larger than the job bound.
    pub fn normalized(mut self) -> Self {
        self.max_parallel_videos = self.max_parallel_videos.max(1);
        self.max_scene_parallel = self.max_scene_parallel.clamp(1, self.max_parallel_videos);
        self
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Pipeline behaviour shared by every job of a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub providers: ProvidersConfig,
    pub retry: RetrySettings,
    pub alignment: AlignmentSettings,
    /// Defaults for projects without their own segmentation settings
    pub segmentation: SegmentationSettings,
    pub stage_detection: StageDetectionSettings,
    pub render: RenderSpec,
    /// Named historical/style variable sets projects can refer to
    pub variable_sets: BTreeMap<String, HistoricalContext>,
}

impl PipelineConfig {
    /// Load configuration with precedence: environment > user file > bundled default.
    ///
    /// Environment overrides use `SCENECAST_<SECTION>__<KEY>`, for example
    /// `SCENECAST_RETRY__MAX_ATTEMPTS=5`.
    pub fn load(path: Option<&Path>) -> WorkerResult<Self> {
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_PIPELINE_CONFIG, FileFormat::Toml));

        if let Some(path) = path {
            if !path.exists() {
                return Err(WorkerError::config_error(format!(
                    "pipeline config {} does not exist",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("SCENECAST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document layered over the bundled defaults.
    pub fn from_toml_str(overrides: &str) -> WorkerResult<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(DEFAULT_PIPELINE_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(overrides, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WorkerResult<()> {
        self.segmentation
            .validate()
            .map_err(|e| WorkerError::config_error(format!("segmentation: {e}")))?;
        if self.retry.max_attempts == 0 {
            return Err(WorkerError::config_error("retry.max_attempts must be at least 1"));
        }
        for name in self
            .providers
            .text_chain
            .iter()
            .chain(&self.providers.image_chain)
        {
            if !self.providers.backends.contains_key(name) {
                return Err(WorkerError::config_error(format!(
                    "chain refers to unknown back-end '{name}'"
                )));
            }
        }
        Ok(())
    }

    pub fn variable_set(&self, name: &str) -> Option<&HistoricalContext> {
        self.variable_sets.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenecast_models::SegmentationMode;
    use scenecast_providers::BackendKind;

    #[test]
    fn test_bundled_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.providers.text_chain, vec!["gemini", "openai", "ollama"]);
        assert_eq!(config.providers.backends["replicate"].kind, BackendKind::Replicate);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.segmentation.mode, SegmentationMode::Hybrid);
        assert_eq!(config.segmentation.min_scene_duration, 8.0);
        assert_eq!(config.alignment.min_coverage, 0.5);
        assert!(config.variable_set("early_christian").is_some());
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [segmentation]
            mode = "by_paragraph"

            [stage_detection]
            domain = "religious"

            [variable_sets.custom]
            period = "1810s"
            "#,
        )
        .unwrap();
        assert_eq!(config.segmentation.mode, SegmentationMode::ByParagraph);
        assert_eq!(config.segmentation.max_scene_duration, 15.0);
        assert_eq!(
            config.variable_set("custom").and_then(|v| v.period.as_deref()),
            Some("1810s")
        );
    }

    #[test]
    fn test_rejects_inverted_scene_bounds() {
        let err = PipelineConfig::from_toml_str(
            "[segmentation]\nmin_scene_duration = 20.0\nmax_scene_duration = 10.0\n",
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_tiny_fixed_interval() {
        let err = PipelineConfig::from_toml_str("[segmentation]\nfixed_interval = 1e-9\n")
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("fixed_interval"));
    }

    #[test]
    fn test_rejects_unknown_chain_member() {
        let err =
            PipelineConfig::from_toml_str("[providers]\nimage_chain = [\"dalle\"]\n").unwrap_err();
        assert!(err.to_string().contains("dalle"));
    }

    #[test]
    fn test_missing_user_file_is_configuration_error() {
        let err = PipelineConfig::load(Some(Path::new("/nonexistent/scenecast.toml"))).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_worker_config_clamps_scene_parallelism() {
        let config = WorkerConfig {
            max_parallel_videos: 2,
            max_scene_parallel: 8,
            ..WorkerConfig::default()
        }
        .normalized();
        assert_eq!(config.max_scene_parallel, 2);

        let config = WorkerConfig {
            max_parallel_videos: 0,
            max_scene_parallel: 0,
            ..WorkerConfig::default()
        }
        .normalized();
        assert_eq!(config.max_parallel_videos, 1);
        assert_eq!(config.max_scene_parallel, 1);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool(" YES "), Some(true));
        assert_eq!(parse_bool("maybe"), None);
    }
}
