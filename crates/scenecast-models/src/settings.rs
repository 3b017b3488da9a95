//! Per-project configuration snapshot.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ImageStyleParams;

/// Strategy used to cut the script into scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// One scene per paragraph
    ByParagraph,
    /// Merge consecutive paragraphs between a minimum and maximum duration
    #[default]
    Hybrid,
    /// Uniform intervals snapped to sentence breaks
    FixedDuration,
}

impl SegmentationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationMode::ByParagraph => "by_paragraph",
            SegmentationMode::Hybrid => "hybrid",
            SegmentationMode::FixedDuration => "fixed_duration",
        }
    }
}

/// Segmentation parameters, durations in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SegmentationSettings {
    pub mode: SegmentationMode,
    pub min_scene_duration: f64,
    pub max_scene_duration: f64,
    /// Target interval for fixed-duration mode
    pub fixed_interval: f64,
    /// Speaking rate used when no transcript timing is available
    pub words_per_second: f64,
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            mode: SegmentationMode::Hybrid,
            min_scene_duration: 8.0,
            max_scene_duration: 15.0,
            fixed_interval: 10.0,
            words_per_second: 2.5,
        }
    }
}

impl SegmentationSettings {
    /// Smallest accepted `fixed_interval`, in seconds.
    pub const MIN_FIXED_INTERVAL: f64 = 1.0;

    pub fn validate(&self) -> Result<(), String> {
        let (min, max) = (self.min_scene_duration, self.max_scene_duration);
        if min.is_nan() || max.is_nan() || min < 0.0 || max < min {
            return Err(format!(
                "min_scene_duration {min} must not exceed max_scene_duration {max}"
            ));
        }
        if self.fixed_interval.is_nan() || self.fixed_interval < Self::MIN_FIXED_INTERVAL {
            return Err(format!(
                "fixed_interval {} is below {}s",
                self.fixed_interval,
                Self::MIN_FIXED_INTERVAL
            ));
        }
        if !self.words_per_second.is_finite() || self.words_per_second <= 0.0 {
            return Err(format!(
                "words_per_second {} must be positive",
                self.words_per_second
            ));
        }
        Ok(())
    }
}

/// Family of pre-defined image prompt templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StyleFamily {
    #[default]
    Photorealistic,
    Stylized,
    HistoricallyPrecise,
    Cinematic,
    Documentary,
}

impl StyleFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleFamily::Photorealistic => "photorealistic",
            StyleFamily::Stylized => "stylized",
            StyleFamily::HistoricallyPrecise => "historically_precise",
            StyleFamily::Cinematic => "cinematic",
            StyleFamily::Documentary => "documentary",
        }
    }

    pub fn is_historical(&self) -> bool {
        matches!(self, StyleFamily::HistoricallyPrecise)
    }
}

/// Historical and cultural variables bound into prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HistoricalContext {
    pub period: Option<String>,
    pub location: Option<String>,
    pub cultural_context: Option<String>,
    pub theme: Option<String>,
}

impl HistoricalContext {
    /// Fill unset fields from `other`.
    pub fn merged_with(&self, other: &HistoricalContext) -> HistoricalContext {
        HistoricalContext {
            period: self.period.clone().or_else(|| other.period.clone()),
            location: self.location.clone().or_else(|| other.location.clone()),
            cultural_context: self
                .cultural_context
                .clone()
                .or_else(|| other.cultural_context.clone()),
            theme: self.theme.clone().or_else(|| other.theme.clone()),
        }
    }
}

/// Settings captured with each project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProjectSettings {
    /// Overrides the pipeline's default segmentation
    pub segmentation: Option<SegmentationSettings>,
    pub style: StyleFamily,
    /// Name of the principal subject described by the dossier
    pub subject: Option<String>,
    pub historical: HistoricalContext,
    /// Named variable set from the pipeline configuration
    pub variable_set: Option<String>,
    pub image_style: ImageStyleParams,
    /// Send compiled prompts through the text chain before image generation
    pub prompt_refinement: bool,
}
