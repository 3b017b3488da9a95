//! Batch worker for the scenecast pipeline.
//!
//! This crate provides:
//! - Worker and pipeline configuration
//! - The character dossier builder with per-project single-flight
//! - The per-project pipeline (alignment to image dispatch)
//! - The batch scheduler, progress counter and final report

pub mod config;
pub mod dossier;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod scheduler;

pub use config::{PipelineConfig, WorkerConfig};
pub use dossier::{DossierBuilder, DossierRegistry};
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pipeline::{PipelineContext, ProjectOutcome, ProjectPipeline, ProjectRunner};
pub use progress::{BatchProgress, ProgressSnapshot};
pub use report::{BatchReport, JobReport};
pub use scheduler::{BatchScheduler, SchedulerSettings};
