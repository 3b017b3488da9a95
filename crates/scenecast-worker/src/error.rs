//! Worker error types.

use thiserror::Error;

use scenecast_models::SegmentError;
use scenecast_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Missing or invalid configuration; fails the owning job without retry
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Invalid transcript: {0}")]
    InvalidTranscript(#[from] SegmentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Configuration problems are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, WorkerError::Configuration(_) | WorkerError::Settings(_))
    }
}
