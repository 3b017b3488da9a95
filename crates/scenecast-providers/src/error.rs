//! Provider error types and their retry classification.

use std::time::Duration;

use scenecast_models::Capability;
use serde::Serialize;
use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Whether a failure is worth retrying on the same back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Rate limit, timeout, transient network or server error
    Transient,
    /// Credentials, content policy, malformed response or invalid request
    Terminal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Terminal => "terminal",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Content policy rejection: {0}")]
    ContentPolicy(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn content_policy(msg: impl Into<String>) -> Self {
        Self::ContentPolicy(msg.into())
    }

    /// Classify an unsuccessful HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = truncate(body, 300);
        match status {
            429 => Self::RateLimited(body),
            408 => Self::Timeout(Duration::ZERO),
            401 | 403 => Self::InvalidCredentials(format!("HTTP {status}: {body}")),
            400 | 422 if mentions_content_policy(&body) => Self::ContentPolicy(body),
            500..=599 => Self::Unavailable(format!("HTTP {status}: {body}")),
            _ => Self::InvalidRequest(format!("HTTP {status}: {body}")),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::RateLimited(_)
            | ProviderError::Timeout(_)
            | ProviderError::Unavailable(_) => ErrorClass::Transient,
            ProviderError::Network(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                ErrorClass::Transient
            }
            ProviderError::Io(_) => ErrorClass::Transient,
            _ => ErrorClass::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

fn mentions_content_policy(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["content_policy", "content policy", "safety", "nsfw", "moderation"]
        .iter()
        .any(|needle| lower.contains(needle))
}

fn truncate(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let mut out: String = body.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Final classified error of one back-end in an exhausted chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendFailure {
    pub backend: String,
    pub attempts: u32,
    pub class: ErrorClass,
    pub message: String,
}

impl std::fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, {} attempt(s)): {}",
            self.backend, self.class, self.attempts, self.message
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("No {0} back-ends configured")]
    NoBackends(Capability),

    #[error("{capability} chain exhausted: {}", join_failures(.failures))]
    Exhausted {
        capability: Capability,
        failures: Vec<BackendFailure>,
    },
}

impl DispatchError {
    pub fn failures(&self) -> &[BackendFailure] {
        match self {
            DispatchError::NoBackends(_) => &[],
            DispatchError::Exhausted { failures, .. } => failures,
        }
    }
}

fn join_failures(failures: &[BackendFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ProviderError::from_status(429, "slow down").class(), ErrorClass::Transient);
        assert_eq!(ProviderError::from_status(503, "").class(), ErrorClass::Transient);
        assert_eq!(ProviderError::from_status(401, "bad key").class(), ErrorClass::Terminal);
        assert_eq!(ProviderError::from_status(404, "no model").class(), ErrorClass::Terminal);
    }

    #[test]
    fn test_content_policy_detection() {
        let body = r#"{"error":{"code":"content_policy_violation"}}"#;
        let err = ProviderError::from_status(400, body);
        assert!(matches!(err, ProviderError::ContentPolicy(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_exhausted_lists_every_backend() {
        let err = DispatchError::Exhausted {
            capability: Capability::Text,
            failures: vec![
                BackendFailure {
                    backend: "gemini".into(),
                    attempts: 3,
                    class: ErrorClass::Transient,
                    message: "Rate limited".into(),
                },
                BackendFailure {
                    backend: "openai".into(),
                    attempts: 1,
                    class: ErrorClass::Terminal,
                    message: "Invalid credentials".into(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("text chain exhausted"));
        assert!(msg.contains("gemini (transient, 3 attempt(s))"));
        assert!(msg.contains("openai (terminal, 1 attempt(s))"));
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_truncate_long_bodies() {
        let body = "x".repeat(1000);
        match ProviderError::from_status(500, &body) {
            ProviderError::Unavailable(msg) => assert!(msg.len() < 400),
            other => panic!("unexpected {other:?}"),
        }
    }
}
