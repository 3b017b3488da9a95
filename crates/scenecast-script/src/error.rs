//! Degradation errors.
//!
//! Neither of these aborts a job: callers log them as warnings and fall
//! back to proportional timing or a partial prompt.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignmentError {
    #[error("transcript has no segments")]
    EmptyTranscript,

    #[error("script has no paragraphs")]
    EmptyScript,

    #[error("matched coverage {coverage:.2} is below the minimum {minimum:.2}")]
    InsufficientCoverage { coverage: f64, minimum: f64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("placeholder '{{{0}}}' has no binding")]
    UnboundPlaceholder(String),

    #[error("template '{0}' has an unclosed placeholder")]
    MalformedPlaceholder(String),

    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
}
