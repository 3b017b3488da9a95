//! Generative back-ends for the scenecast pipeline.
//!
//! Every back-end implements one of the capability traits in [`traits`];
//! a [`ProviderFactory`] turns configuration into ordered fallback chains
//! and the [`Dispatcher`] executes requests against them with retry,
//! per-call timeouts and process-wide rate limits.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod gemini;
pub mod limiter;
pub mod metrics;
pub mod openai;
pub mod replicate;
pub mod retry;
pub mod traits;

pub use config::{BackendConfig, BackendKind, ProvidersConfig, RetrySettings};
pub use dispatcher::{Dispatcher, GenerationResult, ImageBackend, TextBackend};
pub use error::{BackendFailure, DispatchError, ErrorClass, ProviderError, ProviderResult};
pub use factory::{ProviderChains, ProviderFactory};
pub use limiter::{RateLimiterRegistry, SharedRateLimiter};
pub use retry::RetryPolicy;
pub use traits::{
    ImageGenerationProvider, RenderSpec, TextGenerationProvider, TranscriptionProvider,
    VideoAssembler,
};
