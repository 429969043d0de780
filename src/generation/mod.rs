//! Boundary to the external text-generation service.
//!
//! Pipeline stages never talk to a provider directly. They go through [`ResilientGenerator`],
//! which wraps a [`TextGenerator`] implementation with prompt truncation, retry/backoff, and
//! call pacing. The Gemini and Ollama adapters issue HTTP requests directly with `reqwest` and
//! classify failures into [`GenerationError`] variants the retry loop understands.

mod gemini;
mod ollama;
pub mod pacing;
pub mod resilient;

use crate::config::{Config, GenerationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use pacing::Pacer;
pub use resilient::{ResilientGenerator, RetryPolicy};

/// Errors surfaced by a generation call.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// Provider signalled quota or request-rate exhaustion.
    #[error("rate limited by generation service: {0}")]
    RateLimited(String),
    /// Any other failure worth retrying, including empty responses.
    #[error("transient generation failure: {0}")]
    Transient(String),
    /// Non-retryable provider error (bad credentials, unknown model, rejected request).
    #[error("generation failed: {0}")]
    Fatal(String),
    /// Every attempt in the retry budget failed.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: usize,
        /// Error returned by the final attempt.
        #[source]
        last: Box<GenerationError>,
    },
    /// The caller cancelled the run while the call was pending.
    #[error("generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Whether the retry loop should try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Transient(_))
    }

    /// Whether this error, or the last attempt behind it, was a rate limit.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Exhausted { last, .. } => last.is_rate_limited(),
            _ => false,
        }
    }
}

/// Request payload passed to a generation provider.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Fully assembled prompt text.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Interface implemented by text-generation providers.
///
/// Implementations perform exactly one request per call; retries live in [`ResilientGenerator`].
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for the given prompt.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// Build the generation client selected by configuration.
pub fn get_generation_client(config: &Config) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    let http = build_http_client(config.request_timeout)?;
    match config.generation_provider {
        GenerationProvider::Gemini => {
            let api_key = config.gemini_api_key.clone().ok_or_else(|| {
                GenerationError::Fatal("GEMINI_API_KEY is required for the gemini provider".into())
            })?;
            let mut client = GeminiClient::new(http, api_key, config.generation_model.clone());
            if let Some(url) = &config.gemini_url {
                client = client.with_base_url(url.clone());
            }
            Ok(Arc::new(client))
        }
        GenerationProvider::Ollama => {
            let mut client = OllamaClient::new(http, config.generation_model.clone());
            if let Some(url) = &config.ollama_url {
                client = client.with_base_url(url.clone());
            }
            Ok(Arc::new(client))
        }
    }
}

fn build_http_client(timeout: Duration) -> Result<Client, GenerationError> {
    Client::builder()
        .user_agent("coursedigest/generate")
        .timeout(timeout)
        .build()
        .map_err(|error| GenerationError::Fatal(format!("failed to build HTTP client: {error}")))
}

/// Map a non-success HTTP status onto the retry taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> GenerationError {
    let detail = format!("{status}: {}", body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS {
        GenerationError::RateLimited(detail)
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        GenerationError::Transient(detail)
    } else {
        GenerationError::Fatal(detail)
    }
}

/// Map a transport error onto the retry taxonomy.
pub(crate) fn classify_transport(error: reqwest::Error, endpoint: &str) -> GenerationError {
    if error.is_builder() {
        GenerationError::Fatal(format!("invalid request to {endpoint}: {error}"))
    } else {
        GenerationError::Transient(format!("failed to reach {endpoint}: {error}"))
    }
}
