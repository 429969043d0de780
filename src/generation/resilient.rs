//! Retry/backoff wrapper around a single logical generation call.
//!
//! One logical call makes at most `max_attempts` requests. Attempt `n` (0-based) that fails
//! with a retryable error is followed by a sleep of `base^n` backoff units, so a call that
//! fails every time waits `base^0 + base^1 + ... + base^(N-2)` before surfacing
//! [`GenerationError::Exhausted`]. Empty responses count as transient failures. The wrapper
//! never substitutes placeholder text for a failed call.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{GenerationError, GenerationRequest, Pacer, TextGenerator};
use crate::config::PipelineSettings;
use crate::metrics::{GenerationMetrics, GenerationMetricsSnapshot};
use crate::processing::chunking::truncate_chars;

/// Attempt budget and exponential backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum requests per logical call (at least one is always made).
    pub max_attempts: usize,
    /// Exponential base applied per attempt.
    pub backoff_base: u32,
    /// Duration of one backoff unit; the schedule is `unit * base^attempt`.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_base: 2,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Derive a policy from pipeline settings, with one-second backoff units.
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff_base: settings.backoff_base,
            backoff_unit: Duration::from_secs(1),
        }
    }

    /// Sleep inserted after the failed attempt with 0-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_base.saturating_pow(attempt);
        self.backoff_unit.saturating_mul(factor)
    }

    /// Total sleep before a call that never succeeds gives up.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay_for(attempt as u32))
            .sum()
    }
}

/// Generation client hardened with truncation, pacing, retries, and cancellation.
pub struct ResilientGenerator {
    client: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    prompt_char_limit: usize,
    temperature: f32,
    pacer: Arc<Pacer>,
    cancel: CancellationToken,
    metrics: GenerationMetrics,
}

impl ResilientGenerator {
    /// Wrap `client` with the given retry policy and prompt ceiling.
    pub fn new(
        client: Arc<dyn TextGenerator>,
        policy: RetryPolicy,
        prompt_char_limit: usize,
        temperature: f32,
    ) -> Self {
        Self {
            client,
            policy,
            prompt_char_limit,
            temperature,
            pacer: Arc::new(Pacer::unpaced()),
            cancel: CancellationToken::new(),
            metrics: GenerationMetrics::new(),
        }
    }

    /// Share a pacer with other generators hitting the same service.
    pub fn with_pacer(mut self, pacer: Arc<Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Abort pending and future calls once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Retry policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Counters accumulated by this generator.
    pub fn metrics(&self) -> GenerationMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Whether the associated cancellation token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run one logical generation call.
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.metrics.record_call();
        let prompt = self.bounded_prompt(prompt);
        let result = self.generate_with_retry(prompt).await;
        if result.is_err() {
            self.metrics.record_failure();
        }
        result
    }

    fn bounded_prompt(&self, prompt: &str) -> String {
        let bounded = truncate_chars(prompt, self.prompt_char_limit);
        if bounded.len() < prompt.len() {
            self.metrics.record_truncation();
            tracing::warn!(
                original_chars = prompt.chars().count(),
                limit = self.prompt_char_limit,
                "Prompt exceeded ceiling; truncating"
            );
        }
        bounded.to_string()
    }

    async fn generate_with_retry(&self, prompt: String) -> Result<String, GenerationError> {
        let max_attempts = self.policy.max_attempts.max(1);
        self.pacer.wait_turn(&self.cancel).await?;

        let mut attempt = 0usize;
        loop {
            if self.cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            self.metrics.record_attempt();
            let request = GenerationRequest {
                prompt: prompt.clone(),
                temperature: self.temperature,
            };
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(GenerationError::Cancelled),
                outcome = self.client.generate(request) => outcome,
            };

            let error = match outcome {
                Ok(text) if text.trim().is_empty() => {
                    self.metrics.record_empty_response();
                    GenerationError::Transient("service returned an empty response".into())
                }
                Ok(text) => {
                    tracing::debug!(attempt = attempt + 1, chars = text.len(), "Generation succeeded");
                    return Ok(text);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                tracing::warn!(error = %error, "Generation failed with non-retryable error");
                return Err(error);
            }
            if attempt + 1 >= max_attempts {
                tracing::warn!(
                    attempts = attempt + 1,
                    error = %error,
                    "Generation retry budget exhausted"
                );
                return Err(GenerationError::Exhausted {
                    attempts: attempt + 1,
                    last: Box::new(error),
                });
            }

            let delay = self.policy.delay_for(attempt as u32);
            self.metrics.record_retry(error.is_rate_limited());
            tracing::warn!(
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Generation attempt failed; backing off"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(GenerationError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
