use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing traffic to the generation service.
#[derive(Debug, Default)]
pub struct GenerationMetrics {
    calls: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    rate_limited: AtomicU64,
    empty_responses: AtomicU64,
    failures: AtomicU64,
    truncated_prompts: AtomicU64,
}

impl GenerationMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a logical call.
    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one request sent to the provider.
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retry scheduled after a retryable failure.
    pub fn record_retry(&self, rate_limited: bool) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        if rate_limited {
            self.rate_limited.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a successful response with an empty body.
    pub fn record_empty_response(&self) {
        self.empty_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a logical call that ended in an error.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a prompt that was cut down to the ceiling.
    pub fn record_truncation(&self) {
        self.truncated_prompts.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> GenerationMetricsSnapshot {
        GenerationMetricsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            empty_responses: self.empty_responses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            truncated_prompts: self.truncated_prompts.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of generation counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct GenerationMetricsSnapshot {
    /// Logical calls issued by the pipeline.
    pub calls: u64,
    /// Requests actually sent, including retries.
    pub attempts: u64,
    /// Retries scheduled after retryable failures.
    pub retries: u64,
    /// Retries caused by rate limiting.
    pub rate_limited: u64,
    /// Successful responses that carried no text.
    pub empty_responses: u64,
    /// Logical calls that ended in an error.
    pub failures: u64,
    /// Prompts truncated to the configured ceiling.
    pub truncated_prompts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_attempts_and_retries() {
        let metrics = GenerationMetrics::new();
        metrics.record_call();
        metrics.record_attempt();
        metrics.record_retry(true);
        metrics.record_attempt();
        metrics.record_retry(false);
        metrics.record_attempt();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.calls, 1);
        assert_eq!(snapshot.attempts, 3);
        assert_eq!(snapshot.retries, 2);
        assert_eq!(snapshot.rate_limited, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(
            GenerationMetrics::new().snapshot(),
            GenerationMetricsSnapshot::default()
        );
    }
}
