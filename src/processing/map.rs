//! Map stage: one generation call per chunk.
//!
//! Calls run through an order-preserving buffered stream, so with `concurrency == 1` the stage
//! is strictly sequential and with more it still yields results by chunk position, not arrival
//! order. The first chunk that fails after retries aborts the stage; dropping the stream
//! cancels any sibling calls still in flight.

use futures_util::{StreamExt, stream};

use crate::config::Language;
use crate::generation::ResilientGenerator;

use super::progress::{ProgressTracker, milestones};
use super::prompts::build_map_prompt;
use super::types::{Chunk, PartialSummary, PipelineError};

/// Summarize every chunk, returning partial summaries in chunk order.
pub async fn map_stage(
    generator: &ResilientGenerator,
    chunks: &[Chunk],
    language: Language,
    concurrency: usize,
    progress: &ProgressTracker<'_>,
) -> Result<Vec<PartialSummary>, PipelineError> {
    let total = chunks.len();
    let mut summaries = Vec::with_capacity(total);

    let mut calls = stream::iter(chunks)
        .map(|chunk| async move {
            let prompt = build_map_prompt(&chunk.text, chunk.index + 1, total, language);
            let result = generator.generate(&prompt).await;
            (chunk.index, result)
        })
        .buffered(concurrency.max(1));

    while let Some((chunk_index, result)) = calls.next().await {
        let text = result.map_err(|error| {
            tracing::warn!(chunk = chunk_index, error = %error, "Chunk summarization failed");
            PipelineError::map_failure(chunk_index, error)
        })?;
        tracing::debug!(chunk = chunk_index, chars = text.len(), "Chunk summarized");
        summaries.push(PartialSummary { chunk_index, text });
        progress.report_fraction(
            milestones::CHUNKED,
            milestones::MAP_DONE,
            summaries.len(),
            total,
        );
    }

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationError, GenerationRequest, RetryPolicy, TextGenerator};
    use crate::processing::chunking::chunk_text;
    use crate::processing::progress::NoProgress;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes the chunk text back after a delay that shrinks with position, so later chunks
    /// finish first when calls overlap.
    struct Echo {
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl TextGenerator for Echo {
        async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = request
                .prompt
                .rsplit("Course material:\n")
                .next()
                .unwrap_or_default()
                .to_string();
            if self.fail_on.is_some_and(|marker| body.contains(marker)) {
                return Err(GenerationError::Fatal("rejected".into()));
            }
            let rank = body.bytes().next().map_or(0, |byte| byte.saturating_sub(b'a')) as u64;
            let delay = 100u64.saturating_sub(rank * 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(format!("notes:{body}"))
        }
    }

    fn generator(echo: Arc<Echo>) -> ResilientGenerator {
        ResilientGenerator::new(echo, RetryPolicy::default(), 20_000, 0.3)
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_results_keep_chunk_order() {
        let echo = Arc::new(Echo {
            calls: AtomicUsize::new(0),
            fail_on: None,
        });
        let generator = generator(echo.clone());
        let chunks = chunk_text("abcdefgh", 2).unwrap();
        let reporter = NoProgress;
        let tracker = ProgressTracker::new(&reporter);

        let summaries = map_stage(&generator, &chunks, Language::English, 4, &tracker)
            .await
            .unwrap();

        let texts: Vec<&str> = summaries.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["notes:ab", "notes:cd", "notes:ef", "notes:gh"]);
        assert!(summaries.iter().enumerate().all(|(i, s)| s.chunk_index == i));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_chunk_aborts_the_stage() {
        let echo = Arc::new(Echo {
            calls: AtomicUsize::new(0),
            fail_on: Some("cd"),
        });
        let generator = generator(echo.clone());
        let chunks = chunk_text("abcdefgh", 2).unwrap();
        let reporter = NoProgress;
        let tracker = ProgressTracker::new(&reporter);

        let error = map_stage(&generator, &chunks, Language::English, 1, &tracker)
            .await
            .unwrap_err();

        assert!(matches!(error, PipelineError::Map { chunk: 1, .. }));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 2);
    }
}
