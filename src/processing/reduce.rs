//! Reduce stage: hierarchical, bounded fan-in merge of partial summaries.
//!
//! Each round partitions the current sequence into consecutive batches of `batch_size`, merges
//! every multi-item batch with one generation call, and carries a trailing single item forward
//! untouched. Rounds repeat until one text remains, which takes `ceil(log_batch(n))` rounds.
//! The payload of every merge call is truncated to `input_limit` characters, dropping trailing
//! content, so call size stays bounded however long the document is.

use crate::config::Language;
use crate::generation::ResilientGenerator;

use super::chunking::{char_len, truncate_chars};
use super::progress::{ProgressTracker, milestones};
use super::prompts::build_reduce_prompt;
use super::types::{InputError, PipelineError};

/// Separator placed between summaries inside a merge payload.
pub const MERGE_SEPARATOR: &str = "\n\n---\n\n";

/// Result of a completed reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceOutcome {
    /// The single merged summary.
    pub summary: String,
    /// Number of rounds performed.
    pub rounds: usize,
}

/// Concatenate a batch in order and bound it to `limit` characters.
pub fn merge_payload(batch: &[String], limit: usize) -> String {
    let joined = batch.join(MERGE_SEPARATOR);
    let bounded = truncate_chars(&joined, limit);
    if bounded.len() < joined.len() {
        tracing::warn!(
            original_chars = char_len(&joined),
            limit,
            "Merge payload exceeded ceiling; dropping trailing content"
        );
    }
    bounded.to_string()
}

/// Number of rounds needed to reduce `count` items with the given fan-in.
pub fn expected_rounds(count: usize, batch_size: usize) -> usize {
    let batch_size = batch_size.max(2);
    let mut remaining = count;
    let mut rounds = 0;
    while remaining > 1 {
        remaining = remaining.div_ceil(batch_size);
        rounds += 1;
    }
    rounds
}

/// Merge `summaries` into one text, preserving source order across rounds.
pub async fn reduce_stage(
    generator: &ResilientGenerator,
    summaries: Vec<String>,
    batch_size: usize,
    input_limit: usize,
    language: Language,
    progress: &ProgressTracker<'_>,
) -> Result<ReduceOutcome, PipelineError> {
    let batch_size = batch_size.max(2);
    let total_rounds = expected_rounds(summaries.len(), batch_size);
    let mut current = summaries;
    let mut round = 0;

    while current.len() > 1 {
        round += 1;
        let mut next = Vec::with_capacity(current.len().div_ceil(batch_size));
        for (batch_index, batch) in current.chunks(batch_size).enumerate() {
            if let [single] = batch {
                next.push(single.clone());
                continue;
            }
            let payload = merge_payload(batch, input_limit);
            let prompt = build_reduce_prompt(&payload, language);
            let merged = generator.generate(&prompt).await.map_err(|error| {
                tracing::warn!(round, batch = batch_index, error = %error, "Merge call failed");
                PipelineError::reduce_failure(round, error)
            })?;
            next.push(merged);
        }
        tracing::info!(
            round,
            inputs = current.len(),
            outputs = next.len(),
            "Reduce round complete"
        );
        current = next;
        progress.report_fraction(
            milestones::MAP_DONE,
            milestones::REDUCE_DONE,
            round,
            total_rounds,
        );
    }

    let summary = current
        .pop()
        .ok_or(PipelineError::Input(InputError::EmptyDocument))?;
    progress.report(milestones::REDUCE_DONE);
    Ok(ReduceOutcome {
        summary,
        rounds: round,
    })
}
