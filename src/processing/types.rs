//! Core data types and error definitions for the digest pipeline.

use crate::config::Language;
use crate::generation::GenerationError;
use crate::metrics::GenerationMetricsSnapshot;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Contiguous slice of the source document, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk within the document.
    pub index: usize,
    /// Character offset of the first character of the chunk.
    pub char_offset: usize,
    /// Chunk text.
    pub text: String,
}

/// Map-stage output for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSummary {
    /// Index of the chunk this summary was produced from.
    pub chunk_index: usize,
    /// Generated notes.
    pub text: String,
}

/// Question/answer pair rendered as a flip card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Flashcard {
    /// Prompt shown on the front of the card.
    #[serde(rename = "q", alias = "question", alias = "front")]
    pub question: String,
    /// Answer shown on the back of the card.
    #[serde(rename = "a", alias = "answer", alias = "back")]
    pub answer: String,
}

/// Multiple-choice question with labelled options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QuizItem {
    /// 1-based identifier, stable within one run.
    pub id: u32,
    /// Question text.
    pub question: String,
    /// Option text keyed by label (`A`, `B`, ...).
    pub options: BTreeMap<String, String>,
    /// Label of the correct option.
    pub answer: String,
    /// Why the correct option is correct.
    pub explanation: String,
}

impl QuizItem {
    /// Whether `label` names the correct option, ignoring case and surrounding whitespace.
    pub fn is_correct(&self, label: &str) -> bool {
        label.trim().eq_ignore_ascii_case(&self.answer)
    }
}

/// Derived artifacts whose failure degrades the run instead of aborting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Revision notes derived from the summary.
    RevisionNotes,
    /// Flashcard set.
    Flashcards,
    /// Quiz set.
    Quiz,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RevisionNotes => "revision notes",
            Self::Flashcards => "flashcards",
            Self::Quiz => "quiz",
        })
    }
}

/// Non-fatal notice that an artifact could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactWarning {
    /// Artifact that was degraded.
    pub artifact: ArtifactKind,
    /// Human-readable cause.
    pub reason: String,
}

/// Statistics describing how a run was processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Characters in the source document.
    pub source_chars: usize,
    /// Chunk ceiling used for the run.
    pub chunk_size: usize,
    /// Number of chunks (and partial summaries).
    pub chunk_count: usize,
    /// Number of reduce rounds until one summary remained.
    pub reduce_rounds: usize,
    /// Target size for each artifact set.
    pub artifact_target: usize,
    /// Generation traffic for the run.
    #[serde(skip_deserializing)]
    pub generation: GenerationMetricsSnapshot,
}

/// Structured output of one pipeline run, ready for any presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique identifier of the run.
    pub run_id: String,
    /// SHA-256 of the source text, usable as a cache key.
    pub source_key: String,
    /// RFC 3339 completion timestamp.
    pub generated_at: String,
    /// Language the material was generated in.
    pub language: Language,
    /// Final merged summary.
    pub summary: String,
    /// Revision notes, when enabled and successfully generated.
    pub revision_notes: Option<String>,
    /// Flashcards; empty when extraction failed.
    pub flashcards: Vec<Flashcard>,
    /// Quiz items; empty when extraction failed.
    pub quiz: Vec<QuizItem>,
    /// Degraded artifacts.
    pub warnings: Vec<ArtifactWarning>,
    /// Processing statistics.
    pub stats: RunStats,
}

/// Speaker of a tutor chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The learner asking questions.
    Student,
    /// The model answering.
    Tutor,
}

/// One message in a tutor conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Who wrote the message.
    pub role: ChatRole,
    /// Message text.
    pub text: String,
}

/// Pipeline stage, used to report where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Input validation.
    Input,
    /// Chunking.
    Chunking,
    /// Per-chunk summarization.
    Map,
    /// Hierarchical merge.
    Reduce,
    /// Derived artifacts.
    Artifacts,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Chunking => "chunking",
            Self::Map => "map",
            Self::Reduce => "reduce",
            Self::Artifacts => "artifacts",
        })
    }
}

/// Errors produced while slicing text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Caller configured an impossible chunk size.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Preconditions on the source document.
#[derive(Debug, Error)]
pub enum InputError {
    /// Extraction produced no text (unreadable or scanned document).
    #[error("document contains no extractable text")]
    EmptyDocument,
}

/// Failures of a tutor follow-up question.
#[derive(Debug, Error)]
pub enum TutorError {
    /// The question was blank.
    #[error("question must not be empty")]
    EmptyQuestion,
    /// The generation call failed after retries.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Terminal failures of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The document failed validation before any generation call.
    #[error("invalid input: {0}")]
    Input(#[from] InputError),
    /// Chunking rejected its parameters.
    #[error("failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// A chunk could not be summarized.
    #[error("map stage failed on chunk {chunk}: {source}")]
    Map {
        /// Index of the failed chunk.
        chunk: usize,
        /// Underlying generation failure.
        #[source]
        source: GenerationError,
    },
    /// A merge call failed.
    #[error("reduce stage failed in round {round}: {source}")]
    Reduce {
        /// 1-based reduce round.
        round: usize,
        /// Underlying generation failure.
        #[source]
        source: GenerationError,
    },
    /// The caller cancelled the run.
    #[error("run cancelled during {stage} stage")]
    Cancelled {
        /// Stage that was running when cancellation was observed.
        stage: Stage,
    },
}

impl PipelineError {
    pub(crate) fn map_failure(chunk: usize, source: GenerationError) -> Self {
        match source {
            GenerationError::Cancelled => Self::Cancelled { stage: Stage::Map },
            source => Self::Map { chunk, source },
        }
    }

    pub(crate) fn reduce_failure(round: usize, source: GenerationError) -> Self {
        match source {
            GenerationError::Cancelled => Self::Cancelled {
                stage: Stage::Reduce,
            },
            source => Self::Reduce { round, source },
        }
    }

    /// Stage in which the run failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Input(_) => Stage::Input,
            Self::Chunking(_) => Stage::Chunking,
            Self::Map { .. } => Stage::Map,
            Self::Reduce { .. } => Stage::Reduce,
            Self::Cancelled { stage } => *stage,
        }
    }

    /// Generation failure behind the error, if any.
    pub fn generation_error(&self) -> Option<&GenerationError> {
        match self {
            Self::Map { source, .. } | Self::Reduce { source, .. } => Some(source),
            _ => None,
        }
    }
}
