//! Digest pipeline: chunking, map, hierarchical reduce, and artifact extraction.

pub mod artifacts;
pub mod chunking;
pub mod map;
mod metadata;
pub mod progress;
mod prompts;
pub mod reduce;
pub mod repair;
mod service;
pub mod types;

pub use artifacts::{Extraction, MAX_ARTIFACT_ITEMS, target_count};
pub use metadata::compute_source_key;
pub use progress::{NoProgress, ProgressReporter, ProgressTracker};
pub use repair::repair_and_parse;
pub use service::DigestService;
pub use types::{
    ArtifactKind, ArtifactWarning, ChatRole, ChatTurn, Chunk, ChunkingError, Flashcard,
    InputError, PartialSummary, PipelineError, QuizItem, RunResult, RunStats, Stage, TutorError,
};
