//! Digest service coordinating chunking, map, reduce, and artifact extraction.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, Language, PipelineSettings},
    generation::{
        GenerationError, Pacer, ResilientGenerator, RetryPolicy, TextGenerator,
        get_generation_client,
    },
    processing::{
        artifacts::{extract_flashcards, extract_quiz, generate_revision_notes, target_count},
        chunking::{char_len, chunk_text, truncate_chars},
        map::map_stage,
        metadata::{compute_source_key, current_timestamp_rfc3339, generate_run_id},
        progress::{ProgressReporter, ProgressTracker, milestones},
        prompts::build_tutor_prompt,
        reduce::reduce_stage,
        types::{
            ChatRole, ChatTurn, InputError, PipelineError, RunResult, RunStats, Stage, TutorError,
        },
    },
};

/// Most recent chat turns replayed to the tutor.
const TUTOR_HISTORY_TURNS: usize = 10;
/// Ceiling on each replayed chat turn.
const TUTOR_TURN_CHARS: usize = 1_000;

/// Runs the digest pipeline against one generation provider.
///
/// The service owns the provider handle and the call pacer, so every run and tutor question
/// issued through the same service shares one cooldown schedule. Construct it once and share
/// it behind an `Arc` when several callers need it.
pub struct DigestService {
    client: Arc<dyn TextGenerator>,
    pacer: Arc<Pacer>,
    settings: PipelineSettings,
    policy: RetryPolicy,
    temperature: f32,
    language: Language,
    cancel: CancellationToken,
}

impl DigestService {
    /// Build a service around `client` with explicit settings.
    pub fn new(
        client: Arc<dyn TextGenerator>,
        settings: PipelineSettings,
        temperature: f32,
        language: Language,
    ) -> Self {
        Self {
            client,
            pacer: Arc::new(Pacer::new(settings.call_cooldown)),
            policy: RetryPolicy::from_settings(&settings),
            settings,
            temperature,
            language,
            cancel: CancellationToken::new(),
        }
    }

    /// Build a service from loaded configuration, selecting the configured provider.
    pub fn from_config(config: &Config) -> Result<Self, GenerationError> {
        let client = get_generation_client(config)?;
        tracing::info!(
            provider = ?config.generation_provider,
            model = %config.generation_model,
            language = config.language.code(),
            "Generation client initialized"
        );
        Ok(Self::new(
            client,
            config.pipeline.clone(),
            config.temperature,
            config.language,
        ))
    }

    /// Cancel in-flight and future runs once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the retry schedule derived from the settings.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Generate material in `language` instead of the configured one.
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Output language of generated material.
    pub fn language(&self) -> Language {
        self.language
    }

    /// Settings in effect for every run.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Process `text` into a summary and study artifacts.
    ///
    /// Blank input fails with [`InputError::EmptyDocument`] before any generation call. Map
    /// and reduce failures abort the run; artifact failures only add warnings.
    pub async fn run(
        &self,
        text: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<RunResult, PipelineError> {
        let tracker = ProgressTracker::new(progress);
        if text.trim().is_empty() {
            tracing::warn!("Rejecting document with no extractable text");
            return Err(InputError::EmptyDocument.into());
        }
        let source_chars = char_len(text);
        tracker.report(milestones::INPUT_READ);

        self.checkpoint(Stage::Chunking)?;
        let chunks = chunk_text(text, self.settings.chunk_size)?;
        tracing::info!(
            source_chars,
            chunk_size = self.settings.chunk_size,
            chunks = chunks.len(),
            "Document chunked"
        );
        tracker.report(milestones::CHUNKED);

        let generator = self.generator();

        self.checkpoint(Stage::Map)?;
        let partials = map_stage(
            &generator,
            &chunks,
            self.language,
            self.settings.map_concurrency,
            &tracker,
        )
        .await?;
        tracing::info!(partials = partials.len(), "Map stage complete");

        self.checkpoint(Stage::Reduce)?;
        let reduced = reduce_stage(
            &generator,
            partials.into_iter().map(|partial| partial.text).collect(),
            self.settings.reduce_batch_size,
            self.settings.reduce_input_limit,
            self.language,
            &tracker,
        )
        .await?;
        tracing::info!(rounds = reduced.rounds, "Reduce stage complete");

        self.checkpoint(Stage::Artifacts)?;
        let mut warnings = Vec::new();
        let revision_notes = if self.settings.revision_notes {
            let extraction =
                generate_revision_notes(&generator, &reduced.summary, self.language).await?;
            warnings.extend(extraction.warning);
            extraction.value
        } else {
            None
        };
        tracker.report(milestones::REVISION_DONE);

        let target = target_count(source_chars);
        let flashcards =
            extract_flashcards(&generator, &reduced.summary, target, self.language).await?;
        warnings.extend(flashcards.warning);
        tracker.report(milestones::FLASHCARDS_DONE);

        let quiz = extract_quiz(&generator, &reduced.summary, target, self.language).await?;
        warnings.extend(quiz.warning);
        tracker.report(milestones::QUIZ_DONE);

        let result = RunResult {
            run_id: generate_run_id(),
            source_key: compute_source_key(text),
            generated_at: current_timestamp_rfc3339(),
            language: self.language,
            summary: reduced.summary,
            revision_notes,
            flashcards: flashcards.value,
            quiz: quiz.value,
            warnings,
            stats: RunStats {
                source_chars,
                chunk_size: self.settings.chunk_size,
                chunk_count: chunks.len(),
                reduce_rounds: reduced.rounds,
                artifact_target: target,
                generation: generator.metrics(),
            },
        };
        tracker.report(milestones::COMPLETE);
        tracing::info!(
            run_id = %result.run_id,
            flashcards = result.flashcards.len(),
            quiz = result.quiz.len(),
            warnings = result.warnings.len(),
            calls = result.stats.generation.calls,
            retries = result.stats.generation.retries,
            "Digest run complete"
        );
        Ok(result)
    }

    /// Answer a follow-up question grounded in `summary`.
    ///
    /// Only the most recent turns of `history` are replayed. The summary gets whatever room the
    /// persona, the replayed turns, and the question leave under the prompt ceiling; when the
    /// turns alone overflow it, the oldest are dropped first. The question ends the prompt, so
    /// it is never cut unless it is longer than the ceiling by itself.
    pub async fn ask_tutor(
        &self,
        summary: &str,
        history: &[ChatTurn],
        question: &str,
    ) -> Result<String, TutorError> {
        if question.trim().is_empty() {
            return Err(TutorError::EmptyQuestion);
        }
        let mut recent: Vec<ChatTurn> = history
            .iter()
            .skip(history.len().saturating_sub(TUTOR_HISTORY_TURNS))
            .map(|turn| ChatTurn {
                role: turn.role,
                text: truncate_chars(&turn.text, TUTOR_TURN_CHARS).to_string(),
            })
            .collect();

        let limit = self.settings.prompt_char_limit;
        let fixed_len =
            |turns: &[ChatTurn]| char_len(&build_tutor_prompt("", turns, question, self.language));
        let mut fixed = fixed_len(&recent);
        while fixed > limit && !recent.is_empty() {
            recent.remove(0);
            fixed = fixed_len(&recent);
        }
        let summary_budget = limit
            .saturating_sub(fixed)
            .min(self.settings.reduce_input_limit);
        let summary = truncate_chars(summary, summary_budget);
        let prompt = build_tutor_prompt(summary, &recent, question, self.language);

        let answer = self.generator().generate(&prompt).await?;
        tracing::debug!(
            turns = recent.len(),
            summary_chars = char_len(summary),
            chars = answer.len(),
            "Tutor answered"
        );
        Ok(answer.trim().to_string())
    }

    /// Ask `questions` in order, each one seeing the answers before it.
    ///
    /// Stops at the first failure and returns the turns answered so far together with that
    /// error.
    pub async fn tutor_session(
        &self,
        summary: &str,
        questions: &[String],
    ) -> (Vec<ChatTurn>, Option<TutorError>) {
        let mut turns = Vec::new();
        for question in questions {
            match self.ask_tutor(summary, &turns, question).await {
                Ok(answer) => {
                    turns.push(ChatTurn {
                        role: ChatRole::Student,
                        text: question.clone(),
                    });
                    turns.push(ChatTurn {
                        role: ChatRole::Tutor,
                        text: answer,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        question = %question,
                        error = %error,
                        "Tutor could not answer; skipping remaining questions"
                    );
                    return (turns, Some(error));
                }
            }
        }
        (turns, None)
    }

    /// Fresh generator per run so statistics cover one run only; the pacer is shared.
    fn generator(&self) -> ResilientGenerator {
        ResilientGenerator::new(
            Arc::clone(&self.client),
            self.policy.clone(),
            self.settings.prompt_char_limit,
            self.temperature,
        )
        .with_pacer(Arc::clone(&self.pacer))
        .with_cancellation(self.cancel.clone())
    }

    fn checkpoint(&self, stage: Stage) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            tracing::info!(%stage, "Run cancelled");
            return Err(PipelineError::Cancelled { stage });
        }
        Ok(())
    }
}
