//! End-to-end runs of the digest pipeline against a scripted in-process provider.

use async_trait::async_trait;
use coursedigest::{
    config::{Language, PipelineSettings},
    generation::{GenerationError, GenerationRequest, RetryPolicy, TextGenerator},
    processing::{
        ArtifactKind, DigestService, InputError, NoProgress, PipelineError, ProgressReporter,
        RunResult, Stage,
    },
};
use regex::Regex;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const FLASHCARDS_JSON: &str =
    "```json\n[{\"q\": \"What is ATP?\", \"a\": \"The cell's energy currency\"}, {\"q\": \"Where is DNA?\", \"a\": \"In the nucleus\"}]\n```";
const QUIZ_JSON: &str = r#"Here is your quiz:
[{"id": 1, "question": "Organelle of respiration?", "options": ["A. Ribosome", "B. Mitochondrion"], "answer": "B", "reason": "It hosts the Krebs cycle."}]"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Map,
    Reduce,
    Revision,
    Flashcards,
    Quiz,
}

fn classify(prompt: &str) -> Call {
    if prompt.contains("Summarize part") {
        Call::Map
    } else if prompt.contains("Merge them into a single") {
        Call::Reduce
    } else if prompt.contains("must-know points") {
        Call::Revision
    } else if prompt.contains("flashcards from the study report") {
        Call::Flashcards
    } else {
        Call::Quiz
    }
}

/// Provider that answers by prompt kind and can inject failures.
struct Scripted {
    calls: Mutex<Vec<(Call, String)>>,
    map_errors: Mutex<VecDeque<GenerationError>>,
    reduce_error: Option<GenerationError>,
    flashcards: &'static str,
    quiz: &'static str,
}

impl Default for Scripted {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            map_errors: Mutex::new(VecDeque::new()),
            reduce_error: None,
            flashcards: FLASHCARDS_JSON,
            quiz: QUIZ_JSON,
        }
    }
}

impl Scripted {
    fn calls_of(&self, kind: Call) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(call, _)| *call == kind)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for Scripted {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let kind = classify(&request.prompt);
        self.calls
            .lock()
            .unwrap()
            .push((kind, request.prompt.clone()));

        match kind {
            Call::Map => {
                if let Some(error) = self.map_errors.lock().unwrap().pop_front() {
                    return Err(error);
                }
                let part = request
                    .prompt
                    .split("Summarize part ")
                    .nth(1)
                    .and_then(|rest| rest.split_whitespace().next())
                    .unwrap_or("?");
                Ok(format!("notes-{part}"))
            }
            Call::Reduce => {
                if let Some(error) = &self.reduce_error {
                    return Err(error.clone());
                }
                let payload = request.prompt.split("Notes:\n").nth(1).unwrap_or_default();
                let parts: Vec<&str> = payload.split("\n\n---\n\n").collect();
                Ok(format!("merged[{}]", parts.join("+")))
            }
            Call::Revision => Ok("💡 Mitochondria produce ATP.".into()),
            Call::Flashcards => Ok(self.flashcards.into()),
            Call::Quiz => Ok(self.quiz.into()),
        }
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        chunk_size: 12_000,
        reduce_batch_size: 2,
        call_cooldown: Duration::ZERO,
        ..PipelineSettings::default()
    }
}

fn service(provider: Arc<Scripted>) -> DigestService {
    DigestService::new(provider, settings(), 0.3, Language::English)
}

#[derive(Default)]
struct Recorder(Mutex<Vec<u8>>);

impl ProgressReporter for Recorder {
    fn report(&self, percent: u8) {
        self.0.lock().unwrap().push(percent);
    }
}

async fn run_document(provider: Arc<Scripted>, text: &str) -> Result<RunResult, PipelineError> {
    service(provider).run(text, &NoProgress).await
}

#[tokio::test]
async fn thirty_thousand_chars_map_three_chunks_and_reduce_in_two_rounds() {
    let provider = Arc::new(Scripted::default());
    let text = "x".repeat(30_000);

    let result = run_document(provider.clone(), &text).await.unwrap();

    let map_prompts = provider.calls_of(Call::Map);
    assert_eq!(map_prompts.len(), 3);
    let chunk_sizes: Vec<usize> = map_prompts
        .iter()
        .map(|prompt| {
            let chunk = prompt.rsplit("Course material:\n").next().unwrap();
            chunk.chars().count()
        })
        .collect();
    assert_eq!(chunk_sizes, vec![12_000, 12_000, 6_000]);

    assert_eq!(provider.calls_of(Call::Reduce).len(), 2);
    assert_eq!(result.summary, "merged[merged[notes-1+notes-2]+notes-3]");
    assert_eq!(result.stats.chunk_count, 3);
    assert_eq!(result.stats.reduce_rounds, 2);
    assert_eq!(result.stats.source_chars, 30_000);
    assert_eq!(result.stats.artifact_target, 20);
}

#[tokio::test]
async fn run_produces_all_artifacts_and_metadata() {
    let provider = Arc::new(Scripted::default());
    let result = run_document(provider.clone(), "Cells make ATP in mitochondria.")
        .await
        .unwrap();

    assert_eq!(result.summary, "notes-1");
    assert_eq!(result.stats.reduce_rounds, 0);
    assert_eq!(
        result.revision_notes.as_deref(),
        Some("💡 Mitochondria produce ATP.")
    );
    assert_eq!(result.flashcards.len(), 2);
    assert_eq!(result.flashcards[0].question, "What is ATP?");
    assert_eq!(result.quiz.len(), 1);
    assert_eq!(result.quiz[0].options["B"], "Mitochondrion");
    assert_eq!(result.quiz[0].explanation, "It hosts the Krebs cycle.");
    assert!(result.warnings.is_empty());

    let hex = Regex::new(r"^[0-9a-f]{64}$").unwrap();
    let uuid =
        Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$").unwrap();
    let rfc3339 = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})$").unwrap();
    assert!(hex.is_match(&result.source_key), "{}", result.source_key);
    assert!(uuid.is_match(&result.run_id), "{}", result.run_id);
    assert!(rfc3339.is_match(&result.generated_at), "{}", result.generated_at);

    assert_eq!(result.stats.generation.calls, 4);
    assert_eq!(result.stats.generation.failures, 0);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["language"], "en");
    assert_eq!(json["flashcards"][0]["q"], "What is ATP?");
    assert_eq!(json["quiz"][0]["answer"], "B");
}

#[tokio::test]
async fn empty_document_aborts_before_any_call() {
    let provider = Arc::new(Scripted::default());
    let error = run_document(provider.clone(), "").await.unwrap_err();

    assert!(matches!(error, PipelineError::Input(InputError::EmptyDocument)));
    assert_eq!(error.stage(), Stage::Input);
    assert_eq!(provider.total_calls(), 0);
}

#[tokio::test]
async fn garbage_quiz_degrades_without_failing_the_run() {
    let provider = Arc::new(Scripted {
        quiz: "Sorry, I was unable to create questions for this material.",
        ..Scripted::default()
    });
    let result = run_document(provider, "Short lesson text.").await.unwrap();

    assert_eq!(result.summary, "notes-1");
    assert!(result.quiz.is_empty());
    assert_eq!(result.flashcards.len(), 2);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].artifact, ArtifactKind::Quiz);
}

#[tokio::test]
async fn unusable_flashcards_degrade_to_empty_set() {
    let provider = Arc::new(Scripted {
        flashcards: r#"{"flashcards": "none today"}"#,
        ..Scripted::default()
    });
    let result = run_document(provider, "Short lesson text.").await.unwrap();

    assert!(result.flashcards.is_empty());
    assert_eq!(result.quiz.len(), 1);
    assert_eq!(result.warnings[0].artifact, ArtifactKind::Flashcards);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_chunk_recovers_after_backoff() {
    let provider = Arc::new(Scripted::default());
    provider.map_errors.lock().unwrap().extend([
        GenerationError::RateLimited("429".into()),
        GenerationError::RateLimited("429".into()),
    ]);
    let started = Instant::now();

    let result = run_document(provider.clone(), "Short lesson text.").await.unwrap();

    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3_050),
        "elapsed {elapsed:?}"
    );
    assert_eq!(result.summary, "notes-1");
    assert_eq!(result.stats.generation.retries, 2);
    assert_eq!(result.stats.generation.rate_limited, 2);
    assert_eq!(provider.calls_of(Call::Map).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_map_chunk_fails_the_whole_run() {
    let provider = Arc::new(Scripted::default());
    provider
        .map_errors
        .lock()
        .unwrap()
        .extend((0..4).map(|_| GenerationError::Transient("503".into())));

    let error = run_document(provider.clone(), "Short lesson text.")
        .await
        .unwrap_err();

    assert_eq!(error.stage(), Stage::Map);
    assert!(matches!(
        error.generation_error(),
        Some(GenerationError::Exhausted { attempts: 4, .. })
    ));
    assert!(provider.calls_of(Call::Reduce).is_empty());
    assert!(provider.calls_of(Call::Flashcards).is_empty());
}

#[tokio::test]
async fn reduce_failure_is_fatal_and_names_the_stage() {
    let provider = Arc::new(Scripted {
        reduce_error: Some(GenerationError::Fatal("403 forbidden".into())),
        ..Scripted::default()
    });
    let error = run_document(provider, &"y".repeat(25_000)).await.unwrap_err();

    assert!(matches!(error, PipelineError::Reduce { round: 1, .. }));
    assert!(error.to_string().contains("reduce stage failed"));
}

#[tokio::test]
async fn concurrent_map_keeps_summaries_in_chunk_order() {
    let provider = Arc::new(Scripted::default());
    let service = DigestService::new(
        provider.clone(),
        PipelineSettings {
            chunk_size: 10,
            reduce_batch_size: 10,
            map_concurrency: 4,
            call_cooldown: Duration::ZERO,
            ..PipelineSettings::default()
        },
        0.3,
        Language::English,
    );

    let result = service.run(&"z".repeat(40), &NoProgress).await.unwrap();

    assert_eq!(result.summary, "merged[notes-1+notes-2+notes-3+notes-4]");
    assert_eq!(result.stats.reduce_rounds, 1);
}

#[tokio::test]
async fn progress_is_monotonic_and_completes() {
    let provider = Arc::new(Scripted::default());
    let recorder = Recorder::default();

    service(provider)
        .run(&"w".repeat(50_000), &recorder)
        .await
        .unwrap();

    let seen = recorder.0.lock().unwrap();
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]), "{seen:?}");
    assert_eq!(seen.first(), Some(&5));
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test]
async fn cancellation_between_stages_stops_the_run() {
    let provider = Arc::new(Scripted::default());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let reporter = move |percent: u8| {
        if percent >= 60 {
            trigger.cancel();
        }
    };

    let error = service(provider.clone())
        .with_cancellation(cancel)
        .run(&"v".repeat(30_000), &reporter)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        PipelineError::Cancelled {
            stage: Stage::Reduce
        }
    ));
    assert!(provider.calls_of(Call::Reduce).is_empty());
}

#[tokio::test]
async fn revision_notes_can_be_disabled() {
    let provider = Arc::new(Scripted::default());
    let service = DigestService::new(
        provider.clone(),
        PipelineSettings {
            revision_notes: false,
            call_cooldown: Duration::ZERO,
            ..PipelineSettings::default()
        },
        0.3,
        Language::Chinese,
    )
    .with_retry_policy(RetryPolicy::default());

    let result = service.run("Short lesson text.", &NoProgress).await.unwrap();

    assert_eq!(result.revision_notes, None);
    assert!(provider.calls_of(Call::Revision).is_empty());
    assert_eq!(result.language, Language::Chinese);
    assert!(provider.calls_of(Call::Map)[0].contains("简体中文"));
}
