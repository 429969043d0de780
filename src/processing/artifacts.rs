//! Derived artifacts: revision notes, flashcards, and quiz items.
//!
//! Each extractor makes one logical generation call against the merged summary and never
//! fails the run on its own. Generation errors and unparsable responses degrade the artifact
//! to an empty value plus an [`ArtifactWarning`]; only cancellation propagates.

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::config::Language;
use crate::generation::{GenerationError, ResilientGenerator};

use super::prompts::{build_flashcard_prompt, build_quiz_prompt, build_revision_prompt};
use super::repair::repair_and_parse;
use super::types::{ArtifactKind, ArtifactWarning, Flashcard, PipelineError, QuizItem, Stage};

/// Upper bound on items kept per artifact set.
pub const MAX_ARTIFACT_ITEMS: usize = 20;

/// Number of items to request for a document of `source_chars` characters.
pub fn target_count(source_chars: usize) -> usize {
    match source_chars {
        0..5_000 => 5,
        5_000..15_000 => 10,
        15_000..30_000 => 15,
        _ => MAX_ARTIFACT_ITEMS,
    }
}

/// Artifact value together with the warning raised if it was degraded.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    /// Extracted value; empty (or `None`) when degraded.
    pub value: T,
    /// Present when the artifact could not be produced.
    pub warning: Option<ArtifactWarning>,
}

impl<T: Default> Extraction<T> {
    fn ready(value: T) -> Self {
        Self {
            value,
            warning: None,
        }
    }

    fn degraded(artifact: ArtifactKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(%artifact, reason = %reason, "Artifact degraded");
        Self {
            value: T::default(),
            warning: Some(ArtifactWarning { artifact, reason }),
        }
    }
}

/// Derive exam revision notes from the merged summary.
pub async fn generate_revision_notes(
    generator: &ResilientGenerator,
    summary: &str,
    language: Language,
) -> Result<Extraction<Option<String>>, PipelineError> {
    let prompt = build_revision_prompt(summary, language);
    let raw = match generate_or_degrade(generator, &prompt, ArtifactKind::RevisionNotes).await? {
        Ok(raw) => raw,
        Err(degraded) => return Ok(degraded),
    };
    Ok(Extraction::ready(Some(raw.trim().to_string())))
}

/// Request up to `target` flashcards derived from the summary.
pub async fn extract_flashcards(
    generator: &ResilientGenerator,
    summary: &str,
    target: usize,
    language: Language,
) -> Result<Extraction<Vec<Flashcard>>, PipelineError> {
    let prompt = build_flashcard_prompt(summary, target, language);
    let raw = match generate_or_degrade(generator, &prompt, ArtifactKind::Flashcards).await? {
        Ok(raw) => raw,
        Err(degraded) => return Ok(degraded),
    };
    Ok(collect_items(
        ArtifactKind::Flashcards,
        parse_flashcards(&raw),
        target,
    ))
}

/// Request up to `target` quiz items derived from the summary.
pub async fn extract_quiz(
    generator: &ResilientGenerator,
    summary: &str,
    target: usize,
    language: Language,
) -> Result<Extraction<Vec<QuizItem>>, PipelineError> {
    let prompt = build_quiz_prompt(summary, target, language);
    let raw = match generate_or_degrade(generator, &prompt, ArtifactKind::Quiz).await? {
        Ok(raw) => raw,
        Err(degraded) => return Ok(degraded),
    };
    Ok(collect_items(ArtifactKind::Quiz, parse_quiz(&raw), target))
}

/// Any generation failure, `Fatal` and `Exhausted` included, degrades to a warning. Only
/// cancellation stops the stage.
async fn generate_or_degrade<T: Default>(
    generator: &ResilientGenerator,
    prompt: &str,
    artifact: ArtifactKind,
) -> Result<Result<String, Extraction<T>>, PipelineError> {
    match generator.generate(prompt).await {
        Ok(raw) => Ok(Ok(raw)),
        Err(GenerationError::Cancelled) => Err(PipelineError::Cancelled {
            stage: Stage::Artifacts,
        }),
        Err(error) => Ok(Err(Extraction::degraded(
            artifact,
            format!("generation failed: {error}"),
        ))),
    }
}

fn collect_items<T>(
    artifact: ArtifactKind,
    parsed: Option<Vec<T>>,
    target: usize,
) -> Extraction<Vec<T>> {
    match parsed {
        None => Extraction::degraded(artifact, "response was not valid JSON"),
        Some(items) if items.is_empty() => {
            Extraction::degraded(artifact, format!("response contained no usable {artifact}"))
        }
        Some(mut items) => {
            items.truncate(target.clamp(1, MAX_ARTIFACT_ITEMS));
            tracing::info!(%artifact, count = items.len(), "Artifact extracted");
            Extraction::ready(items)
        }
    }
}

/// Parse flashcards from raw model output; `None` when no JSON could be recovered.
pub fn parse_flashcards(raw: &str) -> Option<Vec<Flashcard>> {
    let items = item_array(repair_and_parse(raw)?)?;
    Some(
        items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<Flashcard>(item).ok())
            .filter(|card| !card.question.trim().is_empty() && !card.answer.trim().is_empty())
            .map(|card| Flashcard {
                question: card.question.trim().to_string(),
                answer: card.answer.trim().to_string(),
            })
            .collect(),
    )
}

/// Parse and normalize quiz items from raw model output; `None` when no JSON could be
/// recovered.
///
/// Items whose answer cannot be matched to one of their options are dropped.
pub fn parse_quiz(raw: &str) -> Option<Vec<QuizItem>> {
    let items = item_array(repair_and_parse(raw)?)?;
    let raw_items: Vec<RawQuizItem> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();

    let mut used_ids = HashSet::new();
    let mut quiz = Vec::with_capacity(raw_items.len());
    for raw_item in raw_items {
        let position = quiz.len() as u32 + 1;
        let Some(mut item) = raw_item.normalize() else {
            continue;
        };
        if item.id == 0 || !used_ids.insert(item.id) {
            item.id = position;
            while !used_ids.insert(item.id) {
                item.id += 1;
            }
        }
        quiz.push(item);
    }
    Some(quiz)
}

/// The array of items, either bare or wrapped in an object such as `{"quiz": [...]}`.
fn item_array(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(fields) => fields.into_iter().find_map(|(_, field)| match field {
            Value::Array(items) => Some(items),
            _ => None,
        }),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct RawQuizItem {
    #[serde(default)]
    id: Option<Value>,
    #[serde(alias = "q")]
    question: String,
    options: RawOptions,
    #[serde(alias = "correct", alias = "correct_answer", alias = "correctAnswer")]
    answer: String,
    #[serde(default, alias = "reason")]
    explanation: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawOptions {
    Labelled(BTreeMap<String, String>),
    Listed(Vec<String>),
}

impl RawQuizItem {
    fn normalize(self) -> Option<QuizItem> {
        let question = self.question.trim();
        if question.is_empty() {
            return None;
        }
        let options = match self.options {
            RawOptions::Labelled(options) => options
                .into_iter()
                .map(|(label, text)| (normalize_label(&label), text.trim().to_string()))
                .filter(|(label, text)| !label.is_empty() && !text.is_empty())
                .collect::<BTreeMap<_, _>>(),
            RawOptions::Listed(options) => ('A'..='Z')
                .zip(options)
                .map(|(label, text)| {
                    let text = split_label(&text).map_or(text.trim(), |(_, rest)| rest);
                    (label.to_string(), text.to_string())
                })
                .collect(),
        };
        if options.len() < 2 {
            return None;
        }
        let answer = resolve_answer(&self.answer, &options)?;
        let id = self
            .id
            .as_ref()
            .and_then(|id| match id {
                Value::Number(number) => number.as_u64(),
                Value::String(text) => text.trim().parse().ok(),
                _ => None,
            })
            .and_then(|id| u32::try_from(id).ok())
            .unwrap_or(0);

        Some(QuizItem {
            id,
            question: question.to_string(),
            options,
            answer,
            explanation: self.explanation.trim().to_string(),
        })
    }
}

fn normalize_label(label: &str) -> String {
    label
        .trim()
        .trim_end_matches(['.', ')', ':'])
        .trim()
        .to_uppercase()
}

/// Split `"B. text"`, `"b) text"` or `"C: text"` into the label and the remaining text.
fn split_label(text: &str) -> Option<(char, &str)> {
    let text = text.trim();
    let mut chars = text.chars();
    let label = chars.next().filter(char::is_ascii_alphabetic)?;
    let marker = chars.next()?;
    matches!(marker, '.' | ')' | ':')
        .then(|| (label.to_ascii_uppercase(), chars.as_str().trim()))
}

/// Map a model-supplied answer onto an option label: a bare label, a prefixed label, or the
/// full text of one option.
fn resolve_answer(answer: &str, options: &BTreeMap<String, String>) -> Option<String> {
    let answer = answer.trim();
    let bare = normalize_label(answer);
    if options.contains_key(&bare) {
        return Some(bare);
    }
    if let Some((label, _)) = split_label(answer) {
        let label = label.to_string();
        if options.contains_key(&label) {
            return Some(label);
        }
    }
    options
        .iter()
        .find(|(_, text)| text.eq_ignore_ascii_case(answer))
        .map(|(label, _)| label.clone())
}
