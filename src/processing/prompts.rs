//! Prompt builders for every generation call the pipeline makes.

use crate::config::Language;
use schemars::{JsonSchema, schema_for};

use super::types::{ChatRole, ChatTurn, Flashcard, QuizItem};

const PERSONA: &str = "System: You are a senior academic director who prepares study material for \
international-school students. Stay faithful to the source. Do not invent facts that the \
material does not support.";

/// Prompt asking for notes on one chunk of the course material.
pub(crate) fn build_map_prompt(
    chunk_text: &str,
    chunk_number: usize,
    chunk_total: usize,
    language: Language,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(PERSONA);
    prompt.push_str("\n\n");
    prompt.push_str(&format!(
        "Summarize part {chunk_number} of {chunk_total} of the course material below. Capture \
         definitions, key concepts, formulas, worked examples, and facts likely to be examined. \
         Use concise bullet points grouped under short headings. {}\n\n",
        language.instruction()
    ));
    prompt.push_str("Course material:\n");
    prompt.push_str(chunk_text);
    prompt
}

/// Prompt asking to merge several partial notes into one report.
pub(crate) fn build_reduce_prompt(payload: &str, language: Language) -> String {
    let mut prompt = String::new();
    prompt.push_str(PERSONA);
    prompt.push_str("\n\n");
    prompt.push_str(&format!(
        "The notes below were written for consecutive parts of one course and are separated by \
         '---'. Merge them into a single structured study report with the sections Overview, \
         Key Concepts, Important Details, and Common Pitfalls. Keep the order in which topics \
         appear, remove duplicates, and keep every distinct fact. {}\n\n",
        language.instruction()
    ));
    prompt.push_str("Notes:\n");
    prompt.push_str(payload);
    prompt
}

/// Prompt asking for exam-focused revision notes derived from the report.
pub(crate) fn build_revision_prompt(summary: &str, language: Language) -> String {
    let mut prompt = String::new();
    prompt.push_str(PERSONA);
    prompt.push_str("\n\n");
    prompt.push_str(&format!(
        "From the study report below, extract the must-know points for exam revision. One point \
         per line, each starting with '💡'. Keep each point under 30 words. {}\n\n",
        language.instruction()
    ));
    prompt.push_str("Study report:\n");
    prompt.push_str(summary);
    prompt
}

/// Prompt asking for a JSON array of flashcards.
pub(crate) fn build_flashcard_prompt(summary: &str, count: usize, language: Language) -> String {
    let mut prompt = String::new();
    prompt.push_str(PERSONA);
    prompt.push_str("\n\n");
    prompt.push_str(&format!(
        "Create exactly {count} flashcards from the study report below. Each card has a short \
         question on the front (\"q\") and a precise answer on the back (\"a\"). {}\n",
        language.instruction()
    ));
    prompt.push_str(&json_only_instruction::<Flashcard>());
    prompt.push_str("Study report:\n");
    prompt.push_str(summary);
    prompt
}

/// Prompt asking for a JSON array of multiple-choice questions.
pub(crate) fn build_quiz_prompt(summary: &str, count: usize, language: Language) -> String {
    let mut prompt = String::new();
    prompt.push_str(PERSONA);
    prompt.push_str("\n\n");
    prompt.push_str(&format!(
        "Create exactly {count} multiple-choice questions from the study report below. Number \
         them from 1 in \"id\". Give four options labelled \"A\" to \"D\" in \"options\", set \
         \"answer\" to the label of the single correct option, and explain in \"explanation\" \
         why it is correct. {}\n",
        language.instruction()
    ));
    prompt.push_str(&json_only_instruction::<QuizItem>());
    prompt.push_str("Study report:\n");
    prompt.push_str(summary);
    prompt
}

/// Prompt asking the tutor to answer a follow-up question.
pub(crate) fn build_tutor_prompt(
    summary: &str,
    history: &[ChatTurn],
    question: &str,
    language: Language,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "System: You are a patient course tutor. Answer the student's question using the study \
         report below. If the report does not cover the question, say so before answering from \
         general knowledge. ",
    );
    prompt.push_str(language.instruction());
    prompt.push_str("\n\nStudy report:\n");
    prompt.push_str(summary);
    prompt.push_str("\n\n");

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for turn in history {
            let speaker = match turn.role {
                ChatRole::Student => "Student",
                ChatRole::Tutor => "Tutor",
            };
            prompt.push_str(&format!("{speaker}: {}\n", turn.text.trim()));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Student: {}\nTutor:", question.trim()));
    prompt
}

fn json_only_instruction<T: JsonSchema>() -> String {
    let schema = serde_json::to_string(&schema_for!(T)).unwrap_or_default();
    format!(
        "Return ONLY a JSON array and nothing else: no commentary and no code fences. Every \
         element must match this JSON Schema:\n{schema}\n\n"
    )
}
