//! Interactive study session over a finished run.
//!
//! [`UiState`] is an immutable value: every user interaction is a [`UiAction`] applied with
//! [`UiState::apply`], which returns the next state. [`render`] turns a state and a run into
//! plain view models that any front end can draw.

use serde::Serialize;

use crate::config::Language;
use crate::processing::{ArtifactWarning, RunResult};

/// User interactions with the study session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    /// Switch between English and Chinese output.
    ToggleLanguage,
    /// Show the next flashcard, staying on the last one.
    NextCard,
    /// Show the previous flashcard, staying on the first one.
    PrevCard,
    /// Turn the current flashcard over.
    FlipCard,
    /// Choose an option of the current quiz question by label.
    SelectOption(String),
    /// Check the selected option.
    SubmitAnswer,
    /// Move past an answered question; after the last one the quiz restarts.
    NextQuestion,
    /// Return to the first card and question, keeping the language.
    Reset,
}

/// Position and answers within a study session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UiState {
    /// Output language chosen by the user.
    pub language: Language,
    /// Index of the flashcard on screen.
    pub card_index: usize,
    /// Whether the answer side of the card is showing.
    pub card_flipped: bool,
    /// Index of the quiz question on screen.
    pub quiz_index: usize,
    /// Option label chosen for the current question.
    pub selected: Option<String>,
    /// Whether the current question has been checked.
    pub submitted: bool,
    /// Correct answers so far in this pass through the quiz.
    pub score: usize,
}

impl UiState {
    /// Fresh session in `language`.
    pub fn new(language: Language) -> Self {
        Self {
            language,
            ..Self::default()
        }
    }

    /// State after `action`, given the run being studied.
    ///
    /// Actions that make no sense in the current state (flipping with no cards, submitting
    /// without a selection, changing an answer after submitting) leave the state unchanged.
    pub fn apply(&self, action: UiAction, result: &RunResult) -> UiState {
        let mut next = self.clone();
        let cards = result.flashcards.len();
        let questions = result.quiz.len();

        match action {
            UiAction::ToggleLanguage => next.language = self.language.toggled(),
            UiAction::NextCard if self.card_index + 1 < cards => {
                next.card_index += 1;
                next.card_flipped = false;
            }
            UiAction::PrevCard if self.card_index > 0 => {
                next.card_index -= 1;
                next.card_flipped = false;
            }
            UiAction::FlipCard if cards > 0 => next.card_flipped = !self.card_flipped,
            UiAction::SelectOption(label) if !self.submitted => {
                let label = label.trim().to_uppercase();
                let known = result
                    .quiz
                    .get(self.quiz_index)
                    .is_some_and(|item| item.options.contains_key(&label));
                if known {
                    next.selected = Some(label);
                }
            }
            UiAction::SubmitAnswer if !self.submitted => {
                if let (Some(item), Some(selected)) =
                    (result.quiz.get(self.quiz_index), &self.selected)
                {
                    next.submitted = true;
                    if item.is_correct(selected) {
                        next.score += 1;
                    }
                }
            }
            UiAction::NextQuestion if self.submitted => {
                next.selected = None;
                next.submitted = false;
                if self.quiz_index + 1 < questions {
                    next.quiz_index += 1;
                } else {
                    next.quiz_index = 0;
                    next.score = 0;
                }
            }
            UiAction::Reset => next = UiState::new(self.language),
            _ => {}
        }
        next
    }
}

/// Everything a front end needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    /// Language selected in the session.
    pub language: Language,
    /// Merged summary.
    pub summary: String,
    /// Revision notes, if generated.
    pub revision_notes: Option<String>,
    /// Current flashcard, or `None` when the run produced none.
    pub flashcard: Option<FlashcardView>,
    /// Current quiz screen.
    pub quiz: QuizView,
    /// Artifacts that could not be produced.
    pub warnings: Vec<ArtifactWarning>,
}

/// One flashcard face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashcardView {
    /// 1-based card number.
    pub number: usize,
    /// Number of cards.
    pub total: usize,
    /// Text on the visible side.
    pub text: String,
    /// Whether the answer side is visible.
    pub flipped: bool,
}

/// Quiz screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuizView {
    /// The run produced no quiz.
    Empty,
    /// A question awaiting or showing an answer.
    Question {
        /// 1-based question number.
        number: usize,
        /// Number of questions.
        total: usize,
        /// Question text.
        question: String,
        /// Options in label order.
        options: Vec<OptionView>,
        /// Shown once the answer is submitted.
        feedback: Option<Feedback>,
        /// Correct answers so far.
        score: usize,
    },
}

/// One selectable option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionView {
    /// Option label.
    pub label: String,
    /// Option text.
    pub text: String,
    /// Whether the user selected it.
    pub selected: bool,
}

/// Result of checking a submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    /// Whether the selection was right.
    pub correct: bool,
    /// Label of the correct option.
    pub answer: String,
    /// Explanation of the correct option.
    pub explanation: String,
}

/// Build the view for `state` over `result`.
pub fn render(state: &UiState, result: &RunResult) -> View {
    let flashcard = result.flashcards.get(state.card_index).map(|card| FlashcardView {
        number: state.card_index + 1,
        total: result.flashcards.len(),
        text: if state.card_flipped {
            card.answer.clone()
        } else {
            card.question.clone()
        },
        flipped: state.card_flipped,
    });

    let quiz = match result.quiz.get(state.quiz_index) {
        None => QuizView::Empty,
        Some(item) => QuizView::Question {
            number: state.quiz_index + 1,
            total: result.quiz.len(),
            question: item.question.clone(),
            options: item
                .options
                .iter()
                .map(|(label, text)| OptionView {
                    label: label.clone(),
                    text: text.clone(),
                    selected: state.selected.as_deref() == Some(label.as_str()),
                })
                .collect(),
            feedback: state
                .submitted
                .then(|| state.selected.as_deref())
                .flatten()
                .map(|selected| Feedback {
                    correct: item.is_correct(selected),
                    answer: item.answer.clone(),
                    explanation: item.explanation.clone(),
                }),
            score: state.score,
        },
    };

    View {
        language: state.language,
        summary: result.summary.clone(),
        revision_notes: result.revision_notes.clone(),
        flashcard,
        quiz,
        warnings: result.warnings.clone(),
    }
}
