//! Quiz and Test Generation
//!
//! Questions for the three assessment purposes a session uses: the optional
//! prerequisite quiz, the formative micro-quiz after each objective, and the
//! summative final test. Generation goes through the model with schema
//! validation, one regeneration, and a deterministic template as last resort.

pub mod blueprint;
pub mod generator;
mod parse;
pub mod template;

pub use blueprint::{final_test_size, plan_final_test, question_mix, QuestionSlot};
pub use generator::{GeneratedQuiz, QuizGenerator};

use crate::session::Objective;
use serde::{Deserialize, Serialize};

/// Labels shown next to multiple-choice options.
pub const CHOICE_LABELS: [char; 4] = ['A', 'B', 'C', 'D'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Mcq,
    Free,
    Paraphrase,
}

impl QuestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::Mcq => "mcq",
            QuestionKind::Free => "free",
            QuestionKind::Paraphrase => "paraphrase",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub kind: QuestionKind,
    /// Exactly four options for `mcq`, absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    /// Empty when the question came from the fallback template.
    #[serde(default)]
    pub expected_answer: String,
    #[serde(default)]
    pub objective_ids: Vec<String>,
    #[serde(default)]
    pub low_confidence: bool,
}

impl Question {
    /// Free-response question produced without a model.
    pub fn template(text: impl Into<String>, objective_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: QuestionKind::Free,
            choices: None,
            expected_answer: String::new(),
            objective_ids: vec![objective_id.into()],
            low_confidence: true,
        }
    }

    pub fn references(&self, objective_id: &str) -> bool {
        self.objective_ids.iter().any(|id| id == objective_id)
    }

    /// Question text followed by labelled options for mcq.
    pub fn render(&self) -> String {
        let mut rendered = self.text.trim().to_string();
        if let Some(choices) = &self.choices {
            for (label, choice) in CHOICE_LABELS.iter().zip(choices) {
                rendered.push_str(&format!("\n  {}) {}", label, choice));
            }
        }
        rendered
    }

    /// Index of the correct option, when the expected answer names one.
    pub fn correct_choice(&self) -> Option<usize> {
        let choices = self.choices.as_ref()?;
        choice_index(choices, &self.expected_answer)
    }

    /// Deterministic check for multiple-choice answers. `None` when the
    /// question is not mcq or its key is unusable.
    pub fn check_choice(&self, answer: &str) -> Option<bool> {
        if self.kind != QuestionKind::Mcq {
            return None;
        }
        let correct = self.correct_choice()?;
        let choices = self.choices.as_ref()?;
        Some(choice_index(choices, answer) == Some(correct))
    }

    /// Expected answer in display form (`B) text` for mcq).
    pub fn display_answer(&self) -> String {
        match (self.correct_choice(), &self.choices) {
            (Some(index), Some(choices)) => format!("{}) {}", CHOICE_LABELS[index], choices[index]),
            _ => self.expected_answer.clone(),
        }
    }
}

/// Resolve an answer to an option index. Accepts a bare label (`b`, `B)`,
/// `B.`) or the option text itself, case-insensitively.
pub fn choice_index(choices: &[String], answer: &str) -> Option<usize> {
    let trimmed = answer.trim();
    let label = trimmed.trim_end_matches([')', '.', ':']).trim();
    if label.chars().count() == 1 {
        let letter = label.chars().next()?.to_ascii_uppercase();
        if let Some(index) = CHOICE_LABELS.iter().position(|c| *c == letter) {
            if index < choices.len() {
                return Some(index);
            }
        }
    }
    choices
        .iter()
        .position(|choice| choice.trim().eq_ignore_ascii_case(trimmed))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizPurpose {
    Prerequisite,
    Micro,
    FinalTest,
}

impl QuizPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            QuizPurpose::Prerequisite => "prerequisite",
            QuizPurpose::Micro => "micro",
            QuizPurpose::FinalTest => "final_test",
        }
    }
}

/// Shape requirements for one generation request.
#[derive(Debug, Clone)]
pub struct QuizConstraints {
    pub purpose: QuizPurpose,
    pub max_questions: usize,
    /// Final test only: the kind and objective of each question, in order.
    pub slots: Vec<QuestionSlot>,
    /// Prerequisite quiz only: objectives about to be taught, used to pick
    /// the most relevant prerequisites.
    pub upcoming: Vec<Objective>,
}

impl QuizConstraints {
    pub fn prerequisite(max_questions: usize, upcoming: &[Objective]) -> Self {
        Self {
            purpose: QuizPurpose::Prerequisite,
            max_questions,
            slots: Vec::new(),
            upcoming: upcoming.to_vec(),
        }
    }

    pub fn micro(max_questions: usize) -> Self {
        Self {
            purpose: QuizPurpose::Micro,
            max_questions: max_questions.clamp(1, 2),
            slots: Vec::new(),
            upcoming: Vec::new(),
        }
    }

    pub fn final_test(objectives: &[Objective], default_size: usize) -> Self {
        let slots = plan_final_test(objectives, default_size);
        Self {
            purpose: QuizPurpose::FinalTest,
            max_questions: slots.len(),
            slots,
            upcoming: Vec::new(),
        }
    }
}
