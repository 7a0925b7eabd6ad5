//! Model-backed question generation with template fallback.

use super::parse::parse_questions;
use super::template::fallback_questions;
use super::{Question, QuizConstraints, QuizPurpose};
use crate::prompt::{PromptSpec, PromptTask};
use crate::provider::ModelGateway;
use crate::session::Objective;
use serde_json::json;
use tracing::{info, warn};

/// First attempt plus one regeneration.
pub const GENERATION_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedQuiz {
    pub questions: Vec<Question>,
    /// True when the questions came from the deterministic template.
    pub degraded: bool,
}

impl GeneratedQuiz {
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

pub struct QuizGenerator {
    gateway: ModelGateway,
}

impl QuizGenerator {
    pub fn new(gateway: ModelGateway) -> Self {
        Self { gateway }
    }

    /// Generate questions for `objectives`. Never fails: after two bad
    /// responses the template is used. An empty objective list yields an
    /// empty quiz without calling the model.
    pub async fn generate(&self, objectives: &[Objective], constraints: &QuizConstraints) -> GeneratedQuiz {
        if objectives.is_empty() || constraints.max_questions == 0 {
            return GeneratedQuiz::default();
        }

        let prompt = build_prompt(objectives, constraints);
        let result = self
            .gateway
            .invoke_parsed(&prompt, GENERATION_ATTEMPTS, |raw| {
                parse_questions(raw, objectives, constraints)
            })
            .await;

        match result {
            Ok(questions) => {
                info!(
                    purpose = constraints.purpose.as_str(),
                    questions = questions.len(),
                    "Generated quiz"
                );
                GeneratedQuiz {
                    questions,
                    degraded: false,
                }
            }
            Err(err) => {
                warn!(
                    purpose = constraints.purpose.as_str(),
                    error = %err,
                    "Quiz generation failed twice; using template questions"
                );
                GeneratedQuiz {
                    questions: fallback_questions(objectives, constraints),
                    degraded: true,
                }
            }
        }
    }
}

fn build_prompt(objectives: &[Objective], constraints: &QuizConstraints) -> PromptSpec {
    let objective_list: Vec<_> = objectives
        .iter()
        .map(|o| json!({"id": o.id, "description": o.description, "mastery": o.mastery}))
        .collect();

    match constraints.purpose {
        QuizPurpose::Prerequisite => {
            let upcoming: Vec<_> = constraints
                .upcoming
                .iter()
                .map(|o| json!({"id": o.id, "description": o.description}))
                .collect();
            PromptSpec::json(
                PromptTask::PrerequisiteQuiz,
                json!({"prerequisites": objective_list, "upcoming_objectives": upcoming}),
            )
            .with_parameter("max_questions", constraints.max_questions)
        }
        QuizPurpose::Micro => PromptSpec::json(
            PromptTask::MicroQuiz,
            json!({"objectives": objective_list}),
        )
        .with_parameter("max_questions", constraints.max_questions),
        QuizPurpose::FinalTest => {
            let slots: Vec<_> = constraints
                .slots
                .iter()
                .enumerate()
                .map(|(index, slot)| {
                    json!({"slot": index + 1, "kind": slot.kind, "objective_id": slot.objective_id})
                })
                .collect();
            PromptSpec::json(
                PromptTask::FinalTest,
                json!({"objectives": objective_list, "slots": slots}),
            )
        }
    }
}
