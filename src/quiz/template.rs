//! Deterministic questions used when generation fails twice.

use super::blueprint::select_prerequisites;
use super::{Question, QuizConstraints, QuizPurpose};
use crate::session::Objective;

/// One free-response question per objective, with an empty expected answer
/// and the low-confidence flag set.
pub fn fallback_questions(objectives: &[Objective], constraints: &QuizConstraints) -> Vec<Question> {
    match constraints.purpose {
        QuizPurpose::FinalTest => objectives
            .iter()
            .map(|objective| {
                Question::template(
                    format!("In your own words, explain: {}", objective.description),
                    &objective.id,
                )
            })
            .collect(),
        QuizPurpose::Prerequisite => select_prerequisites(objectives, constraints.max_questions)
            .into_iter()
            .map(|objective| {
                Question::template(
                    format!("What do you remember about: {}?", objective.description),
                    objective.id,
                )
            })
            .collect(),
        QuizPurpose::Micro => objectives
            .iter()
            .take(1)
            .map(|objective| {
                Question::template(
                    format!(
                        "In a sentence or two, describe what you just learned about: {}",
                        objective.description
                    ),
                    &objective.id,
                )
            })
            .collect(),
    }
}
