//! Schema validation of generated questions.

use super::{choice_index, Question, QuestionKind, QuizConstraints, QuizPurpose};
use crate::error::GenerationError;
use crate::prompt::extract_json;
use crate::session::Objective;
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPayload {
    Wrapped { questions: Vec<RawQuestion> },
    Bare(Vec<RawQuestion>),
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(alias = "question")]
    text: String,
    #[serde(alias = "type")]
    kind: QuestionKind,
    #[serde(default, alias = "options")]
    choices: Option<Vec<String>>,
    #[serde(default, alias = "answer", alias = "correct_answer")]
    expected_answer: Option<String>,
    #[serde(default)]
    objective_ids: Vec<String>,
}

fn malformed(message: impl Into<String>) -> GenerationError {
    GenerationError::Malformed(message.into())
}

/// Parse and validate model output for `constraints`. Objective ids must
/// come from `objectives`; missing ids are filled from the final test plan
/// or round-robin.
pub(crate) fn parse_questions(
    raw: &str,
    objectives: &[Objective],
    constraints: &QuizConstraints,
) -> Result<Vec<Question>, GenerationError> {
    if objectives.is_empty() {
        return Err(malformed("no objectives to generate questions for"));
    }
    let payload: RawPayload = serde_json::from_str(extract_json(raw))
        .map_err(|e| malformed(format!("invalid question JSON: {}", e)))?;
    let mut raw_questions = match payload {
        RawPayload::Wrapped { questions } => questions,
        RawPayload::Bare(questions) => questions,
    };

    if raw_questions.is_empty() {
        return Err(malformed("no questions returned"));
    }

    match constraints.purpose {
        QuizPurpose::FinalTest => {
            if raw_questions.len() != constraints.slots.len() {
                return Err(malformed(format!(
                    "expected {} final test questions, got {}",
                    constraints.slots.len(),
                    raw_questions.len()
                )));
            }
        }
        QuizPurpose::Prerequisite | QuizPurpose::Micro => {
            raw_questions.truncate(constraints.max_questions.max(1));
        }
    }

    let allowed: HashSet<&str> = objectives.iter().map(|o| o.id.as_str()).collect();
    let mut questions = Vec::with_capacity(raw_questions.len());
    for (index, raw_question) in raw_questions.into_iter().enumerate() {
        let default_id = match constraints.purpose {
            QuizPurpose::FinalTest => {
                let slot = &constraints.slots[index];
                if raw_question.kind != slot.kind {
                    return Err(malformed(format!(
                        "question {} should be {}, got {}",
                        index + 1,
                        slot.kind.as_str(),
                        raw_question.kind.as_str()
                    )));
                }
                slot.objective_id.clone()
            }
            _ => objectives[index % objectives.len()].id.clone(),
        };
        questions.push(validate_question(index, raw_question, &allowed, default_id)?);
    }

    if constraints.purpose == QuizPurpose::FinalTest {
        let referenced: HashSet<&str> = questions
            .iter()
            .flat_map(|q| q.objective_ids.iter().map(String::as_str))
            .collect();
        if let Some(missing) = objectives.iter().find(|o| !referenced.contains(o.id.as_str())) {
            return Err(malformed(format!(
                "objective {} has no final test question",
                missing.id
            )));
        }
    }

    Ok(questions)
}

fn validate_question(
    index: usize,
    raw: RawQuestion,
    allowed: &HashSet<&str>,
    default_id: String,
) -> Result<Question, GenerationError> {
    let text = raw.text.trim().to_string();
    if text.is_empty() {
        return Err(malformed(format!("question {} has empty text", index + 1)));
    }

    let expected_answer = raw.expected_answer.unwrap_or_default().trim().to_string();
    if expected_answer.is_empty() {
        return Err(malformed(format!(
            "question {} has no expected answer",
            index + 1
        )));
    }

    let choices = match raw.kind {
        QuestionKind::Mcq => {
            let choices: Vec<String> = raw
                .choices
                .unwrap_or_default()
                .into_iter()
                .map(|c| c.trim().to_string())
                .collect();
            if choices.len() != 4 || choices.iter().any(String::is_empty) {
                return Err(malformed(format!(
                    "mcq question {} must have exactly 4 non-empty choices",
                    index + 1
                )));
            }
            if choice_index(&choices, &expected_answer).is_none() {
                return Err(malformed(format!(
                    "mcq question {} answer does not match a choice",
                    index + 1
                )));
            }
            Some(choices)
        }
        QuestionKind::Free | QuestionKind::Paraphrase => None,
    };

    let objective_ids = if raw.objective_ids.is_empty() {
        vec![default_id]
    } else {
        if let Some(unknown) = raw
            .objective_ids
            .iter()
            .find(|id| !allowed.contains(id.as_str()))
        {
            return Err(malformed(format!(
                "question {} references unknown objective {}",
                index + 1,
                unknown
            )));
        }
        raw.objective_ids
    };

    Ok(Question {
        text,
        kind: raw.kind,
        choices,
        expected_answer,
        objective_ids,
        low_confidence: false,
    })
}
