//! Grading Pipeline
//!
//! Scores the final test with a tiered strategy: an accurate tier with one
//! retry, then a cheaper fallback tier, then an explicit "ungraded" outcome.
//! Only final test question/answer pairs are ever sent for grading.

use crate::error::GenerationError;
use crate::prompt::{extract_json, PromptSpec, PromptTask};
use crate::provider::ModelGateway;
use crate::quiz::Question;
use crate::session::objective::{clamp_unit, meets_threshold, Objective};
use crate::session::{MessageTag, SessionState, Speaker};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// One model role in the grading strategy.
#[derive(Clone)]
pub struct GradingTier {
    pub name: String,
    pub gateway: ModelGateway,
    pub attempts: usize,
}

impl GradingTier {
    pub fn new(name: impl Into<String>, gateway: ModelGateway, attempts: usize) -> Self {
        Self {
            name: name.into(),
            gateway,
            attempts: attempts.max(1),
        }
    }
}

/// Tiers tried in order. The default shape is an accurate primary tier with
/// two attempts and a cheap fallback tier with one.
#[derive(Clone)]
pub struct GradingStrategy {
    pub tiers: Vec<GradingTier>,
}

impl GradingStrategy {
    pub fn tiered(primary: ModelGateway, fallback: ModelGateway) -> Self {
        Self {
            tiers: vec![
                GradingTier::new("primary", primary, 2),
                GradingTier::new("fallback", fallback, 1),
            ],
        }
    }
}

/// One final test question with the learner's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedItem {
    pub question: Question,
    pub answer: String,
}

/// The only data the grader sees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradingInput {
    pub items: Vec<GradedItem>,
}

impl GradingInput {
    pub fn new(questions: &[Question], answers: &[String]) -> Self {
        let items = questions
            .iter()
            .enumerate()
            .map(|(index, question)| GradedItem {
                question: question.clone(),
                answer: answers.get(index).cloned().unwrap_or_default(),
            })
            .collect();
        Self { items }
    }

    /// Answers are read from learner messages tagged as final test, in
    /// order; every other message in the log is ignored.
    pub fn from_session(state: &SessionState) -> Self {
        let answers: Vec<String> = state
            .messages_tagged(MessageTag::FinalTest)
            .filter(|m| m.speaker == Speaker::Learner)
            .map(|m| m.content.clone())
            .collect();
        Self::new(&state.final_test_questions, &answers)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GradingOutcome {
    Graded(GradeReport),
    Ungraded { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeReport {
    pub tier: String,
    pub question_scores: Vec<f64>,
    pub objective_scores: BTreeMap<String, f64>,
}

impl GradeReport {
    pub fn overall(&self) -> Option<f64> {
        if self.objective_scores.is_empty() {
            return None;
        }
        Some(self.objective_scores.values().sum::<f64>() / self.objective_scores.len() as f64)
    }

    pub fn node_mastered(&self, threshold: f64) -> bool {
        self.overall()
            .map(|overall| meets_threshold(overall, threshold))
            .unwrap_or(false)
    }
}

/// Mean score per objective. A question counts towards every objective it
/// references; objectives outside `objectives` are dropped.
pub fn aggregate_scores(
    questions: &[Question],
    question_scores: &[f64],
    objectives: &[Objective],
) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (question, score) in questions.iter().zip(question_scores) {
        for objective_id in &question.objective_ids {
            if objectives.iter().any(|o| &o.id == objective_id) {
                let entry = sums.entry(objective_id.clone()).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }
    }
    sums.into_iter()
        .map(|(id, (sum, count))| (id, sum / count as f64))
        .collect()
}

#[derive(Deserialize)]
struct RawScores {
    scores: Vec<RawScore>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScore {
    Plain(f64),
    Detailed { score: f64 },
}

impl RawScore {
    fn value(&self) -> f64 {
        match self {
            RawScore::Plain(score) | RawScore::Detailed { score } => *score,
        }
    }
}

fn parse_scores(raw: &str, expected: usize) -> Result<Vec<f64>, GenerationError> {
    let parsed: RawScores = serde_json::from_str(extract_json(raw))
        .map_err(|e| GenerationError::Malformed(format!("invalid score JSON: {}", e)))?;
    if parsed.scores.len() != expected {
        return Err(GenerationError::Malformed(format!(
            "expected {} scores, got {}",
            expected,
            parsed.scores.len()
        )));
    }
    parsed
        .scores
        .iter()
        .map(|score| {
            let value = score.value();
            if value.is_finite() && (0.0..=1.0).contains(&value) {
                Ok(clamp_unit(value))
            } else {
                Err(GenerationError::Malformed(format!(
                    "score out of range: {}",
                    value
                )))
            }
        })
        .collect()
}

fn build_prompt(input: &GradingInput) -> PromptSpec {
    let items: Vec<_> = input
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            json!({
                "number": index + 1,
                "kind": item.question.kind,
                "question": item.question.render(),
                "expected_answer": item.question.display_answer(),
                "answer": item.answer,
            })
        })
        .collect();
    PromptSpec::json(PromptTask::Grade, json!({ "answers": items }))
}

pub struct GradingPipeline {
    strategy: GradingStrategy,
}

impl GradingPipeline {
    pub fn new(strategy: GradingStrategy) -> Self {
        Self { strategy }
    }

    /// Grade `input` against the covered `objectives`.
    pub async fn grade(&self, input: &GradingInput, objectives: &[Objective]) -> GradingOutcome {
        if input.is_empty() {
            return GradingOutcome::Ungraded {
                reason: "no final test answers".to_string(),
            };
        }

        let prompt = build_prompt(input);
        let expected = input.items.len();
        for tier in &self.strategy.tiers {
            let result = tier
                .gateway
                .invoke_parsed(&prompt, tier.attempts, |raw| parse_scores(raw, expected))
                .await;
            match result {
                Ok(question_scores) => {
                    let questions: Vec<Question> =
                        input.items.iter().map(|item| item.question.clone()).collect();
                    let objective_scores = aggregate_scores(&questions, &question_scores, objectives);
                    info!(tier = %tier.name, model = %tier.gateway.label(), "Final test graded");
                    return GradingOutcome::Graded(GradeReport {
                        tier: tier.name.clone(),
                        question_scores,
                        objective_scores,
                    });
                }
                Err(err) => {
                    warn!(
                        tier = %tier.name,
                        model = %tier.gateway.label(),
                        error = %err,
                        "Grading tier failed"
                    );
                }
            }
        }

        GradingOutcome::Ungraded {
            reason: "all grading tiers failed".to_string(),
        }
    }
}
