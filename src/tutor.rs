//! Tutor utterances: intro, recap, probe, explanation, and answer feedback.
//!
//! Every utterance tries the model twice and then falls back to a fixed
//! template, so a teaching step never fails.

use crate::error::GenerationError;
use crate::prompt::{extract_json, PromptSpec, PromptTask};
use crate::provider::ModelGateway;
use crate::quiz::Question;
use crate::session::objective::Objective;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

const TUTOR_ATTEMPTS: usize = 2;
const INTRO_OBJECTIVE_PREVIEW: usize = 3;

pub const PREREQ_CHOICE_PROMPT: &str = "Before we start, would you like a quick summary of the \
prerequisites, or a short quiz to check them? (summary / quiz)";

/// Text produced for the learner; `degraded` when it came from a template.
#[derive(Debug, Clone, PartialEq)]
pub struct TutorReply {
    pub text: String,
    pub degraded: bool,
}

impl TutorReply {
    fn model(text: String) -> Self {
        Self {
            text,
            degraded: false,
        }
    }

    fn template(text: String) -> Self {
        Self {
            text,
            degraded: true,
        }
    }
}

/// Judgement of one quiz answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerVerdict {
    /// `None` when correctness could not be determined.
    pub correct: Option<bool>,
    pub feedback: String,
}

#[derive(Deserialize)]
struct RawVerdict {
    correct: bool,
    #[serde(default)]
    feedback: String,
}

fn non_empty(raw: &str) -> Result<String, GenerationError> {
    let text = raw.trim();
    if text.is_empty() {
        Err(GenerationError::Malformed("empty tutor reply".to_string()))
    } else {
        Ok(text.to_string())
    }
}

fn parse_verdict(raw: &str) -> Result<RawVerdict, GenerationError> {
    serde_json::from_str(extract_json(raw))
        .map_err(|e| GenerationError::Malformed(format!("invalid verdict JSON: {}", e)))
}

/// Bulleted preview of the first few objectives, then "and N more".
pub fn objective_preview(objectives: &[Objective]) -> String {
    let mut lines: Vec<String> = objectives
        .iter()
        .take(INTRO_OBJECTIVE_PREVIEW)
        .map(|o| format!("- {}", o.description))
        .collect();
    if objectives.len() > INTRO_OBJECTIVE_PREVIEW {
        lines.push(format!(
            "- and {} more",
            objectives.len() - INTRO_OBJECTIVE_PREVIEW
        ));
    }
    lines.join("\n")
}

/// First `limit` words of `text`, with an ellipsis when cut.
pub fn truncate_words(text: &str, limit: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= limit {
        return text.trim().to_string();
    }
    format!("{}...", words[..limit].join(" "))
}

/// Prerequisites grouped by their node, each marked mastered or needing review.
pub fn grouped_prerequisites(prerequisites: &[Objective], threshold: f64) -> String {
    let mut groups: Vec<(&str, Vec<&Objective>)> = Vec::new();
    for objective in prerequisites {
        let node = objective.node_id.as_deref().unwrap_or("prerequisites");
        match groups.iter_mut().find(|(name, _)| *name == node) {
            Some((_, members)) => members.push(objective),
            None => groups.push((node, vec![objective])),
        }
    }

    groups
        .into_iter()
        .map(|(node, members)| {
            let lines: Vec<String> = members
                .iter()
                .map(|o| {
                    let marker = if o.is_mastered(threshold) {
                        "(mastered)"
                    } else {
                        "(needs review)"
                    };
                    format!("- {} {}", o.description, marker)
                })
                .collect();
            format!("{}:\n{}", node, lines.join("\n"))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct Tutor {
    gateway: ModelGateway,
    recap_word_limit: usize,
}

impl Tutor {
    pub fn new(gateway: ModelGateway, recap_word_limit: usize) -> Self {
        Self {
            gateway,
            recap_word_limit,
        }
    }

    async fn say(&self, spec: PromptSpec, fallback: impl FnOnce() -> String) -> TutorReply {
        match self.gateway.invoke_parsed(&spec, TUTOR_ATTEMPTS, non_empty).await {
            Ok(text) => TutorReply::model(text),
            Err(err) => {
                warn!(task = spec.task.as_str(), error = %err, "Tutor fell back to template");
                TutorReply::template(fallback())
            }
        }
    }

    /// Two-sentence introduction, the objectives to cover, and the
    /// prerequisite choice.
    pub async fn introduce(
        &self,
        node_title: &str,
        to_teach: &[Objective],
        already_known: &[Objective],
    ) -> TutorReply {
        let spec = PromptSpec::text(
            PromptTask::Intro,
            json!({
                "topic": node_title,
                "objectives_to_teach": to_teach.iter().map(|o| &o.description).collect::<Vec<_>>(),
                "objectives_already_known": already_known.iter().map(|o| &o.description).collect::<Vec<_>>(),
            }),
        );
        let opening = self
            .say(spec, || {
                format!(
                    "Welcome! Today we're working on {}. We'll build it up one idea at a time.",
                    node_title
                )
            })
            .await;

        let plan = if to_teach.is_empty() {
            "You've already mastered every objective here, so we'll go straight to a wrap-up."
                .to_string()
        } else {
            format!("Here's what we'll cover:\n{}", objective_preview(to_teach))
        };

        TutorReply {
            text: format!("{}\n\n{}\n\n{}", opening.text, plan, PREREQ_CHOICE_PROMPT),
            degraded: opening.degraded,
        }
    }

    /// Recap of the prerequisites, cut to the configured word limit.
    pub async fn recap(&self, prerequisites: &[Objective], threshold: f64) -> TutorReply {
        if prerequisites.is_empty() {
            return TutorReply::model(
                "This topic has no prerequisites, so there's nothing to recap. Let's dive in."
                    .to_string(),
            );
        }

        let grouped = grouped_prerequisites(prerequisites, threshold);
        let spec = PromptSpec::text(
            PromptTask::Recap,
            json!({
                "prerequisites": prerequisites
                    .iter()
                    .map(|o| json!({
                        "node": o.node_id,
                        "description": o.description,
                        "needs_review": !o.is_mastered(threshold),
                    }))
                    .collect::<Vec<_>>(),
            }),
        )
        .with_parameter("word_limit", self.recap_word_limit);

        let reply = self
            .say(spec, || {
                format!("Here's what you should already know:\n\n{}", grouped)
            })
            .await;
        TutorReply {
            text: truncate_words(&reply.text, self.recap_word_limit),
            degraded: reply.degraded,
        }
    }

    /// Socratic opener for one objective.
    pub async fn probe(&self, objective: &Objective, position: usize, total: usize) -> TutorReply {
        let spec = PromptSpec::text(
            PromptTask::Probe,
            json!({"objective": objective.description, "position": position, "total": total}),
        );
        let reply = self
            .say(spec, || {
                format!(
                    "Before I explain anything: what do you already know or suspect about \"{}\"? \
                     A rough guess is fine.",
                    objective.description
                )
            })
            .await;
        TutorReply {
            text: format!(
                "Objective {} of {}: {}\n\n{}",
                position, total, objective.description, reply.text
            ),
            degraded: reply.degraded,
        }
    }

    /// Explanation that builds on the learner's probe reply.
    pub async fn explain(&self, objective: &Objective, learner_reply: &str) -> TutorReply {
        let spec = PromptSpec::text(
            PromptTask::Explain,
            json!({"objective": objective.description, "learner_reply": learner_reply}),
        );
        self.say(spec, || {
            format!(
                "Let's look at this directly: {}. Compare it with what you just said and tell me \
                 which part still feels unclear.",
                objective.description
            )
        })
        .await
    }

    /// Judge one quiz answer. Multiple choice is checked locally; other
    /// kinds go to the model, falling back to showing the expected answer.
    pub async fn check_answer(&self, question: &Question, answer: &str) -> AnswerVerdict {
        if let Some(correct) = question.check_choice(answer) {
            let feedback = if correct {
                "Correct!".to_string()
            } else {
                format!("Not quite. The answer is {}.", question.display_answer())
            };
            return AnswerVerdict {
                correct: Some(correct),
                feedback,
            };
        }

        if answer.trim().is_empty() {
            return AnswerVerdict {
                correct: Some(false),
                feedback: reveal(question, "No answer given."),
            };
        }

        let spec = PromptSpec::json(
            PromptTask::AnswerCheck,
            json!({
                "question": question.text,
                "expected_answer": question.expected_answer,
                "answer": answer,
            }),
        );
        match self.gateway.invoke_parsed(&spec, TUTOR_ATTEMPTS, parse_verdict).await {
            Ok(verdict) => {
                let feedback = if verdict.feedback.trim().is_empty() {
                    let lead = if verdict.correct { "Correct!" } else { "Not quite." };
                    lead.to_string()
                } else {
                    verdict.feedback.trim().to_string()
                };
                AnswerVerdict {
                    correct: Some(verdict.correct),
                    feedback,
                }
            }
            Err(err) => {
                warn!(error = %err, "Answer check fell back to revealing the expected answer");
                AnswerVerdict {
                    correct: None,
                    feedback: reveal(question, "Thanks for your answer."),
                }
            }
        }
    }
}

fn reveal(question: &Question, lead: &str) -> String {
    let expected = question.display_answer();
    if expected.trim().is_empty() {
        lead.to_string()
    } else {
        format!("{} A good answer would be: {}", lead, expected)
    }
}
