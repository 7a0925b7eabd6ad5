//! Session state, the message log, and step inputs and outputs.

use super::objective::{partition_objectives, Objective};
use super::phase::{Phase, PrereqChoice};
use crate::quiz::Question;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// `sess-<millis>-<pid>-<seq>`, unique within and across processes.
pub fn new_session_id() -> String {
    let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "sess-{}-{}-{}",
        Utc::now().timestamp_millis(),
        std::process::id(),
        seq
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Tutor,
    Learner,
}

/// What a message belongs to. Grading only ever reads `FinalTest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTag {
    Intro,
    PrereqRecap,
    PrereqQuiz,
    Conversation,
    MicroQuiz,
    FinalTest,
    Summary,
}

impl MessageTag {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageTag::Intro => "intro",
            MessageTag::PrereqRecap => "prereq_recap",
            MessageTag::PrereqQuiz => "prereq_quiz",
            MessageTag::Conversation => "conversation",
            MessageTag::MicroQuiz => "micro_quiz",
            MessageTag::FinalTest => "final_test",
            MessageTag::Summary => "summary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub speaker: Speaker,
    pub tag: MessageTag,
    pub phase: Phase,
    pub content: String,
    #[serde(default)]
    pub low_confidence: bool,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of the assessment once grading has run (or been skipped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Assessment {
    Pending,
    Graded { tier: String },
    /// Both grading tiers failed.
    Ungraded { reason: String },
    /// Nothing was covered, so there was no final test.
    NotAssessed,
}

/// Learner input for a waiting phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UserInput {
    Text(String),
    Choice(PrereqChoice),
    Answers(Vec<String>),
}

impl UserInput {
    pub fn text(value: impl Into<String>) -> Self {
        UserInput::Text(value.into())
    }

    pub fn answers<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        UserInput::Answers(values.into_iter().map(Into::into).collect())
    }

    /// Exactly `expected` answers. A text reply is split on blank lines;
    /// missing answers are left empty and extra blocks join the last answer.
    pub fn into_answers(self, expected: usize) -> Option<Vec<String>> {
        match self {
            UserInput::Answers(answers) if answers.len() == expected => Some(answers),
            UserInput::Answers(_) | UserInput::Choice(_) => None,
            UserInput::Text(text) if expected <= 1 => Some(vec![text.trim().to_string()]),
            UserInput::Text(text) => {
                let blocks: Vec<String> = text
                    .split("\n\n")
                    .map(|block| block.trim().to_string())
                    .filter(|block| !block.is_empty())
                    .collect();
                let mut answers: Vec<String> = blocks.iter().take(expected).cloned().collect();
                if blocks.len() > expected {
                    let rest = blocks[expected..].join("\n\n");
                    if let Some(last) = answers.last_mut() {
                        last.push_str("\n\n");
                        last.push_str(&rest);
                    }
                }
                answers.resize(expected, String::new());
                Some(answers)
            }
        }
    }

    pub fn into_single_answer(self) -> Option<String> {
        match self {
            UserInput::Text(text) => Some(text.trim().to_string()),
            UserInput::Answers(mut answers) if answers.len() == 1 => answers.pop(),
            _ => None,
        }
    }

    pub fn into_choice(self) -> Option<PrereqChoice> {
        match self {
            UserInput::Choice(choice) => Some(choice),
            UserInput::Text(text) => text.parse().ok(),
            UserInput::Answers(_) => None,
        }
    }
}

/// Everything the engine knows about one session. Hosts persist this value
/// between steps; the engine never mutates a state it was handed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub node_id: String,
    pub node_title: String,

    pub all_objectives: Vec<Objective>,
    pub objectives_to_teach: Vec<Objective>,
    pub objectives_already_known: Vec<Objective>,
    pub prerequisite_objectives: Vec<Objective>,

    pub current_objective_index: usize,
    pub current_phase: Phase,
    pub prereq_choice: Option<PrereqChoice>,
    pub covered_objective_ids: Vec<String>,

    pub prereq_quiz_questions: Vec<Question>,
    pub prereq_quiz_position: usize,
    pub prereq_quiz_correct: usize,

    /// Questions of the quick check currently on screen; cleared once
    /// evaluated.
    #[serde(default)]
    pub micro_quiz: Vec<Question>,
    #[serde(default)]
    pub micro_quiz_answers: Vec<String>,

    pub final_test_questions: Vec<Question>,
    pub final_test_answers: Vec<String>,
    #[serde(default)]
    pub final_test_low_confidence: bool,

    pub objective_scores: BTreeMap<String, f64>,
    pub assessment: Assessment,
    pub mastery_reported: bool,

    pub force_end_requested: bool,
    pub messages: Vec<Message>,
    pub turn_count: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Snapshot objectives and partition them against `threshold`.
    pub fn new(
        session_id: String,
        node_id: String,
        node_title: String,
        objectives: Vec<Objective>,
        prerequisites: Vec<Objective>,
        threshold: f64,
    ) -> Self {
        let partition = partition_objectives(&objectives, threshold);
        Self {
            session_id,
            node_id,
            node_title,
            all_objectives: objectives,
            objectives_to_teach: partition.to_teach,
            objectives_already_known: partition.already_known,
            prerequisite_objectives: prerequisites,
            current_objective_index: 0,
            current_phase: Phase::LoadContext,
            prereq_choice: None,
            covered_objective_ids: Vec::new(),
            prereq_quiz_questions: Vec::new(),
            prereq_quiz_position: 0,
            prereq_quiz_correct: 0,
            micro_quiz: Vec::new(),
            micro_quiz_answers: Vec::new(),
            final_test_questions: Vec::new(),
            final_test_answers: Vec::new(),
            final_test_low_confidence: false,
            objective_scores: BTreeMap::new(),
            assessment: Assessment::Pending,
            mastery_reported: false,
            force_end_requested: false,
            messages: Vec::new(),
            turn_count: 0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Ask the engine to stop teaching and go to the final test. Has no
    /// effect once the final test is being built.
    pub fn request_end(&mut self) {
        self.force_end_requested = true;
    }

    pub fn is_finished(&self) -> bool {
        self.current_phase.is_terminal()
    }

    pub fn current_objective(&self) -> Option<&Objective> {
        self.objectives_to_teach.get(self.current_objective_index)
    }

    pub fn covered_objectives(&self) -> Vec<Objective> {
        self.objectives_to_teach
            .iter()
            .filter(|o| self.covered_objective_ids.contains(&o.id))
            .cloned()
            .collect()
    }

    pub fn mark_covered(&mut self, objective_id: &str) {
        if !self.covered_objective_ids.iter().any(|id| id == objective_id) {
            self.covered_objective_ids.push(objective_id.to_string());
        }
    }

    pub fn messages_tagged(&self, tag: MessageTag) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.tag == tag)
    }

    pub fn last_learner_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.speaker == Speaker::Learner)
    }

    /// Mean of the objective scores; `None` when ungraded.
    pub fn overall_score(&self) -> Option<f64> {
        if self.objective_scores.is_empty() {
            return None;
        }
        Some(self.objective_scores.values().sum::<f64>() / self.objective_scores.len() as f64)
    }

    pub fn elapsed_minutes(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0) as f64 / 60.0
    }
}

/// Result of one `step`.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub state: SessionState,
    /// Everything presented during this step, joined by blank lines.
    pub output: Option<String>,
    /// True when the session waits for learner input; false once finished.
    pub suspended: bool,
}
