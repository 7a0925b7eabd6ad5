//! Prompt specifications handed to the model boundary.
//!
//! A [`PromptSpec`] names the task and carries its context as JSON. The
//! literal wording lives here, in one place, so the session logic never
//! builds prompt strings itself.

use crate::provider::{ChatMessage, MessageRole};
use serde_json::Value;

/// What a model call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptTask {
    Intro,
    Recap,
    Probe,
    Explain,
    AnswerCheck,
    PrerequisiteQuiz,
    MicroQuiz,
    FinalTest,
    Grade,
}

impl PromptTask {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptTask::Intro => "intro",
            PromptTask::Recap => "recap",
            PromptTask::Probe => "probe",
            PromptTask::Explain => "explain",
            PromptTask::AnswerCheck => "answer_check",
            PromptTask::PrerequisiteQuiz => "prerequisite_quiz",
            PromptTask::MicroQuiz => "micro_quiz",
            PromptTask::FinalTest => "final_test",
            PromptTask::Grade => "grade",
        }
    }

    fn instructions(self) -> &'static str {
        match self {
            PromptTask::Intro => {
                "You are a friendly tutor. Introduce the topic in exactly two sentences. \
                 Do not list the objectives; they are shown separately."
            }
            PromptTask::Recap => {
                "Summarize the prerequisite objectives the learner should remember before \
                 the lesson. Stay under {word_limit} words. Spend more words on objectives \
                 that need review."
            }
            PromptTask::Probe => {
                "Ask one open Socratic question that reveals what the learner already \
                 believes about the objective. Do not explain the answer."
            }
            PromptTask::Explain => {
                "Explain the objective clearly, building on the learner's reply to the \
                 probe and correcting any misconception in it. End by inviting questions."
            }
            PromptTask::AnswerCheck => {
                "Decide whether the learner's answer is correct. Reply with JSON \
                 {\"correct\": bool, \"feedback\": string}. Keep feedback to two sentences."
            }
            PromptTask::PrerequisiteQuiz => {
                "Write at most {max_questions} questions checking the prerequisites most \
                 relevant to the upcoming objectives. Prefer mcq."
            }
            PromptTask::MicroQuiz => {
                "Write at most {max_questions} short check questions on the objective just \
                 taught."
            }
            PromptTask::FinalTest => {
                "Write exactly one question per slot, in slot order, with the slot's kind \
                 and objective id."
            }
            PromptTask::Grade => {
                "Score each answer against its question and expected answer from 0.0 to \
                 1.0. Reply with JSON {\"scores\": [number, ...]}, one score per answer, \
                 in order."
            }
        }
    }

    fn is_quiz(self) -> bool {
        matches!(
            self,
            PromptTask::PrerequisiteQuiz | PromptTask::MicroQuiz | PromptTask::FinalTest
        )
    }
}

const QUESTION_SCHEMA: &str = "Reply with JSON only: {\"questions\": [{\"text\": string, \
\"kind\": \"mcq\"|\"free\"|\"paraphrase\", \"choices\": [4 strings, mcq only], \
\"expected_answer\": string (choice letter for mcq), \"objective_ids\": [string]}]}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub task: PromptTask,
    pub context: Value,
    pub format: ResponseFormat,
    /// Values substituted into `{name}` placeholders of the instructions.
    pub parameters: Vec<(&'static str, String)>,
}

impl PromptSpec {
    pub fn text(task: PromptTask, context: Value) -> Self {
        Self {
            task,
            context,
            format: ResponseFormat::Text,
            parameters: Vec::new(),
        }
    }

    pub fn json(task: PromptTask, context: Value) -> Self {
        Self {
            task,
            context,
            format: ResponseFormat::Json,
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: &'static str, value: impl ToString) -> Self {
        self.parameters.push((name, value.to_string()));
        self
    }

    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("Task: {}\n{}", self.task.as_str(), self.task.instructions());
        for (name, value) in &self.parameters {
            prompt = prompt.replace(&format!("{{{}}}", name), value);
        }
        if self.task.is_quiz() {
            prompt.push('\n');
            prompt.push_str(QUESTION_SCHEMA);
        } else if self.format == ResponseFormat::Json {
            prompt.push_str("\nReply with JSON only, no prose.");
        }
        prompt
    }

    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let context = serde_json::to_string_pretty(&self.context)
            .unwrap_or_else(|_| self.context.to_string());
        vec![
            ChatMessage {
                role: MessageRole::System,
                content: self.system_prompt(),
            },
            ChatMessage {
                role: MessageRole::User,
                content: context,
            },
        ]
    }
}

/// Best-effort extraction of a JSON document from model output: drops code
/// fences and any prose before the first bracket or after the last one.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if start <= end => &trimmed[start..=end],
        _ => trimmed,
    }
}
