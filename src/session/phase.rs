//! The closed set of session phases and the learner's prerequisite choice.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every phase a session can be in. The current phase is always stored
/// explicitly on the session state; it is never reconstructed from the
/// message log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    LoadContext,
    TutorIntro,
    PrereqRecap,
    PrereqQuizBuild,
    PrereqQuizAsk,
    ProbeAsk,
    ProbeRespond,
    ExplainPresent,
    ExplainRespond,
    QuizAsk,
    QuizEvaluate,
    FinalTestBuild,
    FinalTestAsk,
    GradePrep,
    GraderCall,
    WrapUp,
    End,
}

impl Phase {
    /// Phases that present something to the learner and then suspend.
    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            Phase::TutorIntro
                | Phase::PrereqQuizAsk
                | Phase::ProbeAsk
                | Phase::ExplainPresent
                | Phase::QuizAsk
                | Phase::FinalTestAsk
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::End
    }

    pub fn is_teaching(self) -> bool {
        matches!(
            self,
            Phase::ProbeAsk
                | Phase::ProbeRespond
                | Phase::ExplainPresent
                | Phase::ExplainRespond
                | Phase::QuizAsk
                | Phase::QuizEvaluate
        )
    }

    /// Phases an early-end request can still cut short. Once the final test
    /// is being built the session runs to completion.
    pub fn precedes_final_test(self) -> bool {
        matches!(
            self,
            Phase::LoadContext
                | Phase::TutorIntro
                | Phase::PrereqRecap
                | Phase::PrereqQuizBuild
                | Phase::PrereqQuizAsk
        ) || self.is_teaching()
    }

    /// Description of the input a waiting phase accepts.
    pub fn expected_input(self) -> Option<&'static str> {
        match self {
            Phase::TutorIntro => Some("a prerequisite choice (summary or quiz)"),
            Phase::PrereqQuizAsk => Some("an answer to the current question"),
            Phase::ProbeAsk | Phase::ExplainPresent => Some("a free-text reply"),
            Phase::QuizAsk => Some("answers to the quick check"),
            Phase::FinalTestAsk => Some("answers to the final test"),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::LoadContext => "load_context",
            Phase::TutorIntro => "tutor_intro",
            Phase::PrereqRecap => "prereq_recap",
            Phase::PrereqQuizBuild => "prereq_quiz_build",
            Phase::PrereqQuizAsk => "prereq_quiz_ask",
            Phase::ProbeAsk => "probe_ask",
            Phase::ProbeRespond => "probe_respond",
            Phase::ExplainPresent => "explain_present",
            Phase::ExplainRespond => "explain_respond",
            Phase::QuizAsk => "quiz_ask",
            Phase::QuizEvaluate => "quiz_evaluate",
            Phase::FinalTestBuild => "final_test_build",
            Phase::FinalTestAsk => "final_test_ask",
            Phase::GradePrep => "grade_prep",
            Phase::GraderCall => "grader_call",
            Phase::WrapUp => "wrap_up",
            Phase::End => "end",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the learner wants prerequisites handled. Recorded once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrereqChoice {
    Summary,
    Quiz,
}

impl PrereqChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            PrereqChoice::Summary => "summary",
            PrereqChoice::Quiz => "quiz",
        }
    }
}

const QUIZ_KEYWORDS: &[&str] = &["quiz", "test", "check"];
const SUMMARY_KEYWORDS: &[&str] = &["summary", "summarize", "recap", "review"];

impl FromStr for PrereqChoice {
    type Err = String;

    /// Keyword match on free text. Quiz keywords win when both appear.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        if lowered.is_empty() {
            return Err("empty choice".to_string());
        }
        let contains_any = |words: &[&str]| words.iter().any(|word| lowered.contains(word));
        if contains_any(QUIZ_KEYWORDS) {
            Ok(PrereqChoice::Quiz)
        } else if contains_any(SUMMARY_KEYWORDS) {
            Ok(PrereqChoice::Summary)
        } else {
            Err(format!("unrecognized choice: {}", s.trim()))
        }
    }
}
