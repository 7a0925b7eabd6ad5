//! Tunable session behaviour, read from the `[session]` config table.

use super::objective::MASTERY_THRESHOLD;
use crate::quiz::blueprint::DEFAULT_FINAL_TEST_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPolicy {
    #[serde(default = "default_mastery_threshold")]
    pub mastery_threshold: f64,

    #[serde(default = "default_final_test_size")]
    pub final_test_size: usize,

    #[serde(default = "default_prereq_quiz_max")]
    pub prereq_quiz_max: usize,

    /// Questions per micro-quiz (1 or 2)
    #[serde(default = "default_micro_quiz_max")]
    pub micro_quiz_max: usize,

    #[serde(default = "default_recap_word_limit")]
    pub recap_word_limit: usize,

    /// Timeout for tutor and generator calls
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    /// Timeout for each grading call
    #[serde(default = "default_grading_timeout_secs")]
    pub grading_timeout_secs: u64,

    /// Attempts on the primary grading tier before falling back
    #[serde(default = "default_primary_grading_attempts")]
    pub primary_grading_attempts: usize,
}

fn default_mastery_threshold() -> f64 {
    MASTERY_THRESHOLD
}

fn default_final_test_size() -> usize {
    DEFAULT_FINAL_TEST_SIZE
}

fn default_prereq_quiz_max() -> usize {
    4
}

fn default_micro_quiz_max() -> usize {
    2
}

fn default_recap_word_limit() -> usize {
    200
}

fn default_generation_timeout_secs() -> u64 {
    60
}

fn default_grading_timeout_secs() -> u64 {
    90
}

fn default_primary_grading_attempts() -> usize {
    2
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            mastery_threshold: default_mastery_threshold(),
            final_test_size: default_final_test_size(),
            prereq_quiz_max: default_prereq_quiz_max(),
            micro_quiz_max: default_micro_quiz_max(),
            recap_word_limit: default_recap_word_limit(),
            generation_timeout_secs: default_generation_timeout_secs(),
            grading_timeout_secs: default_grading_timeout_secs(),
            primary_grading_attempts: default_primary_grading_attempts(),
        }
    }
}

impl SessionPolicy {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn grading_timeout(&self) -> Duration {
        Duration::from_secs(self.grading_timeout_secs)
    }

    /// Returns a list of problems; empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !(0.0..=1.0).contains(&self.mastery_threshold) {
            problems.push(format!(
                "mastery_threshold must be within [0, 1], got {}",
                self.mastery_threshold
            ));
        }
        if self.final_test_size == 0 {
            problems.push("final_test_size must be at least 1".to_string());
        }
        if !(1..=4).contains(&self.prereq_quiz_max) {
            problems.push(format!(
                "prereq_quiz_max must be between 1 and 4, got {}",
                self.prereq_quiz_max
            ));
        }
        if !(1..=2).contains(&self.micro_quiz_max) {
            problems.push(format!(
                "micro_quiz_max must be 1 or 2, got {}",
                self.micro_quiz_max
            ));
        }
        if self.recap_word_limit == 0 {
            problems.push("recap_word_limit must be at least 1".to_string());
        }
        if self.generation_timeout_secs == 0 || self.grading_timeout_secs == 0 {
            problems.push("timeouts must be at least 1 second".to_string());
        }
        if self.primary_grading_attempts == 0 {
            problems.push("primary_grading_attempts must be at least 1".to_string());
        }
        problems
    }
}
