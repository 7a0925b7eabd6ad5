//! Final test sizing, question mix, and objective assignment.

use super::QuestionKind;
use crate::session::Objective;
use serde::{Deserialize, Serialize};

/// Default final test: 3 mcq, 2 free, 1 paraphrase.
pub const DEFAULT_FINAL_TEST_SIZE: usize = 6;

/// One planned question of the final test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSlot {
    pub kind: QuestionKind,
    pub objective_id: String,
}

/// Number of final test questions for `objective_count` covered objectives.
///
/// Three or more objectives get the default size (or one question each when
/// that is larger). Smaller sessions shrink proportionally, never below one
/// question per objective.
pub fn final_test_size(objective_count: usize, default_size: usize) -> usize {
    match objective_count {
        0 => 0,
        1 | 2 => (default_size * objective_count / 3).max(objective_count),
        n => default_size.max(n),
    }
}

/// Kinds for a test of `total` questions, mcq first. Half (rounded up) are
/// mcq, one in six is a paraphrase (at least one once the test has three
/// questions), and the rest are free response.
pub fn question_mix(total: usize) -> Vec<QuestionKind> {
    if total == 0 {
        return Vec::new();
    }
    let mcq = total.div_ceil(2);
    let paraphrase = if total >= 3 { (total / 6).max(1) } else { 0 };
    let free = total - mcq - paraphrase;

    let mut kinds = Vec::with_capacity(total);
    kinds.extend(std::iter::repeat(QuestionKind::Mcq).take(mcq));
    kinds.extend(std::iter::repeat(QuestionKind::Free).take(free));
    kinds.extend(std::iter::repeat(QuestionKind::Paraphrase).take(paraphrase));
    kinds
}

/// Assign the question mix round-robin over the covered objectives so that
/// every objective gets at least one question.
pub fn plan_final_test(objectives: &[Objective], default_size: usize) -> Vec<QuestionSlot> {
    let total = final_test_size(objectives.len(), default_size);
    question_mix(total)
        .into_iter()
        .enumerate()
        .map(|(index, kind)| QuestionSlot {
            kind,
            objective_id: objectives[index % objectives.len()].id.clone(),
        })
        .collect()
}

/// Prerequisites most in need of checking: lowest mastery first, ties in
/// original order, at most `max`.
pub fn select_prerequisites(prerequisites: &[Objective], max: usize) -> Vec<Objective> {
    let mut ranked: Vec<&Objective> = prerequisites.iter().collect();
    ranked.sort_by(|a, b| a.mastery.total_cmp(&b.mastery));
    ranked.into_iter().take(max).cloned().collect()
}
