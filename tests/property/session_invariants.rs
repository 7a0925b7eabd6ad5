//! Property-based tests for session invariants

use mentor::quiz::{final_test_size, plan_final_test, question_mix};
use mentor::session::collaborators::blend_mastery;
use mentor::session::{partition_objectives, Objective, UserInput};
use proptest::prelude::*;
use std::collections::HashSet;

fn objectives_strategy() -> impl Strategy<Value = Vec<Objective>> {
    prop::collection::vec(0.0f64..=1.0, 0..12).prop_map(|masteries| {
        masteries
            .into_iter()
            .enumerate()
            .map(|(i, mastery)| Objective::new(format!("obj-{}", i), format!("objective {}", i), mastery))
            .collect()
    })
}

/// Partition halves are disjoint, cover the input, and keep its order.
#[test]
fn test_partition_is_disjoint_and_complete() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(objectives_strategy(), 0.0f64..=1.0), |(objectives, threshold)| {
            let partition = partition_objectives(&objectives, threshold);

            let teach: HashSet<&str> = partition.to_teach.iter().map(|o| o.id.as_str()).collect();
            let known: HashSet<&str> = partition.already_known.iter().map(|o| o.id.as_str()).collect();
            prop_assert!(teach.is_disjoint(&known));
            prop_assert_eq!(teach.len() + known.len(), objectives.len());

            for objective in &partition.to_teach {
                prop_assert!(objective.mastery < threshold);
            }
            for objective in &partition.already_known {
                prop_assert!(objective.mastery >= threshold);
            }

            let positions = |subset: &[Objective]| -> Vec<usize> {
                subset
                    .iter()
                    .map(|o| objectives.iter().position(|x| x.id == o.id).unwrap())
                    .collect()
            };
            let teach_positions = positions(&partition.to_teach);
            prop_assert!(teach_positions.windows(2).all(|w| w[0] < w[1]));
            Ok(())
        })
        .unwrap();
}

proptest! {
    /// Every covered objective gets at least one final test question.
    #[test]
    fn prop_final_test_plan_covers_every_objective(
        objectives in objectives_strategy(),
        default_size in 1usize..12,
    ) {
        let slots = plan_final_test(&objectives, default_size);
        prop_assert_eq!(slots.len(), final_test_size(objectives.len(), default_size));
        prop_assert!(slots.len() >= objectives.len());

        let assigned: HashSet<&str> = slots.iter().map(|s| s.objective_id.as_str()).collect();
        for objective in &objectives {
            prop_assert!(assigned.contains(objective.id.as_str()));
        }
    }

    #[test]
    fn prop_question_mix_has_requested_length(total in 0usize..40) {
        prop_assert_eq!(question_mix(total).len(), total);
    }

    /// Free-text final answers always come back with the expected count.
    #[test]
    fn prop_text_answers_match_expected_count(text in ".{0,200}", expected in 1usize..10) {
        let answers = UserInput::text(text).into_answers(expected).unwrap();
        prop_assert_eq!(answers.len(), expected);
    }

    #[test]
    fn prop_blended_mastery_stays_in_unit_interval(old in -1.0f64..2.0, score in -1.0f64..2.0) {
        let blended = blend_mastery(old, score);
        prop_assert!((0.0..=1.0).contains(&blended));
    }
}
