//! Tiered grading: primary retries, fallback tier, ungraded sessions.

use super::test_utils::{calculus_node, run_to_end, run_until, HarnessBuilder, Reply, ScriptedProvider};
use mentor::session::{Assessment, Phase, PrereqChoice, UserInput};
use serde_json::json;
use std::time::Duration;

/// Four final test questions for objectives A, C, A, C, in the planned
/// mcq, mcq, free, paraphrase order.
fn final_test_for_a_and_c() -> Reply {
    let mcq = |id: &str| {
        json!({
            "text": format!("Which statement about {} is true?", id),
            "kind": "mcq",
            "choices": ["first", "second", "third", "fourth"],
            "expected_answer": "C",
            "objective_ids": [id]
        })
    };
    let open = |id: &str, kind: &str| {
        json!({
            "text": format!("Explain {}", id),
            "kind": kind,
            "expected_answer": "An explanation.",
            "objective_ids": [id]
        })
    };
    Reply::json(json!({
        "questions": [mcq("A"), mcq("C"), open("A", "free"), open("C", "paraphrase")]
    }))
}

#[tokio::test]
async fn test_primary_timeout_uses_fallback_scores() {
    let model = ScriptedProvider::new("model").script("final_test", vec![final_test_for_a_and_c()]);
    let slow = Reply::Delay(Duration::from_secs(5), json!({"scores": [1, 1, 1, 1]}).to_string());
    let primary = ScriptedProvider::new("primary").script("grade", vec![slow.clone(), slow]);
    let fallback = ScriptedProvider::new("fallback").script(
        "grade",
        vec![Reply::json(json!({"scores": [0.8, 0.6, 0.8, 0.6]}))],
    );
    let harness = HarnessBuilder::new(calculus_node())
        .model(model)
        .primary(primary)
        .fallback(fallback)
        .grading_timeout(Duration::from_millis(100))
        .build();

    let state = harness.engine.start("calc").unwrap();
    let (state, outputs) = run_to_end(&harness.engine, state, PrereqChoice::Summary).await;

    assert_eq!(harness.model.calls_for("final_test"), 1);
    assert!(!state.final_test_low_confidence);
    assert_eq!(harness.primary.calls_for("grade"), 2);
    assert_eq!(harness.fallback.calls_for("grade"), 1);
    assert_eq!(
        state.assessment,
        Assessment::Graded {
            tier: "fallback".to_string()
        }
    );
    assert!((state.objective_scores["A"] - 0.8).abs() < 1e-9);
    assert!((state.objective_scores["C"] - 0.6).abs() < 1e-9);
    assert!((state.overall_score().unwrap() - 0.7).abs() < 1e-9);

    let summary = outputs.last().unwrap();
    assert!(summary.contains("Overall score: 70% (you've mastered this topic)"));
    assert!(summary.contains("✓ Understand limits: 80%"));
    assert!(summary.contains("~ Compute derivatives: 60%"));
}

#[tokio::test]
async fn test_primary_malformed_then_valid_stays_on_primary() {
    let primary = ScriptedProvider::new("primary")
        .script("grade", vec![Reply::text("I think they did fine")]);
    let harness = HarnessBuilder::new(calculus_node()).primary(primary.with_default_score(0.9)).build();
    let state = harness.engine.start("calc").unwrap();
    let (state, _) = run_to_end(&harness.engine, state, PrereqChoice::Summary).await;

    assert_eq!(
        state.assessment,
        Assessment::Graded {
            tier: "primary".to_string()
        }
    );
    assert_eq!(harness.primary.calls_for("grade"), 2);
    assert_eq!(harness.fallback.calls_for("grade"), 0);
    assert!((state.overall_score().unwrap() - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn test_both_tiers_failing_leaves_session_ungraded() {
    let primary = ScriptedProvider::new("primary").script(
        "grade",
        vec![Reply::Fail("boom".to_string()), Reply::Fail("boom".to_string())],
    );
    let fallback = ScriptedProvider::new("fallback").script("grade", vec![Reply::text("{}")]);
    let harness = HarnessBuilder::new(calculus_node())
        .primary(primary)
        .fallback(fallback)
        .build();

    let state = harness.engine.start("calc").unwrap();
    let (state, outputs) = run_to_end(&harness.engine, state, PrereqChoice::Summary).await;

    assert!(matches!(state.assessment, Assessment::Ungraded { .. }));
    assert!(state.objective_scores.is_empty());
    assert!(outputs
        .last()
        .unwrap()
        .contains("We were unable to grade this session, so your mastery has not been updated."));
    assert!(harness.knowledge.updates().is_empty());
    assert_eq!(harness.knowledge.mastery_of("A"), Some(0.5));
}

#[tokio::test]
async fn test_blank_final_answers_are_still_graded() {
    let harness = HarnessBuilder::new(calculus_node())
        .primary(ScriptedProvider::new("primary").with_default_score(0.0))
        .build();
    let state = harness.engine.start("calc").unwrap();
    let outcome = run_until(
        &harness.engine,
        state,
        PrereqChoice::Summary,
        Phase::FinalTestAsk,
    )
    .await;
    let state = outcome.state;
    let outcome = harness
        .engine
        .step(&state, Some(UserInput::text("")))
        .await
        .unwrap();

    assert!(!outcome.suspended);
    assert_eq!(outcome.state.final_test_answers.len(), state.final_test_questions.len());
    assert!(outcome.state.final_test_answers.iter().all(String::is_empty));
    assert!(outcome.output.unwrap().contains("Overall score: 0%"));
}
