//! End-to-end session flows against scripted models.

use super::test_utils::{
    calculus_node, default_input, run_to_end, run_until, with_prerequisites, HarnessBuilder,
    Reply, ScriptedProvider,
};
use mentor::error::SessionError;
use mentor::grading::GradingInput;
use mentor::quiz::QuestionKind;
use mentor::session::{
    Assessment, MessageTag, NodeSnapshot, Objective, Phase, PrereqChoice, Speaker, UserInput,
};

#[tokio::test]
async fn test_start_partitions_objectives() {
    let harness = HarnessBuilder::new(calculus_node()).build();
    let state = harness.engine.start("calc").unwrap();

    let teach: Vec<&str> = state.objectives_to_teach.iter().map(|o| o.id.as_str()).collect();
    let known: Vec<&str> = state
        .objectives_already_known
        .iter()
        .map(|o| o.id.as_str())
        .collect();
    assert_eq!(teach, vec!["A", "C"]);
    assert_eq!(known, vec!["B"]);
    assert_eq!(state.current_phase, Phase::LoadContext);
}

#[tokio::test]
async fn test_start_unknown_node() {
    let harness = HarnessBuilder::new(calculus_node()).build();
    assert!(matches!(
        harness.engine.start("nope"),
        Err(SessionError::NodeNotFound(_))
    ));
}

#[tokio::test]
async fn test_full_session_with_prerequisite_quiz() {
    let harness = HarnessBuilder::new(with_prerequisites(calculus_node())).build();
    let state = harness.engine.start("calc").unwrap();

    let (state, outputs) = run_to_end(&harness.engine, state, PrereqChoice::Quiz).await;

    assert!(state.is_finished());
    assert_eq!(state.covered_objective_ids, vec!["A".to_string(), "C".to_string()]);
    assert_eq!(state.prereq_quiz_correct, 1);
    assert_eq!(
        state.assessment,
        Assessment::Graded {
            tier: "primary".to_string()
        }
    );
    assert_eq!(state.objective_scores.len(), 2);
    assert!((state.objective_scores["A"] - 0.8).abs() < 1e-9);

    let all = outputs.join("\n");
    assert!(all.contains("Question 1 of 1"));
    assert!(all.contains("You got 1 out of 1 correct. Now let's dive into Calculus."));
    assert!(all.contains("Objective 1 of 2"));
    assert!(all.contains("Quick check:"));
    assert!(all.contains("Overall score: 80%"));
    assert!(all.contains("Duration:"));

    // (0.5 + 0.8) / 2 and (0.3 + 0.8) / 2; B was never taught.
    assert!((harness.knowledge.mastery_of("A").unwrap() - 0.65).abs() < 1e-9);
    assert!((harness.knowledge.mastery_of("C").unwrap() - 0.55).abs() < 1e-9);
    assert!((harness.knowledge.mastery_of("B").unwrap() - 0.8).abs() < 1e-9);

    assert_eq!(harness.transcript.entries().len(), state.messages.len());
    assert!(state.ended_at.is_some());
    assert!(state.turn_count > 0);
}

#[tokio::test]
async fn test_summary_choice_groups_prerequisites() {
    let harness = HarnessBuilder::new(with_prerequisites(calculus_node())).build();
    let state = harness.engine.start("calc").unwrap();

    let outcome = run_until(&harness.engine, state, PrereqChoice::Summary, Phase::ProbeAsk).await;
    let recap = outcome
        .state
        .messages_tagged(MessageTag::PrereqRecap)
        .next()
        .unwrap()
        .content
        .clone();
    assert!(recap.ends_with("Now let's dive into Calculus."));
    assert_eq!(harness.model.calls_for("prerequisite_quiz"), 0);
}

#[tokio::test]
async fn test_force_end_during_explain_tests_only_covered() {
    let harness = HarnessBuilder::new(calculus_node()).build();
    let state = harness.engine.start("calc").unwrap();

    let outcome = run_until(
        &harness.engine,
        state,
        PrereqChoice::Summary,
        Phase::ExplainPresent,
    )
    .await;
    assert_eq!(outcome.state.current_phase, Phase::ExplainPresent);

    let mut state = outcome.state;
    state.request_end();
    // Input sent alongside the end request is discarded.
    let outcome = harness
        .engine
        .step(&state, Some(UserInput::text("ignored")))
        .await
        .unwrap();
    let state = outcome.state;

    assert_eq!(state.current_phase, Phase::FinalTestAsk);
    assert_eq!(state.covered_objective_ids, vec!["A".to_string()]);
    assert!((1..=2).contains(&state.final_test_questions.len()));
    assert!(state
        .final_test_questions
        .iter()
        .all(|q| q.objective_ids == vec!["A".to_string()]));
    assert!(!state
        .messages
        .iter()
        .any(|m| m.speaker == Speaker::Learner && m.content == "ignored"));
}

#[tokio::test]
async fn test_force_end_with_micro_quiz_answers_discards_them() {
    let harness = HarnessBuilder::new(calculus_node()).build();
    let state = harness.engine.start("calc").unwrap();

    let outcome = run_until(&harness.engine, state, PrereqChoice::Summary, Phase::QuizAsk).await;
    let mut state = outcome.state;
    assert_eq!(state.current_phase, Phase::QuizAsk);
    assert!(!state.micro_quiz.is_empty());

    state.request_end();
    let answers = UserInput::Answers(vec!["dropped answer".to_string(); state.micro_quiz.len()]);
    let outcome = harness.engine.step(&state, Some(answers)).await.unwrap();
    let state = outcome.state;

    assert_eq!(state.current_phase, Phase::FinalTestAsk);
    assert!(state.micro_quiz.is_empty());
    assert!(state.micro_quiz_answers.is_empty());
    assert!(!state
        .messages
        .iter()
        .any(|m| m.speaker == Speaker::Learner && m.tag == MessageTag::MicroQuiz));
    assert_eq!(state.covered_objective_ids, vec!["A".to_string()]);
    assert!(state
        .final_test_questions
        .iter()
        .all(|q| q.objective_ids == vec!["A".to_string()]));
}

#[tokio::test]
async fn test_final_test_follows_planned_question_kinds() {
    let harness = HarnessBuilder::new(calculus_node()).build();
    let state = harness.engine.start("calc").unwrap();

    let outcome = run_until(&harness.engine, state, PrereqChoice::Summary, Phase::FinalTestAsk).await;
    let state = outcome.state;

    let kinds: Vec<QuestionKind> = state.final_test_questions.iter().map(|q| q.kind).collect();
    assert_eq!(
        kinds,
        vec![
            QuestionKind::Mcq,
            QuestionKind::Mcq,
            QuestionKind::Free,
            QuestionKind::Paraphrase,
        ]
    );
    assert!(!state.final_test_low_confidence);
    assert_eq!(harness.model.calls_for("final_test"), 1);
}

#[tokio::test]
async fn test_force_end_before_teaching_is_not_assessed() {
    let harness = HarnessBuilder::new(calculus_node()).build();
    let state = harness.engine.start("calc").unwrap();
    let mut state = harness.engine.step(&state, None).await.unwrap().state;
    assert_eq!(state.current_phase, Phase::TutorIntro);

    state.request_end();
    let outcome = harness.engine.step(&state, None).await.unwrap();
    assert!(!outcome.suspended);
    assert_eq!(outcome.state.assessment, Assessment::NotAssessed);
    assert!(outcome.output.unwrap().contains("No objectives were covered"));
    assert!(harness.knowledge.updates().is_empty());
    assert_eq!(harness.model.calls_for("final_test"), 0);
}

#[tokio::test]
async fn test_malformed_final_test_falls_back_to_templates() {
    let model = ScriptedProvider::new("model").script(
        "final_test",
        vec![Reply::text("not json"), Reply::text("{\"questions\": []}")],
    );
    let harness = HarnessBuilder::new(calculus_node()).model(model).build();
    let state = harness.engine.start("calc").unwrap();

    let outcome = run_until(
        &harness.engine,
        state,
        PrereqChoice::Summary,
        Phase::FinalTestAsk,
    )
    .await;
    let state = outcome.state;

    assert_eq!(harness.model.calls_for("final_test"), 2);
    assert_eq!(state.final_test_questions.len(), 2);
    for (question, id) in state.final_test_questions.iter().zip(["A", "C"]) {
        assert_eq!(question.objective_ids, vec![id.to_string()]);
        assert!(question.low_confidence);
    }
    assert!(state.final_test_low_confidence);
}

#[tokio::test]
async fn test_quiz_with_no_prerequisites_starts_teaching() {
    let harness = HarnessBuilder::new(calculus_node()).build();
    let state = harness.engine.start("calc").unwrap();
    let state = harness.engine.step(&state, None).await.unwrap().state;

    let outcome = harness
        .engine
        .step(&state, Some(UserInput::Choice(PrereqChoice::Quiz)))
        .await
        .unwrap();

    assert_eq!(outcome.state.current_phase, Phase::ProbeAsk);
    assert!(outcome.state.prereq_quiz_questions.is_empty());
    assert_eq!(harness.model.calls_for("prerequisite_quiz"), 0);
    assert!(!outcome.output.unwrap().contains("Question 1"));
}

#[tokio::test]
async fn test_free_text_choice_is_parsed() {
    let harness = HarnessBuilder::new(with_prerequisites(calculus_node())).build();
    let state = harness.engine.start("calc").unwrap();
    let state = harness.engine.step(&state, None).await.unwrap().state;

    let outcome = harness
        .engine
        .step(&state, Some(UserInput::text("a quick quiz please")))
        .await
        .unwrap();
    assert_eq!(outcome.state.prereq_choice, Some(PrereqChoice::Quiz));
    assert_eq!(outcome.state.current_phase, Phase::PrereqQuizAsk);
}

#[tokio::test]
async fn test_step_after_end_is_invalid_transition() {
    let harness = HarnessBuilder::new(calculus_node()).build();
    let state = harness.engine.start("calc").unwrap();
    let (state, _) = run_to_end(&harness.engine, state, PrereqChoice::Summary).await;
    let updates = harness.knowledge.updates().len();

    let err = harness.engine.step(&state, None).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidTransition {
            phase: Phase::End,
            ..
        }
    ));
    let err = harness
        .engine
        .step(&state, Some(UserInput::text("hello?")))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidTransition { .. }));

    // The updater ran once per graded objective and never again.
    assert_eq!(updates, 2);
    assert_eq!(harness.knowledge.updates().len(), 2);
}

#[tokio::test]
async fn test_input_shape_is_checked() {
    let harness = HarnessBuilder::new(calculus_node()).build();
    let state = harness.engine.start("calc").unwrap();

    // LoadContext is automatic.
    let err = harness
        .engine
        .step(&state, Some(UserInput::text("hi")))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidTransition { .. }));

    let state = harness.engine.step(&state, None).await.unwrap().state;
    let err = harness
        .engine
        .step(&state, Some(UserInput::answers(["one", "two"])))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidTransition {
            phase: Phase::TutorIntro,
            ref reason,
        } if reason.contains("expected a prerequisite choice")
    ));

    // Waiting phases need input.
    let err = harness.engine.step(&state, None).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_step_does_not_mutate_given_state() {
    let harness = HarnessBuilder::new(calculus_node()).build();
    let state = harness.engine.start("calc").unwrap();
    let before = state.clone();
    let outcome = harness.engine.step(&state, None).await.unwrap();
    assert_eq!(state, before);
    assert_ne!(outcome.state.current_phase, state.current_phase);
}

#[tokio::test]
async fn test_grading_reads_only_final_test_answers() {
    let harness = HarnessBuilder::new(calculus_node()).build();
    let state = harness.engine.start("calc").unwrap();
    let outcome = run_until(
        &harness.engine,
        state,
        PrereqChoice::Summary,
        Phase::FinalTestAsk,
    )
    .await;
    let state = outcome.state;
    assert!(state
        .messages_tagged(MessageTag::MicroQuiz)
        .any(|m| m.content == "micro answer"));

    let input = default_input(&state, PrereqChoice::Summary);
    let state = harness.engine.step(&state, Some(input)).await.unwrap().state;
    let grading = GradingInput::from_session(&state);
    assert_eq!(grading.items.len(), state.final_test_questions.len());
    assert!(grading
        .items
        .iter()
        .all(|item| item.answer.starts_with("final answer")));
    assert_eq!(
        state.final_test_answers,
        grading.items.iter().map(|i| i.answer.clone()).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_all_objectives_mastered_skips_to_wrap_up() {
    let node = NodeSnapshot {
        node_id: "calc".to_string(),
        title: "Calculus".to_string(),
        objectives: vec![Objective::new("A", "Understand limits", 0.9)],
        prerequisites: vec![],
    };
    let harness = HarnessBuilder::new(node).build();
    let state = harness.engine.start("calc").unwrap();
    let (state, outputs) = run_to_end(&harness.engine, state, PrereqChoice::Summary).await;

    assert_eq!(state.assessment, Assessment::NotAssessed);
    assert!(outputs
        .join("\n")
        .contains("You had already mastered every objective"));
    assert!(harness.knowledge.updates().is_empty());
}
