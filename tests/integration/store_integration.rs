//! Sessions running against the sled-backed stores.

use super::test_utils::{default_input, run_to_end, run_until, ScriptedProvider};
use mentor::grading::GradingStrategy;
use mentor::provider::ModelGateway;
use mentor::session::{
    Collaborators, EngineModels, Phase, PrereqChoice, SessionEngine, SessionPolicy, SessionState,
};
use mentor::store::{open_database, CheckpointStore, KnowledgeGraph, KnowledgeStore, TranscriptStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const GRAPH: &str = r#"{
    "nodes": [
        {"id": "algebra", "title": "Algebra", "objectives": [
            {"id": "alg-1", "description": "Solve linear equations", "mastery": 0.9}
        ]},
        {"id": "calc", "title": "Calculus", "objectives": [
            {"id": "A", "description": "Understand limits", "mastery": 0.5},
            {"id": "B", "description": "Recognize continuity", "mastery": 0.8},
            {"id": "C", "description": "Compute derivatives", "mastery": 0.3}
        ]}
    ],
    "edges": [{"source": "algebra", "target": "calc"}]
}"#;

struct SledHarness {
    _dir: TempDir,
    knowledge: Arc<KnowledgeStore>,
    transcripts: Arc<TranscriptStore>,
    checkpoints: Arc<CheckpointStore>,
}

impl SledHarness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = open_database(&dir.path().join("db")).unwrap();
        let knowledge = KnowledgeStore::shared(db.clone()).unwrap();
        let graph: KnowledgeGraph = serde_json::from_str(GRAPH).unwrap();
        knowledge.import(&graph).unwrap();
        Self {
            _dir: dir,
            knowledge,
            transcripts: TranscriptStore::shared(&db).unwrap(),
            checkpoints: CheckpointStore::shared(db).unwrap(),
        }
    }

    /// A fresh engine over the same stores, as a restarted host would build.
    fn engine(&self) -> SessionEngine {
        let model = ScriptedProvider::new("model").shared();
        let gateway = |client: Arc<ScriptedProvider>| ModelGateway::new(client, Duration::from_secs(5));
        let models = EngineModels {
            tutor: gateway(model.clone()),
            generator: gateway(model),
            grading: GradingStrategy::tiered(
                gateway(ScriptedProvider::new("primary").shared()),
                gateway(ScriptedProvider::new("fallback").shared()),
            ),
        };
        let collaborators = Collaborators {
            objectives: self.knowledge.clone(),
            mastery: self.knowledge.clone(),
            transcript: self.transcripts.clone(),
        };
        SessionEngine::new(collaborators, models, SessionPolicy::default())
    }
}

#[tokio::test]
async fn test_session_snapshot_comes_from_imported_graph() {
    let harness = SledHarness::new();
    let state = harness.engine().start("calc").unwrap();

    assert_eq!(state.node_title, "Calculus");
    let teach: Vec<&str> = state.objectives_to_teach.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(teach, vec!["A", "C"]);
    assert_eq!(state.prerequisite_objectives.len(), 1);
    assert_eq!(state.prerequisite_objectives[0].id, "alg-1");
    assert_eq!(state.prerequisite_objectives[0].node_id.as_deref(), Some("algebra"));
}

#[tokio::test]
async fn test_graded_session_updates_stored_mastery() {
    let harness = SledHarness::new();
    let engine = harness.engine();
    let state = engine.start("calc").unwrap();
    let (state, _) = run_to_end(&engine, state, PrereqChoice::Summary).await;

    assert!(state.is_finished());
    let a = harness.knowledge.get_objective("A").unwrap().unwrap();
    let b = harness.knowledge.get_objective("B").unwrap().unwrap();
    let c = harness.knowledge.get_objective("C").unwrap().unwrap();
    assert!((a.mastery - 0.65).abs() < 1e-9);
    assert!((b.mastery - 0.8).abs() < 1e-9);
    assert!((c.mastery - 0.55).abs() < 1e-9);
    assert!(a.updated_at.is_some());
    assert!(b.updated_at.is_none());

    let transcript = harness.transcripts.read(&state.session_id).unwrap();
    assert_eq!(transcript.len(), state.messages.len());
    assert!(transcript.windows(2).all(|pair| pair[0].seq < pair[1].seq));
}

#[tokio::test]
async fn test_checkpointed_session_resumes_with_new_engine() {
    let harness = SledHarness::new();
    let first = harness.engine();
    let state = first.start("calc").unwrap();
    let outcome = run_until(&first, state, PrereqChoice::Summary, Phase::ExplainPresent).await;
    assert!(outcome.suspended);
    harness.checkpoints.save(&outcome.state).unwrap();
    let session_id = outcome.state.session_id.clone();
    drop(first);

    let open = harness.checkpoints.latest_open("calc").unwrap().unwrap();
    assert_eq!(open.session_id, session_id);
    assert_eq!(open.phase, Phase::ExplainPresent);

    let restored = harness.checkpoints.load(&session_id).unwrap();
    assert_eq!(restored.current_phase, Phase::ExplainPresent);
    assert_eq!(restored.messages.len(), outcome.state.messages.len());
    assert_eq!(restored.covered_objective_ids, vec!["A".to_string()]);

    let second = harness.engine();
    let (finished, _) = run_to_end_from(&second, restored).await;
    harness.checkpoints.save(&finished).unwrap();

    assert!(finished.is_finished());
    assert_eq!(finished.session_id, session_id);
    assert!(harness.checkpoints.latest_open("calc").unwrap().is_none());
    let listed = harness.checkpoints.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].finished);
}

/// Answer every waiting phase until the session finishes.
async fn run_to_end_from(engine: &SessionEngine, mut state: SessionState) -> (SessionState, Vec<String>) {
    let mut outputs = Vec::new();
    while !state.is_finished() {
        let input = default_input(&state, PrereqChoice::Summary);
        let outcome = engine.step(&state, Some(input)).await.unwrap();
        outputs.extend(outcome.output);
        state = outcome.state;
    }
    (state, outputs)
}

#[tokio::test]
async fn test_unknown_node_is_rejected_by_sled_store() {
    let harness = SledHarness::new();
    let err = harness.engine().start("topology").unwrap_err();
    assert!(matches!(err, mentor::error::SessionError::NodeNotFound(ref id) if id == "topology"));
}
