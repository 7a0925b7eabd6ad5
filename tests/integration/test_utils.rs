//! Shared test utilities for integration tests
//!
//! A scripted model provider that routes on the prompt's task marker, and a
//! harness that wires the engine to in-memory collaborators.

use async_trait::async_trait;
use mentor::error::ApiError;
use mentor::grading::GradingStrategy;
use mentor::provider::{
    ChatMessage, CompletionOptions, CompletionResponse, MessageRole, ModelGateway,
    ModelProviderClient, TokenUsage,
};
use mentor::session::{
    Collaborators, EngineModels, MemoryKnowledge, MemoryTranscript, NodeSnapshot, Objective,
    Phase, PrereqChoice, SessionEngine, SessionPolicy, SessionState, StepOutcome, UserInput,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
    /// Sleep, then answer; used to trip gateway timeouts.
    Delay(Duration, String),
}

impl Reply {
    pub fn text(value: impl Into<String>) -> Self {
        Reply::Text(value.into())
    }

    pub fn json(value: Value) -> Self {
        Reply::Text(value.to_string())
    }
}

/// Provider whose replies are queued per task (`"final_test"`, `"grade"`, ...).
/// Tasks with an empty queue get a well-formed default reply.
pub struct ScriptedProvider {
    name: String,
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
    default_score: f64,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            default_score: 0.8,
        }
    }

    pub fn with_default_score(mut self, score: f64) -> Self {
        self.default_score = score;
        self
    }

    pub fn script(self, task: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .entry(task.to_string())
            .or_default()
            .extend(replies);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, task: &str) -> usize {
        self.calls.lock().iter().filter(|t| t.as_str() == task).count()
    }

    fn default_reply(&self, task: &str, context: &Value) -> String {
        match task {
            "intro" => "Calculus studies change. We'll build it up step by step.".to_string(),
            "recap" => "Here's a short recap of what you already know.".to_string(),
            "probe" => "What do you already know about this?".to_string(),
            "explain" => "Here's how it works, building on what you said.".to_string(),
            "answer_check" => json!({"correct": true, "feedback": "Nicely put."}).to_string(),
            "prerequisite_quiz" => json!({"questions": [{
                "text": "What is 2 + 2?",
                "kind": "mcq",
                "choices": ["3", "4", "5", "6"],
                "expected_answer": "B"
            }]})
            .to_string(),
            "micro_quiz" => json!({"questions": [{
                "text": "Summarize the idea in one sentence.",
                "kind": "free",
                "expected_answer": "A one-sentence summary."
            }]})
            .to_string(),
            "final_test" => {
                let slots = context["slots"].as_array().cloned().unwrap_or_default();
                let questions: Vec<Value> = slots
                    .iter()
                    .map(|slot| {
                        let id = slot["objective_id"].as_str().unwrap_or("?");
                        let mut question = json!({
                            "text": format!("Explain objective {}", id),
                            "kind": slot["kind"].clone(),
                            "expected_answer": "A correct explanation.",
                            "objective_ids": [id]
                        });
                        if slot["kind"] == "mcq" {
                            question["text"] = json!(format!("Which statement about {} is true?", id));
                            question["choices"] = json!(["first", "second", "third", "fourth"]);
                            question["expected_answer"] = json!("B");
                        }
                        question
                    })
                    .collect();
                json!({ "questions": questions }).to_string()
            }
            "grade" => {
                let count = context["answers"].as_array().map(|a| a.len()).unwrap_or(0);
                json!({ "scores": vec![self.default_score; count] }).to_string()
            }
            _ => "OK".to_string(),
        }
    }
}

fn task_of(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .find(|m| matches!(m.role, MessageRole::System))
        .and_then(|m| m.content.lines().next())
        .and_then(|line| line.strip_prefix("Task: "))
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

fn context_of(messages: &[ChatMessage]) -> Value {
    messages
        .iter()
        .find(|m| matches!(m.role, MessageRole::User))
        .and_then(|m| serde_json::from_str(&m.content).ok())
        .unwrap_or(Value::Null)
}

#[async_trait]
impl ModelProviderClient for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError> {
        let task = task_of(&messages);
        self.calls.lock().push(task.clone());
        let scripted = self
            .scripts
            .lock()
            .get_mut(&task)
            .and_then(|queue| queue.pop_front());

        let content = match scripted {
            Some(Reply::Text(text)) => text,
            Some(Reply::Fail(message)) => return Err(ApiError::ProviderRequestFailed(message)),
            Some(Reply::Delay(delay, text)) => {
                tokio::time::sleep(delay).await;
                text
            }
            None => self.default_reply(&task, &context_of(&messages)),
        };

        Ok(CompletionResponse {
            content,
            model: "scripted".to_string(),
            usage: TokenUsage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            },
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Node with objectives A (0.5), B (0.8) and C (0.3); B is already mastered.
pub fn calculus_node() -> NodeSnapshot {
    NodeSnapshot {
        node_id: "calc".to_string(),
        title: "Calculus".to_string(),
        objectives: vec![
            Objective::new("A", "Understand limits", 0.5),
            Objective::new("B", "Recognize continuity", 0.8),
            Objective::new("C", "Compute derivatives", 0.3),
        ],
        prerequisites: vec![],
    }
}

pub fn with_prerequisites(mut node: NodeSnapshot) -> NodeSnapshot {
    node.prerequisites = vec![
        Objective::new("alg-1", "Solve linear equations", 0.9).with_node("algebra"),
        Objective::new("fn-1", "Read function notation", 0.4).with_node("functions"),
    ];
    node
}

pub struct Harness {
    pub engine: SessionEngine,
    pub knowledge: Arc<MemoryKnowledge>,
    pub transcript: Arc<MemoryTranscript>,
    pub model: Arc<ScriptedProvider>,
    pub primary: Arc<ScriptedProvider>,
    pub fallback: Arc<ScriptedProvider>,
}

pub struct HarnessBuilder {
    node: NodeSnapshot,
    model: ScriptedProvider,
    primary: ScriptedProvider,
    fallback: ScriptedProvider,
    grading_timeout: Duration,
}

impl HarnessBuilder {
    pub fn new(node: NodeSnapshot) -> Self {
        Self {
            node,
            model: ScriptedProvider::new("model"),
            primary: ScriptedProvider::new("primary"),
            fallback: ScriptedProvider::new("fallback"),
            grading_timeout: Duration::from_secs(5),
        }
    }

    pub fn model(mut self, provider: ScriptedProvider) -> Self {
        self.model = provider;
        self
    }

    pub fn primary(mut self, provider: ScriptedProvider) -> Self {
        self.primary = provider;
        self
    }

    pub fn fallback(mut self, provider: ScriptedProvider) -> Self {
        self.fallback = provider;
        self
    }

    pub fn grading_timeout(mut self, timeout: Duration) -> Self {
        self.grading_timeout = timeout;
        self
    }

    pub fn build(self) -> Harness {
        let knowledge = Arc::new(MemoryKnowledge::new().with_node(self.node));
        let transcript = Arc::new(MemoryTranscript::new());
        let model = Arc::new(self.model);
        let primary = Arc::new(self.primary);
        let fallback = Arc::new(self.fallback);

        let gateway = |client: Arc<ScriptedProvider>, timeout: Duration| {
            ModelGateway::new(client, timeout)
        };
        let models = EngineModels {
            tutor: gateway(model.clone(), Duration::from_secs(5)),
            generator: gateway(model.clone(), Duration::from_secs(5)),
            grading: GradingStrategy::tiered(
                gateway(primary.clone(), self.grading_timeout),
                gateway(fallback.clone(), self.grading_timeout),
            ),
        };
        let collaborators = Collaborators {
            objectives: knowledge.clone(),
            mastery: knowledge.clone(),
            transcript: transcript.clone(),
        };

        Harness {
            engine: SessionEngine::new(collaborators, models, SessionPolicy::default()),
            knowledge,
            transcript,
            model,
            primary,
            fallback,
        }
    }
}

/// The reply a cooperative learner gives in `state`'s waiting phase.
pub fn default_input(state: &SessionState, choice: PrereqChoice) -> UserInput {
    match state.current_phase {
        Phase::TutorIntro => UserInput::Choice(choice),
        Phase::PrereqQuizAsk => UserInput::text("B"),
        Phase::QuizAsk => UserInput::Answers(vec!["micro answer".to_string(); state.micro_quiz.len()]),
        Phase::FinalTestAsk => UserInput::Answers(
            (1..=state.final_test_questions.len())
                .map(|i| format!("final answer {}", i))
                .collect(),
        ),
        _ => UserInput::text("I think it is about how things change."),
    }
}

/// Step from a fresh state until the session suspends at `target` (or ends).
/// Returns the last outcome.
pub async fn run_until(
    engine: &SessionEngine,
    mut state: SessionState,
    choice: PrereqChoice,
    target: Phase,
) -> StepOutcome {
    let mut input = None;
    loop {
        let outcome = engine.step(&state, input.take()).await.unwrap();
        if !outcome.suspended || outcome.state.current_phase == target {
            return outcome;
        }
        state = outcome.state;
        input = Some(default_input(&state, choice));
    }
}

/// Run a whole session with cooperative answers and collect every output.
pub async fn run_to_end(
    engine: &SessionEngine,
    state: SessionState,
    choice: PrereqChoice,
) -> (SessionState, Vec<String>) {
    let mut outputs = Vec::new();
    let mut state = state;
    let mut input = None;
    loop {
        let outcome = engine.step(&state, input.take()).await.unwrap();
        outputs.extend(outcome.output.clone());
        state = outcome.state;
        if !outcome.suspended {
            return (state, outputs);
        }
        input = Some(default_input(&state, choice));
    }
}
