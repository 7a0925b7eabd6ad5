//! Session engine facade: `start` and `step`.

use super::collaborators::{MasteryUpdater, ObjectiveStore, TranscriptSink};
use super::machine::PhaseMachine;
use super::policy::SessionPolicy;
use super::state::{new_session_id, SessionState, StepOutcome, UserInput};
use crate::config::MentorConfig;
use crate::error::{ApiError, SessionError};
use crate::grading::{GradingPipeline, GradingStrategy, GradingTier};
use crate::provider::{ModelGateway, ProviderRegistry};
use crate::quiz::QuizGenerator;
use crate::tutor::Tutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// External collaborators the engine reads from and reports to.
#[derive(Clone)]
pub struct Collaborators {
    pub objectives: Arc<dyn ObjectiveStore>,
    pub mastery: Arc<dyn MasteryUpdater>,
    pub transcript: Arc<dyn TranscriptSink>,
}

/// Model roles used by a session.
#[derive(Clone)]
pub struct EngineModels {
    pub tutor: ModelGateway,
    pub generator: ModelGateway,
    pub grading: GradingStrategy,
}

impl EngineModels {
    /// Resolve each role's named provider from configuration.
    pub fn from_config(config: &MentorConfig) -> Result<Self, ApiError> {
        let registry = ProviderRegistry::from_config(config);
        let policy = &config.session;
        let gateway = |name: &str, timeout: Duration| -> Result<ModelGateway, ApiError> {
            let client = registry.create_client(name)?;
            let options = registry.get_or_error(name)?.default_options.clone();
            Ok(ModelGateway::new(client, timeout).with_options(options))
        };

        let grading = GradingStrategy {
            tiers: vec![
                GradingTier::new(
                    "primary",
                    gateway(&config.models.grader_primary, policy.grading_timeout())?,
                    policy.primary_grading_attempts,
                ),
                GradingTier::new(
                    "fallback",
                    gateway(&config.models.grader_fallback, policy.grading_timeout())?,
                    1,
                ),
            ],
        };

        Ok(Self {
            tutor: gateway(&config.models.tutor, policy.generation_timeout())?,
            generator: gateway(&config.models.generator, policy.generation_timeout())?,
            grading,
        })
    }
}

pub struct SessionEngine {
    collaborators: Collaborators,
    tutor: Tutor,
    generator: QuizGenerator,
    grader: GradingPipeline,
    policy: SessionPolicy,
}

impl SessionEngine {
    pub fn new(collaborators: Collaborators, models: EngineModels, policy: SessionPolicy) -> Self {
        Self {
            collaborators,
            tutor: Tutor::new(models.tutor, policy.recap_word_limit),
            generator: QuizGenerator::new(models.generator),
            grader: GradingPipeline::new(models.grading),
            policy,
        }
    }

    pub fn from_config(config: &MentorConfig, collaborators: Collaborators) -> Result<Self, ApiError> {
        let models = EngineModels::from_config(config)?;
        Ok(Self::new(collaborators, models, config.session.clone()))
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Snapshot the node's objectives and create a session in `LoadContext`.
    pub fn start(&self, node_id: &str) -> Result<SessionState, SessionError> {
        let snapshot = self
            .collaborators
            .objectives
            .load(node_id)?
            .ok_or_else(|| SessionError::NodeNotFound(node_id.to_string()))?;

        let state = SessionState::new(
            new_session_id(),
            snapshot.node_id,
            snapshot.title,
            snapshot.objectives,
            snapshot.prerequisites,
            self.policy.mastery_threshold,
        );
        info!(
            session_id = %state.session_id,
            node_id = %state.node_id,
            objectives = state.all_objectives.len(),
            "Session created"
        );
        Ok(state)
    }

    /// Advance the session by one learner turn. The given state is left
    /// untouched; the successor is returned in the outcome.
    pub async fn step(
        &self,
        state: &SessionState,
        input: Option<UserInput>,
    ) -> Result<StepOutcome, SessionError> {
        let mut next = state.clone();
        let machine = PhaseMachine {
            tutor: &self.tutor,
            generator: &self.generator,
            grader: &self.grader,
            mastery: self.collaborators.mastery.as_ref(),
            transcript: self.collaborators.transcript.as_ref(),
            policy: &self.policy,
        };
        let (output, suspended) = machine.run(&mut next, input).await?;
        Ok(StepOutcome {
            state: next,
            output,
            suspended,
        })
    }
}
