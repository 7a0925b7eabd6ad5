//! Interactive session loop: prompt the learner, step the engine, checkpoint.

use crate::error::ApiError;
use crate::session::{Phase, PrereqChoice, SessionEngine, SessionState, UserInput};
use crate::store::CheckpointStore;
use tracing::{debug, info};

/// Typed at any prompt to skip to the final test.
pub const END_COMMAND: &str = "/end";

/// What the learner did at a prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum LearnerReply {
    Input(UserInput),
    EndRequested,
}

/// Terminal seam so the loop can run against a script in tests.
pub trait LearnerConsole {
    fn show(&mut self, text: &str);
    fn ask(&mut self, state: &SessionState) -> Result<LearnerReply, ApiError>;
}

/// Drive a session until it finishes, saving a checkpoint after every step.
pub async fn drive_session(
    engine: &SessionEngine,
    checkpoints: &CheckpointStore,
    mut state: SessionState,
    console: &mut dyn LearnerConsole,
) -> Result<SessionState, ApiError> {
    checkpoints.save(&state)?;
    loop {
        if state.is_finished() {
            return Ok(state);
        }
        let phase = state.current_phase;
        let input = if phase.is_waiting() {
            match console.ask(&state)? {
                LearnerReply::Input(input) => Some(input),
                LearnerReply::EndRequested => end_request_input(&mut state),
            }
        } else {
            None
        };

        let outcome = engine.step(&state, input).await?;
        if let Some(output) = &outcome.output {
            console.show(output);
        }
        state = outcome.state;
        checkpoints.save(&state)?;
        debug!(
            session_id = %state.session_id,
            phase = %state.current_phase,
            suspended = outcome.suspended,
            "Step completed"
        );
        if !outcome.suspended {
            info!(session_id = %state.session_id, "Session finished");
            return Ok(state);
        }
    }
}

/// Before the final test an end request cuts teaching short. During the
/// final test it submits blank answers.
fn end_request_input(state: &mut SessionState) -> Option<UserInput> {
    if state.current_phase.precedes_final_test() {
        state.request_end();
        None
    } else {
        Some(UserInput::Answers(vec![
            String::new();
            state.final_test_questions.len()
        ]))
    }
}

/// Most recent tutor turn, shown again when resuming.
pub fn last_tutor_turn(state: &SessionState) -> Option<&str> {
    state
        .messages
        .iter()
        .rev()
        .find(|m| m.speaker == crate::session::Speaker::Tutor)
        .map(|m| m.content.as_str())
}

/// dialoguer-backed console.
#[derive(Default)]
pub struct TerminalConsole;

impl TerminalConsole {
    fn read_line(&self, prompt: &str) -> Result<Option<String>, ApiError> {
        use dialoguer::Input;

        match Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) if line.trim() == END_COMMAND => Ok(None),
            Ok(line) => Ok(Some(line)),
            Err(dialoguer::Error::IO(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(ApiError::InteractionFailed(format!(
                "Failed to get user input: {}",
                e
            ))),
        }
    }

    fn read_answers(&self, count: usize) -> Result<LearnerReply, ApiError> {
        let mut answers = Vec::with_capacity(count);
        for i in 0..count {
            let prompt = format!("Answer {} of {}", i + 1, count);
            match self.read_line(&prompt)? {
                Some(answer) => answers.push(answer),
                None => return Ok(LearnerReply::EndRequested),
            }
        }
        Ok(LearnerReply::Input(UserInput::Answers(answers)))
    }
}

impl LearnerConsole for TerminalConsole {
    fn show(&mut self, text: &str) {
        println!("{}", crate::cli::presentation::format_tutor_output(text));
    }

    fn ask(&mut self, state: &SessionState) -> Result<LearnerReply, ApiError> {
        match state.current_phase {
            Phase::TutorIntro => {
                use dialoguer::Select;

                let selection = Select::new()
                    .with_prompt("How would you like to review the prerequisites?")
                    .items(&[
                        "Summary of the prerequisites",
                        "Quick quiz on the prerequisites",
                        "Skip straight to the final test",
                    ])
                    .default(0)
                    .interact_opt()
                    .map_err(|e| {
                        ApiError::InteractionFailed(format!("Failed to get user input: {}", e))
                    })?;
                Ok(match selection {
                    Some(0) => LearnerReply::Input(UserInput::Choice(PrereqChoice::Summary)),
                    Some(1) => LearnerReply::Input(UserInput::Choice(PrereqChoice::Quiz)),
                    _ => LearnerReply::EndRequested,
                })
            }
            Phase::PrereqQuizAsk | Phase::ProbeAsk | Phase::ExplainPresent => {
                Ok(match self.read_line("You")? {
                    Some(line) => LearnerReply::Input(UserInput::Text(line)),
                    None => LearnerReply::EndRequested,
                })
            }
            Phase::QuizAsk => self.read_answers(state.micro_quiz.len()),
            Phase::FinalTestAsk => self.read_answers(state.final_test_questions.len()),
            other => Err(ApiError::InteractionFailed(format!(
                "Phase {} does not take learner input",
                other
            ))),
        }
    }
}
