//! Phase routing. One call to [`PhaseMachine::run`] consumes at most one
//! learner input, then advances through automatic phases until it reaches a
//! waiting phase (present and suspend) or the end.

use super::collaborators::{MasteryUpdater, TranscriptEntry, TranscriptSink};
use super::objective::{meets_threshold, Objective};
use super::phase::{Phase, PrereqChoice};
use super::policy::SessionPolicy;
use super::state::{Assessment, Message, MessageTag, SessionState, Speaker, UserInput};
use crate::error::SessionError;
use crate::grading::{GradingInput, GradingOutcome, GradingPipeline};
use crate::quiz::{Question, QuizConstraints, QuizGenerator};
use crate::tutor::Tutor;
use chrono::Utc;
use tracing::{debug, info, warn};

pub(crate) struct PhaseMachine<'a> {
    pub tutor: &'a Tutor,
    pub generator: &'a QuizGenerator,
    pub grader: &'a GradingPipeline,
    pub mastery: &'a dyn MasteryUpdater,
    pub transcript: &'a dyn TranscriptSink,
    pub policy: &'a SessionPolicy,
}

/// Outward text produced during one step.
#[derive(Default)]
struct Outbox {
    parts: Vec<String>,
}

impl Outbox {
    fn push(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.parts.push(text.to_string());
        }
    }

    fn into_output(self) -> Option<String> {
        if self.parts.is_empty() {
            None
        } else {
            Some(self.parts.join("\n\n"))
        }
    }
}

impl<'a> PhaseMachine<'a> {
    /// Returns the joined output and whether the session is suspended.
    pub async fn run(
        &self,
        state: &mut SessionState,
        input: Option<UserInput>,
    ) -> Result<(Option<String>, bool), SessionError> {
        let phase = state.current_phase;
        if phase.is_terminal() {
            return Err(SessionError::InvalidTransition {
                phase,
                reason: "session has already ended".to_string(),
            });
        }

        let mut outbox = Outbox::default();
        if self.early_exit_pending(state) {
            if input.is_some() {
                debug!(
                    session_id = %state.session_id,
                    phase = %phase,
                    "Discarding input received after end request"
                );
            }
            self.route_to_final_test(state);
        } else if phase.is_waiting() {
            let input = input.ok_or_else(|| SessionError::InvalidTransition {
                phase,
                reason: "phase is waiting for learner input".to_string(),
            })?;
            self.accept(state, input, &mut outbox).await?;
            state.turn_count += 1;
        } else if input.is_some() {
            return Err(SessionError::InvalidTransition {
                phase,
                reason: "phase does not accept input".to_string(),
            });
        }

        loop {
            if self.early_exit_pending(state) {
                self.route_to_final_test(state);
            }
            let phase = state.current_phase;
            if phase.is_terminal() {
                return Ok((outbox.into_output(), false));
            }
            if phase.is_waiting() {
                if self.present(state, &mut outbox).await {
                    return Ok((outbox.into_output(), true));
                }
                continue;
            }
            self.advance(state, &mut outbox).await;
        }
    }

    fn early_exit_pending(&self, state: &SessionState) -> bool {
        state.force_end_requested && state.current_phase.precedes_final_test()
    }

    fn route_to_final_test(&self, state: &mut SessionState) {
        info!(
            session_id = %state.session_id,
            phase = %state.current_phase,
            covered = state.covered_objective_ids.len(),
            "End requested; moving to final test"
        );
        state.micro_quiz.clear();
        state.micro_quiz_answers.clear();
        self.transition(state, Phase::FinalTestBuild);
    }

    fn transition(&self, state: &mut SessionState, next: Phase) {
        debug!(
            session_id = %state.session_id,
            from = %state.current_phase,
            to = %next,
            "Phase transition"
        );
        state.current_phase = next;
    }

    /// Next objective's probe, or the final test when none are left.
    fn teaching_entry(state: &SessionState) -> Phase {
        if state.current_objective_index < state.objectives_to_teach.len() {
            Phase::ProbeAsk
        } else {
            Phase::FinalTestBuild
        }
    }

    fn push_message(
        &self,
        state: &mut SessionState,
        speaker: Speaker,
        tag: MessageTag,
        content: String,
        low_confidence: bool,
    ) {
        let message = Message {
            speaker,
            tag,
            phase: state.current_phase,
            content,
            low_confidence,
            timestamp: Utc::now(),
        };
        let seq = state.messages.len() as u64;
        let entry = TranscriptEntry::from_message(&state.session_id, seq, &message);
        state.messages.push(message);
        if let Err(err) = self.transcript.append(&entry) {
            warn!(
                session_id = %state.session_id,
                seq,
                error = %err,
                "Failed to append transcript entry"
            );
        }
    }

    fn say(
        &self,
        state: &mut SessionState,
        outbox: &mut Outbox,
        tag: MessageTag,
        content: String,
        low_confidence: bool,
    ) {
        outbox.push(&content);
        self.push_message(state, Speaker::Tutor, tag, content, low_confidence);
    }

    fn hear(&self, state: &mut SessionState, tag: MessageTag, content: String) {
        self.push_message(state, Speaker::Learner, tag, content, false);
    }

    fn invalid_input(phase: Phase) -> SessionError {
        SessionError::InvalidTransition {
            phase,
            reason: format!("expected {}", phase.expected_input().unwrap_or("no input")),
        }
    }

    /// Consume learner input in a waiting phase.
    async fn accept(
        &self,
        state: &mut SessionState,
        input: UserInput,
        outbox: &mut Outbox,
    ) -> Result<(), SessionError> {
        let phase = state.current_phase;
        match phase {
            Phase::TutorIntro => {
                let choice = input.into_choice().ok_or_else(|| Self::invalid_input(phase))?;
                self.hear(state, MessageTag::Intro, choice.as_str().to_string());
                state.prereq_choice = Some(choice);
                info!(session_id = %state.session_id, choice = choice.as_str(), "Prerequisite choice recorded");
                let next = match choice {
                    PrereqChoice::Quiz => Phase::PrereqQuizBuild,
                    PrereqChoice::Summary => Phase::PrereqRecap,
                };
                self.transition(state, next);
            }
            Phase::PrereqQuizAsk => {
                let answer = input
                    .into_single_answer()
                    .ok_or_else(|| Self::invalid_input(phase))?;
                let question = state
                    .prereq_quiz_questions
                    .get(state.prereq_quiz_position)
                    .cloned()
                    .ok_or_else(|| SessionError::InvalidTransition {
                        phase,
                        reason: "no prerequisite question is pending".to_string(),
                    })?;
                self.hear(state, MessageTag::PrereqQuiz, answer.clone());
                self.answer_prerequisite(state, outbox, &question, &answer).await;
            }
            Phase::ProbeAsk | Phase::ExplainPresent => {
                let reply = match input {
                    UserInput::Text(text) => text.trim().to_string(),
                    _ => return Err(Self::invalid_input(phase)),
                };
                self.hear(state, MessageTag::Conversation, reply);
                let next = if phase == Phase::ProbeAsk {
                    Phase::ProbeRespond
                } else {
                    Phase::ExplainRespond
                };
                self.transition(state, next);
            }
            Phase::QuizAsk => {
                let answers = input
                    .into_answers(state.micro_quiz.len())
                    .ok_or_else(|| Self::invalid_input(phase))?;
                for answer in &answers {
                    self.hear(state, MessageTag::MicroQuiz, answer.clone());
                }
                state.micro_quiz_answers = answers;
                self.transition(state, Phase::QuizEvaluate);
            }
            Phase::FinalTestAsk => {
                let answers = input
                    .into_answers(state.final_test_questions.len())
                    .ok_or_else(|| Self::invalid_input(phase))?;
                for answer in &answers {
                    self.hear(state, MessageTag::FinalTest, answer.clone());
                }
                self.transition(state, Phase::GradePrep);
            }
            other => {
                return Err(SessionError::InvalidTransition {
                    phase: other,
                    reason: "phase does not accept input".to_string(),
                });
            }
        }
        Ok(())
    }

    async fn answer_prerequisite(
        &self,
        state: &mut SessionState,
        outbox: &mut Outbox,
        question: &Question,
        answer: &str,
    ) {
        let verdict = self.tutor.check_answer(question, answer).await;
        let mut feedback = verdict.feedback;
        match verdict.correct {
            Some(true) => state.prereq_quiz_correct += 1,
            Some(false) => {
                let reminders: Vec<String> = state
                    .prerequisite_objectives
                    .iter()
                    .filter(|o| question.references(&o.id))
                    .map(|o| format!("Quick reminder: {}.", o.description))
                    .collect();
                if !reminders.is_empty() {
                    feedback.push('\n');
                    feedback.push_str(&reminders.join("\n"));
                }
            }
            None => {}
        }

        state.prereq_quiz_position += 1;
        let total = state.prereq_quiz_questions.len();
        if state.prereq_quiz_position >= total {
            feedback.push_str(&format!(
                "\n\nYou got {} out of {} correct. Now let's dive into {}.",
                state.prereq_quiz_correct, total, state.node_title
            ));
            let next = Self::teaching_entry(state);
            self.say(state, outbox, MessageTag::PrereqQuiz, feedback, question.low_confidence);
            self.transition(state, next);
        } else {
            self.say(state, outbox, MessageTag::PrereqQuiz, feedback, question.low_confidence);
        }
    }

    /// Present the current waiting phase. Returns false when there was
    /// nothing to present and the phase was rerouted instead.
    async fn present(&self, state: &mut SessionState, outbox: &mut Outbox) -> bool {
        match state.current_phase {
            Phase::TutorIntro => {
                let reply = self
                    .tutor
                    .introduce(
                        &state.node_title,
                        &state.objectives_to_teach,
                        &state.objectives_already_known,
                    )
                    .await;
                self.say(state, outbox, MessageTag::Intro, reply.text, reply.degraded);
            }
            Phase::PrereqQuizAsk => {
                let position = state.prereq_quiz_position;
                let total = state.prereq_quiz_questions.len();
                let Some(question) = state.prereq_quiz_questions.get(position).cloned() else {
                    let next = Self::teaching_entry(state);
                    self.transition(state, next);
                    return false;
                };
                let text = format!("Question {} of {}:\n{}", position + 1, total, question.render());
                self.say(state, outbox, MessageTag::PrereqQuiz, text, question.low_confidence);
            }
            Phase::ProbeAsk => {
                let Some(objective) = state.current_objective().cloned() else {
                    self.transition(state, Phase::FinalTestBuild);
                    return false;
                };
                state.mark_covered(&objective.id);
                let reply = self
                    .tutor
                    .probe(
                        &objective,
                        state.current_objective_index + 1,
                        state.objectives_to_teach.len(),
                    )
                    .await;
                self.say(state, outbox, MessageTag::Conversation, reply.text, reply.degraded);
            }
            Phase::ExplainPresent => {
                let Some(objective) = state.current_objective().cloned() else {
                    self.transition(state, Phase::FinalTestBuild);
                    return false;
                };
                let learner_reply = state
                    .last_learner_message()
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                let reply = self.tutor.explain(&objective, &learner_reply).await;
                self.say(state, outbox, MessageTag::Conversation, reply.text, reply.degraded);
            }
            Phase::QuizAsk => {
                let Some(objective) = state.current_objective().cloned() else {
                    self.transition(state, Phase::FinalTestBuild);
                    return false;
                };
                let quiz = self
                    .generator
                    .generate(
                        std::slice::from_ref(&objective),
                        &QuizConstraints::micro(self.policy.micro_quiz_max),
                    )
                    .await;
                let text = format!("Quick check:\n{}", numbered(&quiz.questions));
                state.micro_quiz = quiz.questions;
                self.say(state, outbox, MessageTag::MicroQuiz, text, quiz.degraded);
            }
            Phase::FinalTestAsk => {
                let text = format!(
                    "Final test: {} question(s) on what we covered. Answer each one; if you type \
                     them all at once, separate answers with a blank line.\n\n{}",
                    state.final_test_questions.len(),
                    numbered(&state.final_test_questions)
                );
                let low_confidence = state.final_test_low_confidence;
                self.say(state, outbox, MessageTag::FinalTest, text, low_confidence);
            }
            other => {
                warn!(session_id = %state.session_id, phase = %other, "Asked to present a non-waiting phase");
                return false;
            }
        }
        true
    }

    /// Run one automatic phase and move on.
    async fn advance(&self, state: &mut SessionState, outbox: &mut Outbox) {
        match state.current_phase {
            Phase::LoadContext => {
                info!(
                    session_id = %state.session_id,
                    node_id = %state.node_id,
                    to_teach = state.objectives_to_teach.len(),
                    already_known = state.objectives_already_known.len(),
                    prerequisites = state.prerequisite_objectives.len(),
                    "Session context loaded"
                );
                self.transition(state, Phase::TutorIntro);
            }
            Phase::PrereqRecap => {
                let reply = self
                    .tutor
                    .recap(&state.prerequisite_objectives, self.policy.mastery_threshold)
                    .await;
                let text = format!("{}\n\nNow let's dive into {}.", reply.text, state.node_title);
                self.say(state, outbox, MessageTag::PrereqRecap, text, reply.degraded);
                let next = Self::teaching_entry(state);
                self.transition(state, next);
            }
            Phase::PrereqQuizBuild => {
                let quiz = self
                    .generator
                    .generate(
                        &state.prerequisite_objectives,
                        &QuizConstraints::prerequisite(
                            self.policy.prereq_quiz_max,
                            &state.objectives_to_teach,
                        ),
                    )
                    .await;
                state.prereq_quiz_position = 0;
                state.prereq_quiz_correct = 0;
                if quiz.is_empty() {
                    state.prereq_quiz_questions = Vec::new();
                    debug!(session_id = %state.session_id, "No prerequisite questions; starting teaching");
                    let next = Self::teaching_entry(state);
                    self.transition(state, next);
                } else {
                    let count = quiz.questions.len();
                    state.prereq_quiz_questions = quiz.questions;
                    let text = format!(
                        "Let's check a few prerequisites first: {} quick question{}.",
                        count,
                        if count == 1 { "" } else { "s" }
                    );
                    self.say(state, outbox, MessageTag::PrereqQuiz, text, quiz.degraded);
                    self.transition(state, Phase::PrereqQuizAsk);
                }
            }
            Phase::ProbeRespond => self.transition(state, Phase::ExplainPresent),
            Phase::ExplainRespond => self.transition(state, Phase::QuizAsk),
            Phase::QuizEvaluate => self.evaluate_micro_quiz(state, outbox).await,
            Phase::FinalTestBuild => self.build_final_test(state).await,
            Phase::GradePrep => {
                let input = GradingInput::from_session(state);
                state.final_test_answers = input.items.into_iter().map(|item| item.answer).collect();
                self.transition(state, Phase::GraderCall);
            }
            Phase::GraderCall => self.grade(state).await,
            Phase::WrapUp => self.wrap_up(state, outbox),
            waiting_or_end => {
                warn!(session_id = %state.session_id, phase = %waiting_or_end, "No automatic step for phase");
            }
        }
    }

    async fn evaluate_micro_quiz(&self, state: &mut SessionState, outbox: &mut Outbox) {
        let questions = std::mem::take(&mut state.micro_quiz);
        let answers = std::mem::take(&mut state.micro_quiz_answers);
        let mut lines = Vec::with_capacity(questions.len());
        for (index, question) in questions.iter().enumerate() {
            let answer = answers.get(index).map(String::as_str).unwrap_or("");
            let verdict = self.tutor.check_answer(question, answer).await;
            if questions.len() > 1 {
                lines.push(format!("{}. {}", index + 1, verdict.feedback));
            } else {
                lines.push(verdict.feedback);
            }
        }

        state.current_objective_index += 1;
        let total = state.objectives_to_teach.len();
        let finished = state.current_objective_index >= total;
        lines.push(if finished {
            format!(
                "We've covered all {} objective{}. Time for a short final test.",
                total,
                if total == 1 { "" } else { "s" }
            )
        } else {
            "Let's move on to the next objective.".to_string()
        });
        let low_confidence = questions.iter().any(|q| q.low_confidence);
        self.say(state, outbox, MessageTag::MicroQuiz, lines.join("\n"), low_confidence);

        let next = if finished {
            Phase::FinalTestBuild
        } else {
            Phase::ProbeAsk
        };
        self.transition(state, next);
    }

    async fn build_final_test(&self, state: &mut SessionState) {
        let covered = state.covered_objectives();
        if covered.is_empty() {
            info!(session_id = %state.session_id, "Nothing covered; skipping final test");
            state.final_test_questions.clear();
            state.objective_scores.clear();
            state.assessment = Assessment::NotAssessed;
            self.transition(state, Phase::WrapUp);
            return;
        }

        let quiz = self
            .generator
            .generate(
                &covered,
                &QuizConstraints::final_test(&covered, self.policy.final_test_size),
            )
            .await;
        state.final_test_low_confidence = quiz.degraded;
        state.final_test_questions = quiz.questions;
        if state.final_test_questions.is_empty() {
            state.assessment = Assessment::NotAssessed;
            self.transition(state, Phase::WrapUp);
        } else {
            self.transition(state, Phase::FinalTestAsk);
        }
    }

    async fn grade(&self, state: &mut SessionState) {
        let covered = state.covered_objectives();
        let input = GradingInput::new(&state.final_test_questions, &state.final_test_answers);
        match self.grader.grade(&input, &covered).await {
            GradingOutcome::Graded(report) => {
                state.objective_scores = report
                    .objective_scores
                    .into_iter()
                    .filter(|(id, _)| state.covered_objective_ids.contains(id))
                    .collect();
                state.assessment = Assessment::Graded { tier: report.tier };
            }
            GradingOutcome::Ungraded { reason } => {
                warn!(session_id = %state.session_id, reason = %reason, "Session could not be graded");
                state.objective_scores.clear();
                state.assessment = Assessment::Ungraded { reason };
            }
        }
        self.transition(state, Phase::WrapUp);
    }

    fn wrap_up(&self, state: &mut SessionState, outbox: &mut Outbox) {
        if !state.mastery_reported {
            for (objective_id, score) in &state.objective_scores {
                match self.mastery.update(objective_id, *score) {
                    Ok(mastery) => debug!(
                        session_id = %state.session_id,
                        objective_id = %objective_id,
                        score,
                        mastery,
                        "Mastery updated"
                    ),
                    Err(err) => warn!(
                        session_id = %state.session_id,
                        objective_id = %objective_id,
                        error = %err,
                        "Failed to update mastery"
                    ),
                }
            }
            state.mastery_reported = true;
        }

        state.ended_at = Some(Utc::now());
        let summary = wrap_up_summary(state, self.policy.mastery_threshold);
        self.say(state, outbox, MessageTag::Summary, summary, false);
        info!(
            session_id = %state.session_id,
            covered = state.covered_objective_ids.len(),
            overall = ?state.overall_score(),
            turns = state.turn_count,
            "Session finished"
        );
        self.transition(state, Phase::End);
    }
}

fn numbered(questions: &[Question]) -> String {
    questions
        .iter()
        .enumerate()
        .map(|(index, question)| format!("{}. {}", index + 1, question.render()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn score_marker(score: f64, threshold: f64) -> &'static str {
    if meets_threshold(score, threshold) {
        "✓"
    } else if meets_threshold(score, 0.5) {
        "~"
    } else {
        "✗"
    }
}

fn describe(objectives: &[Objective], id: &str) -> String {
    objectives
        .iter()
        .find(|o| o.id == id)
        .map(|o| o.description.clone())
        .unwrap_or_else(|| id.to_string())
}

/// Closing message: per-objective results, overall score, and duration.
pub fn wrap_up_summary(state: &SessionState, threshold: f64) -> String {
    let mut sections = vec![format!("Session summary: {}", state.node_title)];

    let covered: Vec<String> = state
        .covered_objective_ids
        .iter()
        .map(|id| describe(&state.objectives_to_teach, id))
        .collect();
    sections.push(if covered.is_empty() {
        "Objectives covered: none".to_string()
    } else {
        format!("Objectives covered: {}", covered.join("; "))
    });

    match &state.assessment {
        Assessment::Graded { .. } => {
            let rows: Vec<String> = state
                .objective_scores
                .iter()
                .map(|(id, score)| {
                    format!(
                        "{} {}: {:.0}%",
                        score_marker(*score, threshold),
                        describe(&state.objectives_to_teach, id),
                        score * 100.0
                    )
                })
                .collect();
            sections.push(rows.join("\n"));
            if let Some(overall) = state.overall_score() {
                let verdict = if meets_threshold(overall, threshold) {
                    "you've mastered this topic"
                } else {
                    "not mastered yet; a review session will help"
                };
                sections.push(format!("Overall score: {:.0}% ({})", overall * 100.0, verdict));
            }
        }
        Assessment::Ungraded { .. } | Assessment::Pending => {
            sections.push(
                "We were unable to grade this session, so your mastery has not been updated."
                    .to_string(),
            );
        }
        Assessment::NotAssessed => {
            sections.push(if state.objectives_to_teach.is_empty() {
                "You had already mastered every objective, so there was nothing to assess."
                    .to_string()
            } else {
                "No objectives were covered, so there was nothing to assess.".to_string()
            });
        }
    }

    sections.push(format!("Duration: {:.1} minutes", state.elapsed_minutes()));
    sections.join("\n\n")
}
