//! Markdown transcript rendering.

use crate::session::{Objective, SessionState, Speaker, TranscriptEntry};

/// Render a transcript. The objectives header is included when the session
/// checkpoint is available.
pub fn render_transcript_markdown(
    session_id: &str,
    state: Option<&SessionState>,
    entries: &[TranscriptEntry],
    threshold: f64,
) -> String {
    let mut out = String::new();
    match state {
        Some(state) => {
            out.push_str(&format!("# {}\n\n", state.node_title));
            out.push_str(&format!(
                "Session `{}` started {}\n\n",
                session_id,
                state.started_at.format("%Y-%m-%d %H:%M UTC")
            ));
            push_objective_section(&mut out, "Objectives to learn", &state.objectives_to_teach);
            push_objective_section(
                &mut out,
                "Already mastered",
                &state.objectives_already_known,
            );
            if !state.prerequisite_objectives.is_empty() {
                out.push_str("## Prerequisites\n\n");
                for objective in &state.prerequisite_objectives {
                    let status = if objective.mastery >= threshold {
                        "mastered"
                    } else {
                        "needs review"
                    };
                    out.push_str(&format!(
                        "- {} ({}, {})\n",
                        objective.description,
                        objective.node_id.as_deref().unwrap_or("unknown node"),
                        status
                    ));
                }
                out.push('\n');
            }
        }
        None => out.push_str(&format!("# Session {}\n\n", session_id)),
    }

    out.push_str("## Transcript\n\n");
    if entries.is_empty() {
        out.push_str("_No messages recorded._\n");
        return out;
    }
    for entry in entries {
        let speaker = match entry.speaker {
            Speaker::Tutor => "Tutor",
            Speaker::Learner => "Learner",
        };
        let flag = if entry.low_confidence {
            " _(low confidence)_"
        } else {
            ""
        };
        out.push_str(&format!(
            "**{}** · {} · {}{}\n\n{}\n\n",
            speaker,
            entry.tag.as_str(),
            entry.timestamp.format("%H:%M:%S"),
            flag,
            entry.content.trim_end()
        ));
    }
    out
}

fn push_objective_section(out: &mut String, heading: &str, objectives: &[Objective]) {
    if objectives.is_empty() {
        return;
    }
    out.push_str(&format!("## {}\n\n", heading));
    for objective in objectives {
        out.push_str(&format!(
            "- {} ({:.0}%)\n",
            objective.description,
            objective.mastery * 100.0
        ));
    }
    out.push('\n');
}
