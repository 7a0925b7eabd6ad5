//! Session presentation: tutor turns, banners, and the checkpoint list.

use crate::session::{Assessment, SessionState};
use crate::store::CheckpointSummary;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub fn format_session_banner(state: &SessionState) -> String {
    format!(
        "{}\n{}",
        format_section_heading(&format!("Learning: {}", state.node_title)),
        format!(
            "Session {}  (type /end or press Ctrl-D to skip to the final test)",
            state.session_id
        )
        .dimmed()
    )
}

/// One step's worth of tutor output.
pub fn format_tutor_output(text: &str) -> String {
    format!("\n{}\n{}\n", "Tutor".cyan().bold(), text)
}

pub fn format_session_finished(state: &SessionState) -> String {
    let status = match &state.assessment {
        Assessment::Graded { tier } => format!("graded ({} tier)", tier).green().to_string(),
        Assessment::Ungraded { .. } => "ungraded".yellow().to_string(),
        Assessment::NotAssessed => "not assessed".yellow().to_string(),
        Assessment::Pending => "pending".dimmed().to_string(),
    };
    format!(
        "Session {} finished: {}.\nTranscript: mentor transcript {}",
        state.session_id, status, state.session_id
    )
}

pub fn format_sessions_table(rows: &[CheckpointSummary]) -> String {
    if rows.is_empty() {
        return "No saved sessions.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Session", "Node", "Phase", "Started", "Status"]);
    for row in rows {
        table.add_row(vec![
            row.session_id.clone(),
            row.node_id.clone(),
            row.phase.to_string(),
            row.started_at.format("%Y-%m-%d %H:%M").to_string(),
            if row.finished { "finished" } else { "open" }.to_string(),
        ]);
    }
    table.to_string()
}
