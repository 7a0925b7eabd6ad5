//! CLI presentation: text and json formatters per command family.

mod knowledge;
mod session;
mod transcript;

pub use knowledge::{
    format_import_summary, format_node_list, format_objectives_json, format_objectives_text,
};
pub use session::{
    format_section_heading, format_session_banner, format_session_finished,
    format_sessions_table, format_tutor_output,
};
pub use transcript::render_transcript_markdown;
