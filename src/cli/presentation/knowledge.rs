//! Knowledge graph presentation: import summary, node list, objectives table.

use super::session::format_section_heading;
use crate::session::Objective;
use crate::store::{ImportSummary, NodeRecord, ObjectiveRecord};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;

pub fn format_import_summary(summary: &ImportSummary) -> String {
    format!(
        "Imported {} node(s), {} objective(s), {} prerequisite edge(s).",
        summary.nodes, summary.objectives, summary.edges
    )
}

/// Rows of (node, mean mastery).
pub fn format_node_list(rows: &[(NodeRecord, Option<f64>)]) -> String {
    if rows.is_empty() {
        return "No nodes found.\n\nUse 'mentor import <graph.json>' to load a knowledge graph."
            .to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Node", "Title", "Objectives", "Mastery"]);
    for (node, mastery) in rows {
        table.add_row(vec![
            node.id.clone(),
            node.title.clone(),
            node.objective_ids.len().to_string(),
            percent(*mastery),
        ]);
    }
    format!("{}\n\nTotal: {} node(s)", table, rows.len())
}

pub fn format_objectives_text(
    node: &NodeRecord,
    objectives: &[ObjectiveRecord],
    prerequisites: &[Objective],
    threshold: f64,
) -> String {
    let mut out = format!("{}\n\n", format_section_heading(&node.title));

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Objective", "Description", "Mastery", "Status"]);
    for objective in objectives {
        table.add_row(vec![
            objective.id.clone(),
            objective.description.clone(),
            percent(Some(objective.mastery)),
            status(objective.mastery, threshold).to_string(),
        ]);
    }
    out.push_str(&format!("{}\n", table));

    if !prerequisites.is_empty() {
        out.push_str(&format!("\n{}\n\n", format_section_heading("Prerequisites")));
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Node", "Objective", "Description", "Mastery"]);
        for objective in prerequisites {
            table.add_row(vec![
                objective.node_id.clone().unwrap_or_default(),
                objective.id.clone(),
                objective.description.clone(),
                percent(Some(objective.mastery)),
            ]);
        }
        out.push_str(&format!("{}\n", table));
    }
    out
}

pub fn format_objectives_json(
    node: &NodeRecord,
    objectives: &[ObjectiveRecord],
    prerequisites: &[Objective],
    threshold: f64,
) -> String {
    let out = json!({
        "node": node.id,
        "title": node.title,
        "objectives": objectives.iter().map(|o| json!({
            "id": o.id,
            "description": o.description,
            "mastery": o.mastery,
            "mastered": o.mastery >= threshold,
            "updated_at": o.updated_at,
        })).collect::<Vec<_>>(),
        "prerequisites": prerequisites.iter().map(|o| json!({
            "node": o.node_id,
            "id": o.id,
            "description": o.description,
            "mastery": o.mastery,
        })).collect::<Vec<_>>(),
    });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

fn percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.0}%", v * 100.0))
        .unwrap_or_else(|| "-".to_string())
}

fn status(mastery: f64, threshold: f64) -> &'static str {
    if mastery >= threshold {
        "mastered"
    } else {
        "to learn"
    }
}
