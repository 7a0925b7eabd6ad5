//! Learning objectives and the teach/known partition.

use serde::{Deserialize, Serialize};

/// Mastery at or above this value counts as already learned.
pub const MASTERY_THRESHOLD: f64 = 0.70;

/// Tolerance for comparing computed mean scores against the threshold, so
/// that means like 0.7000000001 and 0.6999999999 land on the expected side.
/// Stored mastery is compared exactly.
const THRESHOLD_EPSILON: f64 = 1e-9;

/// One learning objective as snapshotted at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub description: String,
    pub mastery: f64,
    /// Node the objective belongs to; set for prerequisite objectives so the
    /// recap can group them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl Objective {
    pub fn new(id: impl Into<String>, description: impl Into<String>, mastery: f64) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            mastery: clamp_unit(mastery),
            node_id: None,
        }
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Stored mastery at or above `threshold`, with no tolerance.
    pub fn is_mastered(&self, threshold: f64) -> bool {
        self.mastery >= threshold
    }
}

/// Result of splitting a node's objectives at session start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectivePartition {
    pub to_teach: Vec<Objective>,
    pub already_known: Vec<Objective>,
}

/// Split objectives into those needing teaching (mastery below `threshold`)
/// and those already known. Both halves keep the input order.
pub fn partition_objectives(objectives: &[Objective], threshold: f64) -> ObjectivePartition {
    let (already_known, to_teach): (Vec<_>, Vec<_>) = objectives
        .iter()
        .cloned()
        .partition(|objective| objective.is_mastered(threshold));
    ObjectivePartition {
        to_teach,
        already_known,
    }
}

pub fn meets_threshold(score: f64, threshold: f64) -> bool {
    score + THRESHOLD_EPSILON >= threshold
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
