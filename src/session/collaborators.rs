//! Interfaces the engine consumes, plus in-memory implementations for hosts
//! that keep everything in process.

use super::objective::{clamp_unit, Objective};
use super::phase::Phase;
use super::state::{Message, MessageTag, Speaker};
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the objective store knows about one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node_id: String,
    pub title: String,
    pub objectives: Vec<Objective>,
    /// Objectives of prerequisite nodes, with `node_id` set.
    pub prerequisites: Vec<Objective>,
}

pub trait ObjectiveStore: Send + Sync {
    /// `Ok(None)` when the node does not exist.
    fn load(&self, node_id: &str) -> Result<Option<NodeSnapshot>, StorageError>;
}

pub trait MasteryUpdater: Send + Sync {
    /// Fold a session score into stored mastery and return the new value.
    fn update(&self, objective_id: &str, score: f64) -> Result<f64, StorageError>;
}

pub trait TranscriptSink: Send + Sync {
    fn append(&self, entry: &TranscriptEntry) -> Result<(), StorageError>;
}

/// One transcript line, written as messages are added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub session_id: String,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    pub speaker: Speaker,
    pub tag: MessageTag,
    pub content: String,
    #[serde(default)]
    pub low_confidence: bool,
}

impl TranscriptEntry {
    pub fn from_message(session_id: &str, seq: u64, message: &Message) -> Self {
        Self {
            session_id: session_id.to_string(),
            seq,
            timestamp: message.timestamp,
            phase: message.phase,
            speaker: message.speaker,
            tag: message.tag,
            content: message.content.clone(),
            low_confidence: message.low_confidence,
        }
    }
}

/// Averaging policy shared by the in-memory and sled stores.
pub fn blend_mastery(old: f64, score: f64) -> f64 {
    clamp_unit((clamp_unit(old) + clamp_unit(score)) / 2.0)
}

/// Objective store and mastery updater over a fixed set of nodes.
#[derive(Debug, Default)]
pub struct MemoryKnowledge {
    nodes: Mutex<HashMap<String, NodeSnapshot>>,
    updates: Mutex<Vec<(String, f64)>>,
}

impl MemoryKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, snapshot: NodeSnapshot) -> Self {
        self.nodes.lock().insert(snapshot.node_id.clone(), snapshot);
        self
    }

    /// `(objective_id, score)` pairs received, in call order.
    pub fn updates(&self) -> Vec<(String, f64)> {
        self.updates.lock().clone()
    }

    pub fn mastery_of(&self, objective_id: &str) -> Option<f64> {
        self.nodes
            .lock()
            .values()
            .flat_map(|node| node.objectives.iter())
            .find(|o| o.id == objective_id)
            .map(|o| o.mastery)
    }
}

impl ObjectiveStore for MemoryKnowledge {
    fn load(&self, node_id: &str) -> Result<Option<NodeSnapshot>, StorageError> {
        Ok(self.nodes.lock().get(node_id).cloned())
    }
}

impl MasteryUpdater for MemoryKnowledge {
    fn update(&self, objective_id: &str, score: f64) -> Result<f64, StorageError> {
        self.updates.lock().push((objective_id.to_string(), score));
        let mut nodes = self.nodes.lock();
        let objective = nodes
            .values_mut()
            .flat_map(|node| node.objectives.iter_mut())
            .find(|o| o.id == objective_id)
            .ok_or_else(|| StorageError::ObjectiveNotFound(objective_id.to_string()))?;
        objective.mastery = blend_mastery(objective.mastery, score);
        Ok(objective.mastery)
    }
}

/// Transcript sink that keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryTranscript {
    entries: Mutex<Vec<TranscriptEntry>>,
}

impl MemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.entries.lock().clone()
    }
}

impl TranscriptSink for MemoryTranscript {
    fn append(&self, entry: &TranscriptEntry) -> Result<(), StorageError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}
