//! Knowledge graph nodes, objectives, prerequisite edges, and mastery.

use super::{get_json, put_json, scan_json, to_storage_db};
use crate::error::StorageError;
use crate::session::collaborators::blend_mastery;
use crate::session::objective::clamp_unit;
use crate::session::{MasteryUpdater, NodeSnapshot, Objective, ObjectiveStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

const TREE_NODES: &str = "kg_nodes";
const TREE_OBJECTIVES: &str = "kg_objectives";
const TREE_PREREQUISITES: &str = "kg_prerequisites";
const EDGE_SEPARATOR: char = '\u{0}';

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub title: String,
    /// Objective ids in teaching order
    pub objective_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveRecord {
    pub id: String,
    pub node_id: String,
    pub description: String,
    pub mastery: f64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ObjectiveRecord {
    fn to_objective(&self) -> Objective {
        Objective::new(&self.id, &self.description, self.mastery)
    }
}

/// Import document: `{"nodes": [...], "edges": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub objectives: Vec<GraphObjective>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphObjective {
    pub id: String,
    pub description: String,
    /// Keeps the stored mastery (or 0.0 for new objectives) when absent
    #[serde(default)]
    pub mastery: Option<f64>,
}

/// `prerequisite` must be learned before `node`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    #[serde(alias = "source")]
    pub prerequisite: String,
    #[serde(alias = "target")]
    pub node: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub nodes: usize,
    pub objectives: usize,
    pub edges: usize,
}

#[derive(Clone)]
pub struct KnowledgeStore {
    db: Db,
    nodes: Tree,
    objectives: Tree,
    prerequisites: Tree,
}

impl KnowledgeStore {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        let nodes = db.open_tree(TREE_NODES).map_err(to_storage_db)?;
        let objectives = db.open_tree(TREE_OBJECTIVES).map_err(to_storage_db)?;
        let prerequisites = db.open_tree(TREE_PREREQUISITES).map_err(to_storage_db)?;
        Ok(Self {
            db,
            nodes,
            objectives,
            prerequisites,
        })
    }

    pub fn shared(db: Db) -> Result<Arc<Self>, StorageError> {
        Ok(Arc::new(Self::new(db)?))
    }

    pub fn get_node(&self, node_id: &str) -> Result<Option<NodeRecord>, StorageError> {
        get_json(&self.nodes, node_id.as_bytes())
    }

    pub fn list_nodes(&self) -> Result<Vec<NodeRecord>, StorageError> {
        let mut nodes: Vec<NodeRecord> = scan_json(&self.nodes, b"")?;
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    pub fn get_objective(&self, objective_id: &str) -> Result<Option<ObjectiveRecord>, StorageError> {
        get_json(&self.objectives, objective_id.as_bytes())
    }

    /// Store a node with its objectives, replacing any previous version.
    pub fn put_node(&self, node: &NodeRecord, objectives: &[ObjectiveRecord]) -> Result<(), StorageError> {
        for objective in objectives {
            put_json(&self.objectives, objective.id.as_bytes(), objective)?;
        }
        put_json(&self.nodes, node.id.as_bytes(), node)
    }

    /// Objectives of a node in teaching order.
    pub fn objectives_for(&self, node_id: &str) -> Result<Vec<ObjectiveRecord>, StorageError> {
        let node = self
            .get_node(node_id)?
            .ok_or_else(|| StorageError::NodeNotFound(node_id.to_string()))?;
        let mut out = Vec::with_capacity(node.objective_ids.len());
        for objective_id in &node.objective_ids {
            let record = self
                .get_objective(objective_id)?
                .ok_or_else(|| StorageError::ObjectiveNotFound(objective_id.clone()))?;
            out.push(record);
        }
        Ok(out)
    }

    pub fn add_prerequisite(&self, prerequisite: &str, node_id: &str) -> Result<(), StorageError> {
        if prerequisite == node_id {
            return Err(StorageError::InvalidRecord(format!(
                "node {} cannot be its own prerequisite",
                node_id
            )));
        }
        for id in [prerequisite, node_id] {
            if self.get_node(id)?.is_none() {
                return Err(StorageError::NodeNotFound(id.to_string()));
            }
        }
        let key = edge_key(node_id, prerequisite);
        self.prerequisites
            .insert(key.as_bytes(), prerequisite.as_bytes())
            .map_err(to_storage_db)?;
        Ok(())
    }

    /// Direct prerequisite node ids of `node_id`, sorted.
    pub fn prerequisites_of(&self, node_id: &str) -> Result<Vec<String>, StorageError> {
        let prefix = format!("{}{}", node_id, EDGE_SEPARATOR);
        let mut out = Vec::new();
        for result in self.prerequisites.scan_prefix(prefix.as_bytes()) {
            let (_, value) = result.map_err(to_storage_db)?;
            out.push(String::from_utf8_lossy(&value).into_owned());
        }
        out.sort();
        Ok(out)
    }

    /// Objectives of all direct prerequisite nodes, tagged with their node.
    pub fn prerequisite_objectives(&self, node_id: &str) -> Result<Vec<Objective>, StorageError> {
        let mut out = Vec::new();
        for prerequisite in self.prerequisites_of(node_id)? {
            for record in self.objectives_for(&prerequisite)? {
                out.push(record.to_objective().with_node(prerequisite.clone()));
            }
        }
        Ok(out)
    }

    /// Mean mastery across a node's objectives.
    pub fn node_mastery(&self, node_id: &str) -> Result<Option<f64>, StorageError> {
        let objectives = self.objectives_for(node_id)?;
        if objectives.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            objectives.iter().map(|o| o.mastery).sum::<f64>() / objectives.len() as f64,
        ))
    }

    /// Load a graph document. Edges may point at nodes already in the store.
    pub fn import(&self, graph: &KnowledgeGraph) -> Result<ImportSummary, StorageError> {
        let mut seen = HashSet::new();
        for node in &graph.nodes {
            if node.id.trim().is_empty() {
                return Err(StorageError::InvalidRecord("node id must not be empty".to_string()));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(StorageError::InvalidRecord(format!("duplicate node {}", node.id)));
            }
        }

        let mut summary = ImportSummary::default();
        for node in &graph.nodes {
            let mut records = Vec::with_capacity(node.objectives.len());
            for objective in &node.objectives {
                let previous = self.get_objective(&objective.id)?;
                let mastery = objective
                    .mastery
                    .or(previous.map(|p| p.mastery))
                    .unwrap_or(0.0);
                records.push(ObjectiveRecord {
                    id: objective.id.clone(),
                    node_id: node.id.clone(),
                    description: objective.description.clone(),
                    mastery: clamp_unit(mastery),
                    updated_at: None,
                });
            }
            let record = NodeRecord {
                id: node.id.clone(),
                title: node.title.clone().unwrap_or_else(|| node.id.clone()),
                objective_ids: records.iter().map(|r| r.id.clone()).collect(),
            };
            self.put_node(&record, &records)?;
            summary.nodes += 1;
            summary.objectives += records.len();
        }

        for edge in &graph.edges {
            self.add_prerequisite(&edge.prerequisite, &edge.node)?;
            summary.edges += 1;
        }

        self.db.flush().map_err(to_storage_db)?;
        info!(
            nodes = summary.nodes,
            objectives = summary.objectives,
            edges = summary.edges,
            "Knowledge graph imported"
        );
        Ok(summary)
    }
}

fn edge_key(node_id: &str, prerequisite: &str) -> String {
    format!("{}{}{}", node_id, EDGE_SEPARATOR, prerequisite)
}

impl ObjectiveStore for KnowledgeStore {
    fn load(&self, node_id: &str) -> Result<Option<NodeSnapshot>, StorageError> {
        let Some(node) = self.get_node(node_id)? else {
            return Ok(None);
        };
        let objectives = self
            .objectives_for(node_id)?
            .iter()
            .map(ObjectiveRecord::to_objective)
            .collect();
        Ok(Some(NodeSnapshot {
            node_id: node.id,
            title: node.title,
            objectives,
            prerequisites: self.prerequisite_objectives(node_id)?,
        }))
    }
}

impl MasteryUpdater for KnowledgeStore {
    fn update(&self, objective_id: &str, score: f64) -> Result<f64, StorageError> {
        let mut record = self
            .get_objective(objective_id)?
            .ok_or_else(|| StorageError::ObjectiveNotFound(objective_id.to_string()))?;
        let previous = record.mastery;
        record.mastery = blend_mastery(previous, score);
        record.updated_at = Some(Utc::now());
        put_json(&self.objectives, objective_id.as_bytes(), &record)?;
        debug!(
            objective_id,
            previous,
            score,
            mastery = record.mastery,
            "Stored mastery"
        );
        Ok(record.mastery)
    }
}
