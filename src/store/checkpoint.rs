//! Session checkpoints so a host can resume between processes.

use super::{get_json, put_json, scan_json, to_storage_db};
use crate::error::StorageError;
use crate::session::{Phase, SessionState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sled::{Db, Tree};
use std::sync::Arc;
use tracing::debug;

const TREE_CHECKPOINTS: &str = "session_checkpoints";

/// Listing row for a stored session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointSummary {
    pub session_id: String,
    pub node_id: String,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub finished: bool,
}

impl From<&SessionState> for CheckpointSummary {
    fn from(state: &SessionState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            node_id: state.node_id.clone(),
            phase: state.current_phase,
            started_at: state.started_at,
            finished: state.is_finished(),
        }
    }
}

#[derive(Clone)]
pub struct CheckpointStore {
    db: Db,
    tree: Tree,
}

impl CheckpointStore {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        let tree = db.open_tree(TREE_CHECKPOINTS).map_err(to_storage_db)?;
        Ok(Self { db, tree })
    }

    pub fn shared(db: Db) -> Result<Arc<Self>, StorageError> {
        Ok(Arc::new(Self::new(db)?))
    }

    /// Overwrite the checkpoint for `state.session_id` and flush.
    pub fn save(&self, state: &SessionState) -> Result<(), StorageError> {
        put_json(&self.tree, state.session_id.as_bytes(), state)?;
        self.db.flush().map_err(to_storage_db)?;
        debug!(
            session_id = %state.session_id,
            phase = %state.current_phase,
            "Checkpoint saved"
        );
        Ok(())
    }

    pub fn load(&self, session_id: &str) -> Result<SessionState, StorageError> {
        get_json(&self.tree, session_id.as_bytes())?
            .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))
    }

    /// All checkpoints, newest first.
    pub fn list(&self) -> Result<Vec<CheckpointSummary>, StorageError> {
        let states: Vec<SessionState> = scan_json(&self.tree, b"")?;
        let mut summaries: Vec<CheckpointSummary> = states.iter().map(CheckpointSummary::from).collect();
        summaries.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.session_id.cmp(&a.session_id))
        });
        Ok(summaries)
    }

    /// Most recent unfinished session for a node.
    pub fn latest_open(&self, node_id: &str) -> Result<Option<CheckpointSummary>, StorageError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|s| s.node_id == node_id && !s.finished))
    }

    pub fn delete(&self, session_id: &str) -> Result<bool, StorageError> {
        let removed = self
            .tree
            .remove(session_id.as_bytes())
            .map_err(to_storage_db)?;
        Ok(removed.is_some())
    }
}
