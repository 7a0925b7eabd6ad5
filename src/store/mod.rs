//! Sled-backed persistence: the knowledge graph with mastery, transcripts,
//! and session checkpoints. Values are JSON documents.

pub mod checkpoint;
pub mod knowledge;
pub mod transcript;

pub use checkpoint::{CheckpointStore, CheckpointSummary};
pub use knowledge::{
    GraphEdge, GraphNode, GraphObjective, ImportSummary, KnowledgeGraph, KnowledgeStore, NodeRecord,
    ObjectiveRecord,
};
pub use transcript::TranscriptStore;

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::path::Path;

/// Open (or create) the database under `path`.
pub fn open_database(path: &Path) -> Result<Db, StorageError> {
    std::fs::create_dir_all(path)?;
    sled::open(path).map_err(to_storage_db)
}

pub(crate) fn to_storage_db(err: sled::Error) -> StorageError {
    StorageError::Database(err.to_string())
}

pub(crate) fn to_storage_data(err: serde_json::Error) -> StorageError {
    StorageError::InvalidRecord(err.to_string())
}

pub(crate) fn put_json<T: Serialize>(tree: &Tree, key: &[u8], value: &T) -> Result<(), StorageError> {
    let encoded = serde_json::to_vec(value).map_err(to_storage_data)?;
    tree.insert(key, encoded).map_err(to_storage_db)?;
    Ok(())
}

pub(crate) fn get_json<T: DeserializeOwned>(tree: &Tree, key: &[u8]) -> Result<Option<T>, StorageError> {
    let Some(raw) = tree.get(key).map_err(to_storage_db)? else {
        return Ok(None);
    };
    let parsed = serde_json::from_slice(&raw).map_err(to_storage_data)?;
    Ok(Some(parsed))
}

pub(crate) fn scan_json<T: DeserializeOwned>(tree: &Tree, prefix: &[u8]) -> Result<Vec<T>, StorageError> {
    let mut out = Vec::new();
    for result in tree.scan_prefix(prefix) {
        let (_, value) = result.map_err(to_storage_db)?;
        out.push(serde_json::from_slice(&value).map_err(to_storage_data)?);
    }
    Ok(out)
}
