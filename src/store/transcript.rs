//! Append-only session transcripts.

use super::{put_json, scan_json, to_storage_db};
use crate::error::StorageError;
use crate::session::{TranscriptEntry, TranscriptSink};
use sled::{Db, Tree};
use std::sync::Arc;

const TREE_TRANSCRIPTS: &str = "transcripts";

#[derive(Clone)]
pub struct TranscriptStore {
    tree: Tree,
}

impl TranscriptStore {
    pub fn new(db: &Db) -> Result<Self, StorageError> {
        let tree = db.open_tree(TREE_TRANSCRIPTS).map_err(to_storage_db)?;
        Ok(Self { tree })
    }

    pub fn shared(db: &Db) -> Result<Arc<Self>, StorageError> {
        Ok(Arc::new(Self::new(db)?))
    }

    /// Entries for one session in sequence order.
    pub fn read(&self, session_id: &str) -> Result<Vec<TranscriptEntry>, StorageError> {
        scan_json(&self.tree, session_prefix(session_id).as_bytes())
    }

    pub fn delete_session(&self, session_id: &str) -> Result<usize, StorageError> {
        let mut removed = 0;
        for result in self.tree.scan_prefix(session_prefix(session_id).as_bytes()) {
            let (key, _) = result.map_err(to_storage_db)?;
            self.tree.remove(key).map_err(to_storage_db)?;
            removed += 1;
        }
        Ok(removed)
    }
}

fn session_prefix(session_id: &str) -> String {
    format!("{}:", session_id)
}

/// Zero-padded so lexicographic key order matches sequence order.
fn encode_entry_key(session_id: &str, seq: u64) -> String {
    format!("{}:{:020}", session_id, seq)
}

impl TranscriptSink for TranscriptStore {
    fn append(&self, entry: &TranscriptEntry) -> Result<(), StorageError> {
        let key = encode_entry_key(&entry.session_id, entry.seq);
        put_json(&self.tree, key.as_bytes(), entry)
    }
}
