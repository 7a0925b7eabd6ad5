//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, SessionError, StorageError};

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::StorageError(StorageError::NodeNotFound(node))
        | ApiError::SessionError(SessionError::NodeNotFound(node)) => format!(
            "Node not found: {}\n\nRun 'mentor nodes' to list imported nodes.",
            node
        ),
        ApiError::StorageError(StorageError::SessionNotFound(session)) => format!(
            "Session not found: {}\n\nRun 'mentor sessions' to list saved sessions.",
            session
        ),
        ApiError::ProviderNotConfigured(msg) => format!(
            "{}\n\nAdd a [providers.<name>] table to config/config.toml and point [models] at it.",
            msg
        ),
        other => other.to_string(),
    }
}
