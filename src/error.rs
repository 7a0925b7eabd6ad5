//! Error types for the tutoring session engine.

use crate::session::Phase;
use std::time::Duration;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Objective not found: {0}")]
    ObjectiveNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// API-level errors: providers, configuration and host plumbing
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Provider request timed out: {0}")]
    ProviderTimeout(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Session error: {0}")]
    SessionError(#[from] SessionError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Interaction failed: {0}")]
    InteractionFailed(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

/// Errors returned to the host by the session engine.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `step` called on a finished session, or with input the current phase
    /// cannot accept: input where none is expected, none where it is, or
    /// input of the wrong shape.
    #[error("Invalid transition from phase {phase}: {reason}")]
    InvalidTransition { phase: Phase, reason: String },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Classified failure of a single model call. Never escapes the engine:
/// generators and the grading pipeline turn it into retries and fallbacks.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed model output: {0}")]
    Malformed(String),

    #[error("Provider failure: {0}")]
    Provider(ApiError),
}

impl GenerationError {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Timeout(_) => "timeout",
            GenerationError::Malformed(_) => "malformed",
            GenerationError::Provider(_) => "provider",
        }
    }
}

impl From<ApiError> for GenerationError {
    fn from(err: ApiError) -> Self {
        GenerationError::Provider(err)
    }
}
