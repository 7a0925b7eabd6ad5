//! Configuration System
//!
//! Layered configuration: merge-policy defaults, the global file, workspace
//! files, then `MENTOR__*` environment variables. Sections cover named model
//! providers, which provider plays each model role, session policy, storage
//! and logging.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::session::SessionPolicy;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub use crate::provider::{ProviderConfig, ProviderType};

mod facade;
mod merge;
mod sources;

pub use facade::{from_toml_str, ConfigLoader};
pub use merge::merge_policy::DEFAULT_PROVIDER;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MentorConfig {
    /// Model provider configurations, by name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub models: ModelRoles,

    #[serde(default)]
    pub session: SessionPolicy,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which named provider serves each model role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRoles {
    #[serde(default = "default_role")]
    pub tutor: String,
    #[serde(default = "default_role")]
    pub generator: String,
    #[serde(default = "default_role")]
    pub grader_primary: String,
    #[serde(default = "default_role")]
    pub grader_fallback: String,
}

fn default_role() -> String {
    DEFAULT_PROVIDER.to_string()
}

impl Default for ModelRoles {
    fn default() -> Self {
        Self {
            tutor: default_role(),
            generator: default_role(),
            grader_primary: default_role(),
            grader_fallback: default_role(),
        }
    }
}

impl ModelRoles {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("tutor", self.tutor.as_str()),
            ("generator", self.generator.as_str()),
            ("grader_primary", self.grader_primary.as_str()),
            ("grader_fallback", self.grader_fallback.as_str()),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database and log directory; the platform data dir when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ApiError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        ProjectDirs::from("", "", "mentor")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| {
                ApiError::ConfigError(
                    "Cannot determine a data directory; set storage.data_dir".to_string(),
                )
            })
    }

    pub fn database_path(&self) -> Result<PathBuf, ApiError> {
        Ok(self.resolve_data_dir()?.join("db"))
    }

    pub fn log_file(&self) -> Result<PathBuf, ApiError> {
        Ok(self.resolve_data_dir()?.join("mentor.log"))
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Provider(String, String),
    Model(String, String),
    Session(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(name, msg) => write!(f, "Provider '{}': {}", name, msg),
            ValidationError::Model(role, msg) => write!(f, "Model role '{}': {}", role, msg),
            ValidationError::Session(msg) => write!(f, "Session: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl MentorConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        for name in names {
            if let Err(e) = self.providers[name].validate() {
                errors.push(ValidationError::Provider(name.clone(), e));
            }
        }

        for (role, provider) in self.models.iter() {
            if !self.providers.contains_key(provider) {
                errors.push(ValidationError::Model(
                    role.to_string(),
                    format!("unknown provider '{}'", provider),
                ));
            }
        }

        errors.extend(self.session.problems().into_iter().map(ValidationError::Session));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// `validate` folded into a single `ApiError`.
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })
    }

    /// Copy suitable for display: literal API keys are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for provider in copy.providers.values_mut() {
            if provider.api_key.is_some() {
                provider.api_key = Some("********".to_string());
            }
        }
        copy
    }
}
