//! Loading entry points over the layered sources.

use super::merge::builder_with_defaults;
use super::sources::{environment, global_file, workspace_file};
use super::MentorConfig;
use config::{ConfigError, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest first): defaults, global file, workspace
    /// `config/config.toml`, workspace `config/{MENTOR_ENV}.toml`,
    /// `MENTOR__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<MentorConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);
        let config: MentorConfig = builder.build()?.try_deserialize()?;
        debug!(
            workspace = %workspace_root.display(),
            providers = config.providers.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load exactly one file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<MentorConfig, ConfigError> {
        let config = builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()))
            .build()?;
        config.try_deserialize()
    }

    /// Defaults with no files or environment applied.
    pub fn defaults() -> Result<MentorConfig, ConfigError> {
        builder_with_defaults()?.build()?.try_deserialize()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}

/// Parse a TOML string layered over the defaults.
pub fn from_toml_str(contents: &str) -> Result<MentorConfig, ConfigError> {
    builder_with_defaults()?
        .add_source(File::from_str(contents, FileFormat::Toml))
        .build()?
        .try_deserialize()
}
