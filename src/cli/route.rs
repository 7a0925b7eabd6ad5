//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::cli::interact::{drive_session, last_tutor_turn, LearnerConsole, TerminalConsole};
use crate::cli::parse::{Commands, ConfigCommands};
use crate::cli::presentation::{
    format_import_summary, format_node_list, format_objectives_json, format_objectives_text,
    format_session_banner, format_session_finished, format_sessions_table,
    render_transcript_markdown,
};
use crate::config::{ConfigLoader, MentorConfig};
use crate::error::{ApiError, StorageError};
use crate::session::{Collaborators, SessionEngine, SessionState};
use crate::store::{open_database, CheckpointStore, KnowledgeGraph, KnowledgeStore, TranscriptStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Runtime context for CLI execution: configuration and the opened stores.
pub struct RunContext {
    config: MentorConfig,
    knowledge: Arc<KnowledgeStore>,
    transcripts: Arc<TranscriptStore>,
    checkpoints: CheckpointStore,
}

impl RunContext {
    /// Load configuration (an explicit file wins over workspace layering)
    /// and open the database under the data directory.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = load_config(&workspace_root, config_path.as_deref())?;
        let db = open_database(&config.storage.database_path()?)?;
        Self::with_database(config, db)
    }

    pub fn with_database(config: MentorConfig, db: sled::Db) -> Result<Self, ApiError> {
        Ok(Self {
            knowledge: KnowledgeStore::shared(db.clone())?,
            transcripts: TranscriptStore::shared(&db)?,
            checkpoints: CheckpointStore::new(db)?,
            config,
        })
    }

    pub fn config(&self) -> &MentorConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let result = match command {
            Commands::Import { path } => self.handle_import(path),
            Commands::Nodes => self.handle_nodes(),
            Commands::Objectives { node, format } => self.handle_objectives(node, format),
            Commands::Learn { node, fresh } => {
                self.handle_learn(node, *fresh, &mut TerminalConsole).await
            }
            Commands::Resume { session } => {
                self.handle_resume(session, &mut TerminalConsole).await
            }
            Commands::Sessions => self.handle_sessions(),
            Commands::Transcript { session, output } => {
                self.handle_transcript(session, output.as_deref())
            }
            Commands::Config { command } => self.handle_config(command),
        };
        match &result {
            Ok(_) => info!(
                command = command_name(command),
                duration_ms = started.elapsed().as_millis() as u64,
                "Command completed"
            ),
            Err(e) => warn!(command = command_name(command), error = %e, "Command failed"),
        }
        result
    }

    fn handle_import(&self, path: &Path) -> Result<String, ApiError> {
        let raw = std::fs::read_to_string(path).map_err(StorageError::IoError)?;
        let graph: KnowledgeGraph = serde_json::from_str(&raw).map_err(|e| {
            StorageError::InvalidRecord(format!("{}: {}", path.display(), e))
        })?;
        let summary = self.knowledge.import(&graph)?;
        Ok(format_import_summary(&summary))
    }

    fn handle_nodes(&self) -> Result<String, ApiError> {
        let mut rows = Vec::new();
        for node in self.knowledge.list_nodes()? {
            let mastery = self.knowledge.node_mastery(&node.id)?;
            rows.push((node, mastery));
        }
        Ok(format_node_list(&rows))
    }

    fn handle_objectives(&self, node_id: &str, format: &str) -> Result<String, ApiError> {
        let node = self
            .knowledge
            .get_node(node_id)?
            .ok_or_else(|| StorageError::NodeNotFound(node_id.to_string()))?;
        let objectives = self.knowledge.objectives_for(node_id)?;
        let prerequisites = self.knowledge.prerequisite_objectives(node_id)?;
        let threshold = self.config.session.mastery_threshold;
        match format {
            "json" => Ok(format_objectives_json(&node, &objectives, &prerequisites, threshold)),
            "text" => Ok(format_objectives_text(&node, &objectives, &prerequisites, threshold)),
            other => Err(ApiError::ConfigError(format!(
                "Invalid format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }

    fn engine(&self) -> Result<SessionEngine, ApiError> {
        self.config.ensure_valid()?;
        let collaborators = Collaborators {
            objectives: self.knowledge.clone(),
            mastery: self.knowledge.clone(),
            transcript: self.transcripts.clone(),
        };
        SessionEngine::from_config(&self.config, collaborators)
    }

    pub async fn handle_learn(
        &self,
        node_id: &str,
        fresh: bool,
        console: &mut dyn LearnerConsole,
    ) -> Result<String, ApiError> {
        if !fresh {
            if let Some(open) = self.checkpoints.latest_open(node_id)? {
                info!(session_id = %open.session_id, node_id, "Resuming unfinished session");
                return self.handle_resume(&open.session_id, console).await;
            }
        }
        let engine = self.engine()?;
        let state = engine.start(node_id)?;
        console.show(&format_session_banner(&state));
        self.run(&engine, state, console).await
    }

    pub async fn handle_resume(
        &self,
        session_id: &str,
        console: &mut dyn LearnerConsole,
    ) -> Result<String, ApiError> {
        let state = self.checkpoints.load(session_id)?;
        if state.is_finished() {
            return Ok(format_session_finished(&state));
        }
        let engine = self.engine()?;
        console.show(&format_session_banner(&state));
        if state.current_phase.is_waiting() {
            if let Some(turn) = last_tutor_turn(&state) {
                console.show(turn);
            }
        }
        self.run(&engine, state, console).await
    }

    async fn run(
        &self,
        engine: &SessionEngine,
        state: SessionState,
        console: &mut dyn LearnerConsole,
    ) -> Result<String, ApiError> {
        let finished = drive_session(engine, &self.checkpoints, state, console).await?;
        Ok(format_session_finished(&finished))
    }

    fn handle_sessions(&self) -> Result<String, ApiError> {
        Ok(format_sessions_table(&self.checkpoints.list()?))
    }

    fn handle_transcript(&self, session_id: &str, output: Option<&Path>) -> Result<String, ApiError> {
        let entries = self.transcripts.read(session_id)?;
        let state = match self.checkpoints.load(session_id) {
            Ok(state) => Some(state),
            Err(StorageError::SessionNotFound(_)) if !entries.is_empty() => None,
            Err(e) => return Err(e.into()),
        };
        let markdown = render_transcript_markdown(
            session_id,
            state.as_ref(),
            &entries,
            self.config.session.mastery_threshold,
        );
        match output {
            Some(path) => {
                std::fs::write(path, &markdown).map_err(StorageError::IoError)?;
                Ok(format!("Transcript written to {}", path.display()))
            }
            None => Ok(markdown),
        }
    }

    fn handle_config(&self, command: &ConfigCommands) -> Result<String, ApiError> {
        match command {
            ConfigCommands::Show => toml::to_string_pretty(&self.config.redacted())
                .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e))),
            ConfigCommands::Validate => match self.config.validate() {
                Ok(()) => Ok("Configuration is valid.".to_string()),
                Err(errors) => {
                    let mut out = format!("Configuration has {} problem(s):\n", errors.len());
                    for error in errors {
                        out.push_str(&format!("  - {}\n", error));
                    }
                    Ok(out)
                }
            },
        }
    }
}

/// Explicit file when given, otherwise layered workspace loading.
pub fn load_config(workspace_root: &Path, config_path: Option<&Path>) -> Result<MentorConfig, ApiError> {
    let config = match config_path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load(workspace_root)?,
    };
    Ok(config)
}

/// Stable command name for logs.
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Import { .. } => "import",
        Commands::Nodes => "nodes",
        Commands::Objectives { .. } => "objectives",
        Commands::Learn { .. } => "learn",
        Commands::Resume { .. } => "resume",
        Commands::Sessions => "sessions",
        Commands::Transcript { .. } => "transcript",
        Commands::Config { .. } => "config",
    }
}
