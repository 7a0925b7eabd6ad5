//! CLI parse: clap types for Mentor. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Mentor CLI - adaptive tutoring over a knowledge graph
#[derive(Parser)]
#[command(name = "mentor")]
#[command(about = "Adaptive tutoring sessions over a knowledge graph")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (where config/ lives)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a knowledge graph (nodes, objectives, prerequisite edges) from JSON
    Import {
        /// Path to the graph document
        path: PathBuf,
    },
    /// List nodes in the knowledge graph
    Nodes,
    /// Show a node's objectives and prerequisites with mastery
    Objectives {
        /// Node identifier
        node: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Start an interactive session on a node
    Learn {
        /// Node identifier
        node: String,
        /// Start fresh even if an unfinished session exists
        #[arg(long)]
        fresh: bool,
    },
    /// Continue a checkpointed session
    Resume {
        /// Session identifier
        session: String,
    },
    /// List checkpointed sessions
    Sessions,
    /// Render a session transcript as Markdown
    Transcript {
        /// Session identifier
        session: String,
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration with secrets masked
    Show,
    /// Validate the effective configuration
    Validate,
}
