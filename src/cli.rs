//! CLI domain: parse, route, interactive loop, output, and presentation.
//! A single route table dispatches to the stores and the session engine.

pub mod interact;
mod output;
mod parse;
mod presentation;
mod route;

pub use interact::{drive_session, LearnerConsole, LearnerReply, TerminalConsole};
pub use output::map_error;
pub use parse::{Cli, Commands, ConfigCommands};
pub use route::{command_name, load_config, RunContext};
