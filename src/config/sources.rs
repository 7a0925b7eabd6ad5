//! Configuration sources, added to the builder lowest precedence first.

pub mod environment;
pub mod global_file;
pub mod workspace_file;
