//! Command-line interface for music-mirror.
//!
//! A thin shell: it loads the config, builds the HTTP collaborators, and
//! hands requests to the planner and executor.

mod commands;

pub use commands::{Cli, Commands, run_command};
