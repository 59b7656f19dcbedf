//! Music Mirror - resumable downloads of a streaming catalog library.
//!
//! Requests (favorites, playlists, artists, albums) are turned into an
//! ordered plan by the planner, then executed one track at a time. A local
//! SQLite index records every finished file so interrupted runs resume
//! where they stopped, finishing half-downloaded albums first.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod organizer;
pub mod planner;
pub mod progress;
#[cfg(test)]
pub mod test_utils;
pub mod tracker;
pub mod transfer;

use clap::{CommandFactory, Parser};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(log_filter(EnvFilter::from_default_env()))
        .init();

    if !cli::run_command(&args)? {
        cli::Cli::command().print_help()?;
    }
    Ok(())
}

/// Crate events default to `info`; `RUST_LOG` can still raise or lower them.
fn log_filter(base: EnvFilter) -> EnvFilter {
    base.add_directive("music_mirror=info".parse().unwrap())
}
