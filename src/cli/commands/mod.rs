//! CLI command definitions and dispatch.
//!
//! Each group of subcommands lives in its own submodule:
//! - `download`: plan and run a request
//! - `library`: inspect and maintain the library index

mod download;
mod library;

use clap::{Parser, Subcommand};
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::catalog::http::{HttpCatalog, Session};
use crate::config::{self, Config, ConfigError};
use crate::index::LibraryIndex;
use crate::planner::Request;

pub use download::cmd_download;
pub use library::{cmd_config, cmd_forget, cmd_status, cmd_verify};

/// Mirror a streaming catalog library to local disk
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Download favorite tracks
    Favorites {
        /// Print the plan without downloading
        #[arg(long)]
        dry_run: bool,
    },
    /// Download every favorite album
    FavoriteAlbums {
        /// Print the plan without downloading
        #[arg(long)]
        dry_run: bool,
    },
    /// Download the catalog of every favorite artist
    FavoriteArtists {
        /// Include EPs and singles (overrides the config)
        #[arg(long)]
        include_eps: bool,
        /// Print the plan without downloading
        #[arg(long)]
        dry_run: bool,
    },
    /// Download a playlist and the albums of its tracks
    Playlist {
        /// Playlist id
        id: String,
        /// Print the plan without downloading
        #[arg(long)]
        dry_run: bool,
    },
    /// Download an artist's albums
    Artist {
        /// Artist id
        id: String,
        /// Include EPs and singles (overrides the config)
        #[arg(long)]
        include_eps: bool,
        /// Print the plan without downloading
        #[arg(long)]
        dry_run: bool,
    },
    /// Download albums by id
    Album {
        /// Album ids
        #[arg(required = true)]
        ids: Vec<String>,
        /// Print the plan without downloading
        #[arg(long)]
        dry_run: bool,
    },
    /// Show library index totals, or one album's completion
    Status {
        /// Album id to check against the catalog
        #[arg(long)]
        album: Option<String>,
    },
    /// Find index entries whose file is gone
    Verify {
        /// Remove those entries so the tracks are downloaded again
        #[arg(long)]
        prune: bool,
    },
    /// Remove one track from the library index
    Forget {
        /// Track id
        track_id: String,
    },
    /// Print the config file path and the effective configuration
    Config {
        /// Write the effective configuration to the config file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Run the specified CLI command.
///
/// Returns `Ok(true)` if a command was run, `Ok(false)` if no command was
/// specified (the caller prints help).
pub fn run_command(cli: &Cli) -> anyhow::Result<bool> {
    let Some(command) = &cli.command else {
        return Ok(false);
    };

    let config = config::load();
    let rt = Runtime::new()?;
    let include_eps = |flag: bool| flag || config.download.include_eps_and_singles;

    match command {
        Commands::Favorites { dry_run } => {
            cmd_download(&rt, &config, Request::Favorites, *dry_run)?;
        }
        Commands::FavoriteAlbums { dry_run } => {
            cmd_download(&rt, &config, Request::FavoriteAlbums, *dry_run)?;
        }
        Commands::FavoriteArtists {
            include_eps: flag,
            dry_run,
        } => {
            let request = Request::FavoriteArtists {
                include_eps_and_singles: include_eps(*flag),
            };
            cmd_download(&rt, &config, request, *dry_run)?;
        }
        Commands::Playlist { id, dry_run } => {
            cmd_download(&rt, &config, Request::Playlist { id: id.clone() }, *dry_run)?;
        }
        Commands::Artist {
            id,
            include_eps: flag,
            dry_run,
        } => {
            let request = Request::ArtistCatalog {
                artist_id: id.clone(),
                include_eps_and_singles: include_eps(*flag),
            };
            cmd_download(&rt, &config, request, *dry_run)?;
        }
        Commands::Album { ids, dry_run } => {
            cmd_download(&rt, &config, Request::Albums { ids: ids.clone() }, *dry_run)?;
        }
        Commands::Status { album } => cmd_status(&rt, &config, album.as_deref())?,
        Commands::Verify { prune } => cmd_verify(&rt, &config, *prune)?,
        Commands::Forget { track_id } => cmd_forget(&rt, &config, track_id)?,
        Commands::Config { init } => cmd_config(&config, *init)?,
    }
    Ok(true)
}

/// Build the catalog session from configured credentials.
fn session(config: &Config) -> Result<Session, ConfigError> {
    let creds = &config.credentials;
    let access_token = creds
        .access_token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or(ConfigError::Missing("credentials.access_token"))?;
    let user_id = creds
        .user_id
        .clone()
        .filter(|u| !u.is_empty())
        .ok_or(ConfigError::Missing("credentials.user_id"))?;
    let country_code = creds.country_code.clone().unwrap_or_else(|| {
        tracing::debug!("No country code configured, using US");
        "US".to_string()
    });
    Ok(Session {
        access_token,
        user_id,
        country_code,
    })
}

fn catalog(config: &Config) -> Result<HttpCatalog, ConfigError> {
    Ok(HttpCatalog::new(
        config.network.api_base_url.clone(),
        session(config)?,
        Duration::from_secs(config.network.connect_timeout_secs),
    ))
}

async fn open_index(config: &Config) -> anyhow::Result<LibraryIndex> {
    let path = &config.library.index_path;
    let index = LibraryIndex::open(path, config.library.match_mode)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open library index {}: {e}", path.display()))?;
    Ok(index)
}
