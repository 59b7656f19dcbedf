//! Library index inspection and maintenance commands.

use tokio::runtime::Runtime;

use super::{catalog, open_index};
use crate::config::{self, Config};
use crate::tracker::{AlbumCompletionTracker, AlbumStatus};

/// Show index totals, or one album's completion against the catalog.
pub fn cmd_status(rt: &Runtime, config: &Config, album: Option<&str>) -> anyhow::Result<()> {
    rt.block_on(async {
        let index = open_index(config).await?;

        let Some(album_id) = album else {
            let counts = index.counts().await?;
            println!("Library index: {}", config.library.index_path.display());
            println!("  Tracks: {}", counts.tracks);
            println!("  Albums: {}", counts.albums);
            index.close().await;
            return Ok(());
        };

        let catalog = catalog(config)?;
        let listing = catalog.album(album_id).await?;
        let tracker = AlbumCompletionTracker::new(index.clone());
        let status = tracker.status(&listing).await;
        let remaining = tracker.remaining_tracks(&listing).await;
        index.close().await;
        let (status, remaining) = (status?, remaining?);

        let label = match status {
            AlbumStatus::Pending => "pending",
            AlbumStatus::Partial => "partial",
            AlbumStatus::Complete => "complete",
        };
        println!("{} ({})", listing.album.title, listing.album.id);
        println!(
            "  {label}: {}/{} tracks present",
            listing.tracks.len() - remaining.len(),
            listing.tracks.len()
        );
        for track in &remaining {
            println!(
                "  missing {}-{:02}. {}",
                track.disc_number,
                track.track_number,
                track.formatted_title()
            );
        }
        Ok(())
    })
}

/// List entries whose file no longer exists; with `prune`, forget them.
pub fn cmd_verify(rt: &Runtime, config: &Config, prune: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let index = open_index(config).await?;
        let missing = index.missing_files().await?;

        if missing.is_empty() {
            println!("All indexed files are present");
        } else {
            println!("{} indexed files are missing:", missing.len());
            for entry in &missing {
                println!("  {} {}", entry.track_id, entry.path.display());
            }
        }

        if prune {
            let mut removed = 0;
            for entry in &missing {
                if index.remove(&entry.track_id).await? {
                    removed += 1;
                }
            }
            tracing::info!(removed, "Pruned missing entries");
            println!("Removed {removed} entries; they will be downloaded again");
        }

        index.close().await;
        Ok(())
    })
}

/// Remove one track from the index.
pub fn cmd_forget(rt: &Runtime, config: &Config, track_id: &str) -> anyhow::Result<()> {
    rt.block_on(async {
        let index = open_index(config).await?;
        let removed = index.remove(track_id).await;
        index.close().await;
        if removed? {
            println!("Forgot track {track_id}");
        } else {
            println!("Track {track_id} is not in the library index");
        }
        Ok(())
    })
}

/// Print where the config lives and what is in effect.
pub fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    if init {
        match config::config_path() {
            Some(path) if path.exists() => println!("Config already exists at {}", path.display()),
            _ => {
                config::save(config)?;
                println!("Wrote default config; fill in [credentials] before downloading");
            }
        }
    }

    match config::config_path() {
        Some(path) if path.exists() => println!("# {}", path.display()),
        Some(path) => println!("# {} (not found, showing defaults)", path.display()),
        None => println!("# no config directory on this platform"),
    }

    let mut shown = config.clone();
    if shown.credentials.access_token.is_some() {
        shown.credentials.access_token = Some("<redacted>".to_string());
    }
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}
