//! Download commands: plan a request, then execute the plan.

use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use super::{catalog, open_index};
use crate::config::Config;
use crate::index::LibraryIndex;
use crate::model::{AlbumArtistCache, AlbumContext, DownloadUnit, Playlist, UnitOrigin};
use crate::organizer::{self, M3uEntry};
use crate::planner::{Plan, PlannerConfig, Request, WorkPlanner};
use crate::progress::{ConsoleReporter, LogReporter, ProgressReporter};
use crate::transfer::http::HttpTransfer;
use crate::transfer::{CancelToken, ExecutorConfig, RetryPolicy, TransferExecutor};

/// Plan `request` and, unless `dry_run`, download it.
pub fn cmd_download(
    rt: &Runtime,
    config: &Config,
    request: Request,
    dry_run: bool,
) -> anyhow::Result<()> {
    let catalog = catalog(config)?;

    rt.block_on(async {
        let index = open_index(config).await?;
        let cache = AlbumArtistCache::new();
        let planner = WorkPlanner::new(
            Arc::new(catalog.clone()),
            index.clone(),
            cache.clone(),
            planner_config(config),
        );

        println!("Planning {}...", request.label());
        let plan = match planner.plan(&request).await {
            Ok(plan) => plan,
            Err(e) => {
                index.close().await;
                return Err(e.into());
            }
        };
        println!(
            "{} to download, {} already present",
            plan.len(),
            plan.already_present.len()
        );
        for failure in &plan.failures {
            println!("  Could not plan {failure}");
        }

        if dry_run {
            print_plan(&plan);
            index.close().await;
            return Ok(());
        }

        if config.download.create_m3u_playlists
            && let Some(playlist) = &plan.playlist
        {
            match write_playlist_file(config, &index, &cache, &plan, playlist).await {
                Ok(path) => println!("Wrote playlist {}", path.display()),
                Err(e) => {
                    tracing::warn!(playlist_id = %playlist.id, error = %e, "Failed to write playlist file")
                }
            }
        }

        let cancel = CancelToken::new();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nInterrupted, finishing cleanup...");
                    cancel.cancel();
                }
            });
        }

        let transfer = HttpTransfer::new(
            &catalog,
            Duration::from_secs(config.network.read_timeout_secs),
        );
        let executor = TransferExecutor::new(
            Arc::new(transfer),
            index.clone(),
            reporter(),
            executor_config(config),
            cancel,
        );

        let report = executor.run(&plan).await;
        index.close().await;
        let report = match report {
            Ok(report) => report,
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(error = %e, "Run aborted; completed tracks before this point are recorded");
                }
                return Err(e.into());
            }
        };

        println!();
        print!("{report}");
        Ok(())
    })
}

/// Console lines on a terminal, log lines otherwise.
fn reporter() -> Arc<dyn ProgressReporter> {
    if std::io::stdout().is_terminal() {
        Arc::new(ConsoleReporter)
    } else {
        Arc::new(LogReporter)
    }
}

fn planner_config(config: &Config) -> PlannerConfig {
    PlannerConfig {
        quality: config.download.quality,
        full_albums_for_favorites: config.download.full_albums_for_favorites,
        resume_scope: config.download.resume_scope,
        metadata_concurrency: config.network.metadata_concurrency.max(1),
    }
}

fn executor_config(config: &Config) -> ExecutorConfig {
    ExecutorConfig {
        download_root: config.download.path.clone(),
        track_path_format: config.download.track_path_format.clone(),
        retry: RetryPolicy {
            attempts: config.network.retry_attempts,
            base_delay: Duration::from_secs(config.network.retry_delay_secs),
            ..Default::default()
        },
        quality_fallback: config.download.quality_fallback,
    }
}

fn print_plan(plan: &Plan) {
    for (i, unit) in plan.units.iter().enumerate() {
        let marker = match unit.origin {
            UnitOrigin::Resume => " (resume)",
            UnitOrigin::Album | UnitOrigin::Track => "",
        };
        println!(
            "  {:>4}. {} - {} - {} [{}]{}",
            i + 1,
            unit.context.artist_name,
            unit.context.album_title,
            unit.track.formatted_title(),
            unit.quality,
            marker
        );
    }
}

/// Where the M3U file for `playlist` goes.
fn playlist_file(config: &Config, playlist: &Playlist) -> PathBuf {
    let relative = organizer::format_path(
        &config.download.playlist_path_format,
        &[
            ("playlist_name", Some(playlist.title.clone())),
            ("playlist_id", Some(playlist.id.clone())),
        ],
    );
    let relative = if relative.as_os_str().is_empty() {
        PathBuf::from(organizer::sanitize_filename(&playlist.id))
    } else {
        relative
    };
    organizer::with_appended_extension(&config.download.path.join(relative), "m3u")
}

/// Write the playlist before downloading, pointing at indexed files where
/// they exist and at predicted destinations otherwise.
async fn write_playlist_file(
    config: &Config,
    index: &LibraryIndex,
    cache: &AlbumArtistCache,
    plan: &Plan,
    playlist: &Playlist,
) -> anyhow::Result<PathBuf> {
    let root = &config.download.path;
    let planned: HashMap<&str, &DownloadUnit> = plan
        .units
        .iter()
        .map(|u| (u.track.id.as_str(), u))
        .collect();

    let mut entries = Vec::with_capacity(playlist.tracks.len());
    for track in &playlist.tracks {
        let path = match index.entry(&track.id).await? {
            Some(entry) => entry.path,
            None => {
                let unit = match planned.get(track.id.as_str()) {
                    Some(unit) => (*unit).clone(),
                    None => DownloadUnit {
                        track: track.clone(),
                        context: AlbumContext::from_track(
                            track,
                            cache.resolve(&track.album_id, || track.artist_names()),
                        ),
                        quality: config.download.quality,
                        origin: UnitOrigin::Track,
                    },
                };
                predicted_path(root, &config.download.track_path_format, &unit)
            }
        };
        entries.push(M3uEntry {
            duration_secs: track.duration_secs,
            artist: track.artist_names(),
            title: track.formatted_title(),
            path,
        });
    }

    let file = playlist_file(config, playlist);
    let written = file.clone();
    let root = root.clone();
    tokio::task::spawn_blocking(move || organizer::write_m3u(&file, &root, &entries)).await??;
    Ok(written)
}

fn predicted_path(root: &Path, template: &str, unit: &DownloadUnit) -> PathBuf {
    organizer::with_appended_extension(&organizer::track_stem(root, template, unit), "flac")
}
