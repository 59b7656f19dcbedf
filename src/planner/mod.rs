//! Work planning: turn a request into an ordered, deduplicated unit list.
//!
//! Planning happens in three steps:
//!
//! 1. **Expand** the request into segments: whole albums (optionally seeded
//!    by the track that pulled them in) or bare tracks.
//! 2. **Fetch** every album the request touches, with bounded concurrency,
//!    and read which tracks the library index already satisfies.
//! 3. **Schedule** (pure): Partial albums first in first-touch order, then
//!    segments in source order. A track id is emitted at most once and
//!    indexed tracks are never emitted.
//!
//! Catalog failures abandon only the affected segment and are returned in
//! [`Plan::failures`]. Index failures abort planning.

mod schedule;

pub use schedule::{Segment, schedule};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::catalog::{CatalogApi, CatalogError};
use crate::error::{Result, ResultExt};
use crate::index::LibraryIndex;
use crate::model::{AlbumArtistCache, AlbumListing, DownloadUnit, Playlist, Quality, Track};

/// What the user asked to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Favorite tracks, in favorites order
    Favorites,
    /// Every favorite album
    FavoriteAlbums,
    /// The catalog of every favorite artist
    FavoriteArtists { include_eps_and_singles: bool },
    /// A playlist; each track pulls in its whole album
    Playlist { id: String },
    /// One artist's albums in catalog order
    ArtistCatalog {
        artist_id: String,
        include_eps_and_singles: bool,
    },
    /// Explicit albums
    Albums { ids: Vec<String> },
}

impl Request {
    pub fn label(&self) -> String {
        match self {
            Request::Favorites => "favorite tracks".to_string(),
            Request::FavoriteAlbums => "favorite albums".to_string(),
            Request::FavoriteArtists { .. } => "favorite artists".to_string(),
            Request::Playlist { id } => format!("playlist {id}"),
            Request::ArtistCatalog { artist_id, .. } => format!("artist {artist_id}"),
            Request::Albums { ids } => format!("albums {}", ids.join(", ")),
        }
    }
}

/// Which partially downloaded albums are scheduled first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeScope {
    /// No resume tier; Partial albums keep their source position
    None,
    /// Partial albums the request names as albums
    #[default]
    Relevant,
    /// Also every Partial album known to the index
    All,
}

/// Planner settings.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub quality: Quality,
    pub full_albums_for_favorites: bool,
    pub resume_scope: ResumeScope,
    /// Parallel catalog fetches
    pub metadata_concurrency: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            quality: Quality::High,
            full_albums_for_favorites: false,
            resume_scope: ResumeScope::Relevant,
            metadata_concurrency: 4,
        }
    }
}

/// A catalog fetch that failed while planning.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{subject}: {source}")]
pub struct PlanningError {
    /// What could not be fetched, e.g. `album 123`
    pub subject: String,
    #[source]
    pub source: CatalogError,
}

/// Ordered work for the executor.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub label: String,
    pub units: Vec<DownloadUnit>,
    /// Request tracks omitted because the index already has them
    pub already_present: Vec<Track>,
    pub failures: Vec<PlanningError>,
    /// Set for playlist requests
    pub playlist: Option<Playlist>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Builds plans from requests.
pub struct WorkPlanner {
    catalog: Arc<dyn CatalogApi>,
    index: LibraryIndex,
    artists: AlbumArtistCache,
    config: PlannerConfig,
}

impl WorkPlanner {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        index: LibraryIndex,
        artists: AlbumArtistCache,
        config: PlannerConfig,
    ) -> Self {
        Self {
            catalog,
            index,
            artists,
            config,
        }
    }

    /// Build the plan for a request.
    pub async fn plan(&self, request: &Request) -> Result<Plan> {
        let label = request.label();
        tracing::info!(request = %label, "Planning");

        let mut failures = Vec::new();
        let mut playlist = None;
        let segments = self
            .expand(request, &mut failures, &mut playlist)
            .await;

        // Bare tracks only need their album for context; resuming is for
        // albums the request asked for as albums.
        let mut touched = touched_albums(&segments);
        let mut resumable = requested_albums(&segments);
        if self.config.resume_scope == ResumeScope::All {
            let known = self
                .index
                .album_ids()
                .await
                .with_context("listing indexed albums")?;
            for id in known {
                if !touched.contains(&id) {
                    touched.push(id.clone());
                }
                if !resumable.contains(&id) {
                    resumable.push(id);
                }
            }
        }

        let listings = self.fetch_albums(&touched, &segments, &mut failures).await;
        let present = self
            .present_tracks(&segments, &listings)
            .await
            .with_context("reading library index")?;

        let scheduled = schedule(
            &segments,
            &resumable,
            &listings,
            &present,
            &self.artists,
            self.config.quality,
            self.config.resume_scope != ResumeScope::None,
        );

        tracing::info!(
            request = %label,
            units = scheduled.units.len(),
            already_present = scheduled.already_present.len(),
            failures = failures.len(),
            "Plan ready"
        );

        Ok(Plan {
            label,
            units: scheduled.units,
            already_present: scheduled.already_present,
            failures,
            playlist,
        })
    }

    async fn expand(
        &self,
        request: &Request,
        failures: &mut Vec<PlanningError>,
        playlist_out: &mut Option<Playlist>,
    ) -> Vec<Segment> {
        let mut fail = |subject: String, source: CatalogError| {
            tracing::warn!(%subject, error = %source, "Catalog fetch failed");
            failures.push(PlanningError { subject, source });
        };

        match request {
            Request::Favorites => match self.catalog.favorite_tracks().await {
                Ok(tracks) => tracks
                    .into_iter()
                    .map(|t| {
                        if self.config.full_albums_for_favorites {
                            Segment::album_seeded(t)
                        } else {
                            Segment::Track(t)
                        }
                    })
                    .collect(),
                Err(e) => {
                    fail("favorite tracks".into(), e);
                    Vec::new()
                }
            },
            Request::Playlist { id } => match self.catalog.playlist(id).await {
                Ok(playlist) => {
                    let segments = playlist
                        .tracks
                        .iter()
                        .cloned()
                        .map(Segment::album_seeded)
                        .collect();
                    *playlist_out = Some(playlist);
                    segments
                }
                Err(e) => {
                    fail(format!("playlist {id}"), e);
                    Vec::new()
                }
            },
            Request::Albums { ids } => ids.iter().map(|id| Segment::album(id)).collect(),
            Request::FavoriteAlbums => match self.catalog.favorite_albums().await {
                Ok(albums) => albums.iter().map(|a| Segment::album(&a.id)).collect(),
                Err(e) => {
                    fail("favorite albums".into(), e);
                    Vec::new()
                }
            },
            Request::ArtistCatalog {
                artist_id,
                include_eps_and_singles,
            } => match self
                .catalog
                .artist_albums(artist_id, *include_eps_and_singles)
                .await
            {
                Ok(albums) => albums.iter().map(|a| Segment::album(&a.id)).collect(),
                Err(e) => {
                    fail(format!("artist {artist_id}"), e);
                    Vec::new()
                }
            },
            Request::FavoriteArtists {
                include_eps_and_singles,
            } => {
                let artists = match self.catalog.favorite_artists().await {
                    Ok(artists) => artists,
                    Err(e) => {
                        fail("favorite artists".into(), e);
                        return Vec::new();
                    }
                };
                let catalog = &self.catalog;
                let include = *include_eps_and_singles;
                let results: Vec<_> = stream::iter(artists)
                    .map(|artist| async move {
                        let albums = catalog.artist_albums(&artist.id, include).await;
                        (artist, albums)
                    })
                    .buffered(self.config.metadata_concurrency.max(1))
                    .collect()
                    .await;

                let mut segments = Vec::new();
                for (artist, albums) in results {
                    match albums {
                        Ok(albums) => segments.extend(albums.iter().map(|a| Segment::album(&a.id))),
                        Err(e) => fail(format!("artist {} ({})", artist.id, artist.name), e),
                    }
                }
                segments
            }
        }
    }

    /// Fetch listings for every touched album and refresh the artist cache.
    ///
    /// A failure is a planning failure only when the album was requested as
    /// an album; bare tracks fall back to their own metadata.
    async fn fetch_albums(
        &self,
        album_ids: &[String],
        segments: &[Segment],
        failures: &mut Vec<PlanningError>,
    ) -> HashMap<String, AlbumListing> {
        let requested: HashSet<&str> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Album { album_id, .. } => Some(album_id.as_str()),
                Segment::Track(_) => None,
            })
            .collect();

        let catalog = &self.catalog;
        let results: Vec<_> = stream::iter(album_ids)
            .map(|id| async move { (id, catalog.album(id).await) })
            .buffered(self.config.metadata_concurrency.max(1))
            .collect()
            .await;

        let mut listings = HashMap::new();
        for (id, result) in results {
            match result {
                Ok(listing) => {
                    self.artists.refresh(&listing);
                    listings.insert(id.clone(), listing);
                }
                Err(e) if requested.contains(id.as_str()) => {
                    tracing::warn!(album_id = %id, error = %e, "Album fetch failed");
                    failures.push(PlanningError {
                        subject: format!("album {id}"),
                        source: e,
                    });
                }
                Err(e) => {
                    tracing::debug!(album_id = %id, error = %e, "Album context unavailable");
                }
            }
        }
        listings
    }

    /// Ids of every candidate track that the index satisfies.
    async fn present_tracks(
        &self,
        segments: &[Segment],
        listings: &HashMap<String, AlbumListing>,
    ) -> std::result::Result<HashSet<String>, crate::index::IndexError> {
        let mut checked = HashSet::new();
        let mut present = HashSet::new();
        let candidates = listings
            .values()
            .flat_map(|l| l.tracks.iter())
            .chain(segments.iter().filter_map(Segment::track));
        for track in candidates {
            if checked.insert(track.id.clone()) && self.index.contains_track(track).await? {
                present.insert(track.id.clone());
            }
        }
        Ok(present)
    }
}

/// Album ids in order of first appearance.
fn touched_albums(segments: &[Segment]) -> Vec<String> {
    let mut seen = HashSet::new();
    segments
        .iter()
        .map(Segment::album_id)
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

/// Ids of albums requested as albums, in order of first appearance.
fn requested_albums(segments: &[Segment]) -> Vec<String> {
    let mut seen = HashSet::new();
    segments
        .iter()
        .filter_map(|s| match s {
            Segment::Album { album_id, .. } => Some(album_id.as_str()),
            Segment::Track(_) => None,
        })
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}
