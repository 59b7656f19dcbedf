//! Core data models for the download pipeline.
//!
//! Catalog entities ([`Track`], [`Album`], [`Artist`], [`Playlist`]) are
//! immutable values fetched fresh every run and validated at the catalog
//! boundary. Pipeline values ([`DownloadUnit`], [`DownloadResult`]) flow from
//! the planner through the executor to the progress reporter.

mod cache;

pub use cache::AlbumArtistCache;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Name used when the catalog supplies no artist at all.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Name used when a track has no album title.
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

// ============================================================================
// Quality
// ============================================================================

/// Audio encoding quality, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    High,
    Lossless,
    HiRes,
    /// Best available; resolves to the highest concrete rung.
    Max,
}

impl Quality {
    /// Concrete rungs, best first.
    const LADDER: [Quality; 4] = [Quality::HiRes, Quality::Lossless, Quality::High, Quality::Low];

    /// The catalog's name for this quality.
    pub fn as_api_str(self) -> &'static str {
        match self {
            Quality::Low => "LOW",
            Quality::High => "HIGH",
            Quality::Lossless => "LOSSLESS",
            Quality::HiRes => "HI_RES",
            Quality::Max => "HI_RES_LOSSLESS",
        }
    }

    /// Parse a catalog quality string.
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Quality::Low),
            "HIGH" => Some(Quality::High),
            "LOSSLESS" => Some(Quality::Lossless),
            "HI_RES" => Some(Quality::HiRes),
            "HI_RES_LOSSLESS" => Some(Quality::Max),
            _ => None,
        }
    }

    /// Qualities to try in order, starting at `self` and stepping down.
    ///
    /// `Max` starts at `HiRes`. Without fallback only the first rung is tried.
    pub fn ladder(self, fallback: bool) -> SmallVec<[Quality; 4]> {
        let start = if self == Quality::Max { Quality::HiRes } else { self };
        let rungs = Self::LADDER.iter().copied().skip_while(|q| *q != start);
        if fallback {
            rungs.collect()
        } else {
            rungs.take(1).collect()
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Quality::Low => "low",
            Quality::High => "high",
            Quality::Lossless => "lossless",
            Quality::HiRes => "hi_res",
            Quality::Max => "max",
        };
        f.write_str(s)
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "high" => Ok(Quality::High),
            "lossless" => Ok(Quality::Lossless),
            "hi_res" | "hires" => Ok(Quality::HiRes),
            "max" => Ok(Quality::Max),
            other => Quality::from_api_str(&other.to_ascii_uppercase())
                .ok_or_else(|| format!("unknown quality: {s}")),
        }
    }
}

// ============================================================================
// Catalog entities
// ============================================================================

/// Release type of an album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseType {
    #[default]
    Album,
    Ep,
    Single,
    Compilation,
    Other,
}

impl ReleaseType {
    /// EPs and singles are excluded from artist catalogs unless asked for.
    pub fn is_ep_or_single(self) -> bool {
        matches!(self, ReleaseType::Ep | ReleaseType::Single)
    }
}

/// A track as described by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Stable catalog id
    pub id: String,
    pub title: String,
    /// Version suffix such as "Remastered"
    pub version: Option<String>,
    /// Artist names in catalog order
    pub artists: SmallVec<[String; 2]>,
    /// Owning album id
    pub album_id: String,
    /// Album title as supplied with the track
    pub album_title: Option<String>,
    /// Disc volume, 1-based
    pub disc_number: u32,
    /// Position on the disc, 1-based
    pub track_number: u32,
    /// Catalog-supplied position used as a tie-break
    pub ordinal: u32,
    pub duration_secs: u32,
    pub isrc: Option<String>,
    pub explicit: bool,
    /// Qualities the catalog advertises for this track
    pub qualities: SmallVec<[Quality; 4]>,
}

impl Track {
    /// Title including the version suffix, e.g. `Song (Live)`.
    pub fn formatted_title(&self) -> String {
        match self.version.as_deref().filter(|v| !v.is_empty()) {
            Some(version) if !self.title.contains(version) => {
                format!("{} ({})", self.title, version)
            }
            _ => self.title.clone(),
        }
    }

    /// Artists joined with ", ".
    pub fn artist_names(&self) -> String {
        if self.artists.is_empty() {
            UNKNOWN_ARTIST.to_string()
        } else {
            self.artists.join(", ")
        }
    }

    /// Rungs to try for `requested`, best first. With fallback, rungs above
    /// the best quality the catalog advertises are not requested at all.
    pub fn quality_ladder(&self, requested: Quality, fallback: bool) -> SmallVec<[Quality; 4]> {
        let mut rungs = requested.ladder(fallback);
        if fallback && let Some(best) = self.qualities.iter().copied().max() {
            rungs.retain(|q| *q <= best);
        }
        rungs
    }

    /// Ordering key within an album.
    pub fn order_key(&self) -> (u32, u32, u32) {
        (self.disc_number, self.track_number, self.ordinal)
    }
}

/// An album as described by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub id: String,
    pub title: String,
    /// Album-level artist names joined with ", "
    pub artist: Option<String>,
    pub track_count: u32,
    /// ISO date, e.g. `2019-05-17`
    pub release_date: Option<String>,
    pub release_type: ReleaseType,
    /// Cover image id
    pub cover: Option<String>,
}

impl Album {
    pub fn release_year(&self) -> Option<u32> {
        self.release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok())
    }
}

/// An artist reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

/// A playlist with its ordered tracks.
#[derive(Debug, Clone)]
pub struct Playlist {
    pub id: String,
    pub title: String,
    pub tracks: Vec<Track>,
}

/// An album together with its full track listing.
#[derive(Debug, Clone)]
pub struct AlbumListing {
    pub album: Album,
    pub tracks: Vec<Track>,
}

// ============================================================================
// Pipeline values
// ============================================================================

/// Album information used to name a unit's destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumContext {
    pub album_id: String,
    pub album_title: String,
    /// Canonical album artist, shared by every track of the album
    pub artist_name: String,
    pub release_year: Option<u32>,
}

impl AlbumContext {
    /// Context built from an album listing and its canonical artist.
    pub fn from_album(album: &Album, artist_name: String) -> Self {
        Self {
            album_id: album.id.clone(),
            album_title: album.title.clone(),
            artist_name,
            release_year: album.release_year(),
        }
    }

    /// Context built only from what the track carries.
    pub fn from_track(track: &Track, artist_name: String) -> Self {
        Self {
            album_id: track.album_id.clone(),
            album_title: track
                .album_title
                .clone()
                .unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
            artist_name,
            release_year: None,
        }
    }
}

/// Why a unit ended up in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOrigin {
    /// Remaining track of a partially downloaded album
    Resume,
    /// Track of an album expanded from the request
    Album,
    /// Bare track from the request
    Track,
}

/// One deduplicated, track-level work item.
#[derive(Debug, Clone)]
pub struct DownloadUnit {
    pub track: Track,
    pub context: AlbumContext,
    pub quality: Quality,
    pub origin: UnitOrigin,
}

/// Why a unit was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyDownloaded,
    Unavailable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyDownloaded => f.write_str("already downloaded"),
            SkipReason::Unavailable(why) => write!(f, "unavailable: {why}"),
        }
    }
}

/// Classification of a failed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retries exhausted on a transient error
    Transient,
    /// Not retried
    Permanent,
    /// Aborted by cancellation while in flight
    Cancelled,
}

/// Details of a failed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
}

/// Terminal outcome of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    Success { path: PathBuf, quality: Quality },
    Skipped(SkipReason),
    Failed(Failure),
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadResult::Success { .. })
    }
}

impl fmt::Display for DownloadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadResult::Success { quality, .. } => write!(f, "downloaded ({quality})"),
            DownloadResult::Skipped(reason) => write!(f, "skipped ({reason})"),
            DownloadResult::Failed(failure) => write!(f, "failed ({})", failure.message),
        }
    }
}
