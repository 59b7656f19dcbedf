//! Test utilities and fixtures.
//!
//! Provides a temporary library index and catalog value factories so tests
//! can describe albums and tracks in one line.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{temp_index, mock_album};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (index, _dir) = temp_index().await;
//!     let listing = mock_album("a1", "Artist", 3);
//!     // ... test logic
//! }
//! ```

use smallvec::smallvec;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::index::{LibraryIndex, MatchMode, NewEntry};
use crate::model::{
    Album, AlbumContext, AlbumListing, DownloadUnit, Quality, ReleaseType, Track, UnitOrigin,
};

/// Creates a temporary library index for testing.
///
/// Keep the returned `TempDir` alive for the duration of the test; the
/// database is deleted when it is dropped.
pub async fn temp_index() -> (LibraryIndex, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let index = LibraryIndex::open(&dir.path().join("library.db"), MatchMode::Id)
        .await
        .expect("Failed to open test index");
    (index, dir)
}

/// Creates a track on disc 1 of `album_id`.
///
/// Customize with struct update syntax:
///
/// ```ignore
/// let track = Track { disc_number: 2, ..mock_track("t1", "a1", 1) };
/// ```
pub fn mock_track(id: &str, album_id: &str, track_number: u32) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Track {id}"),
        version: None,
        artists: smallvec!["Track Artist".to_string()],
        album_id: album_id.to_string(),
        album_title: Some(format!("Album {album_id}")),
        disc_number: 1,
        track_number,
        ordinal: track_number,
        duration_secs: 180,
        isrc: None,
        explicit: false,
        qualities: smallvec![Quality::Low, Quality::High, Quality::Lossless],
    }
}

/// Creates an album listing with `count` tracks named `{album_id}-{n}`.
pub fn mock_album(album_id: &str, artist: &str, count: u32) -> AlbumListing {
    let tracks = (1..=count)
        .map(|n| mock_track(&format!("{album_id}-{n}"), album_id, n))
        .collect();
    AlbumListing {
        album: Album {
            id: album_id.to_string(),
            title: format!("Album {album_id}"),
            artist: Some(artist.to_string()),
            track_count: count,
            release_date: Some("2020-01-01".to_string()),
            release_type: ReleaseType::Album,
            cover: None,
        },
        tracks,
    }
}

/// Creates an index entry for a track.
pub fn new_entry(track_id: &str, album_id: &str) -> NewEntry {
    NewEntry {
        track_id: track_id.to_string(),
        album_id: album_id.to_string(),
        path: PathBuf::from(format!("/music/{album_id}/{track_id}.flac")),
        quality: Quality::Lossless,
        isrc: None,
        title: format!("Track {track_id}"),
        artist: "Track Artist".to_string(),
        album_title: None,
        file_hash: None,
    }
}

/// Wraps a track into a unit with a context derived from the track.
pub fn mock_unit(track: Track) -> DownloadUnit {
    let context = AlbumContext::from_track(&track, track.artist_names());
    DownloadUnit {
        track,
        context,
        quality: Quality::Lossless,
        origin: UnitOrigin::Track,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_index_is_empty() {
        let (index, _dir) = temp_index().await;
        assert_eq!(index.counts().await.unwrap().tracks, 0);
    }

    #[test]
    fn test_mock_album_track_ids() {
        let listing = mock_album("a1", "Artist", 3);
        let ids: Vec<_> = listing.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["a1-1", "a1-2", "a1-3"]);
        assert_eq!(listing.album.track_count, 3);
    }
}
