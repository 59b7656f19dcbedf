//! Process-lifetime album artist cache.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{AlbumListing, UNKNOWN_ARTIST};

/// Canonical album-artist names keyed by album id.
///
/// Every unit belonging to an album takes its artist folder name from here,
/// so tracks reached through favorites and through an artist catalog land in
/// the same directory. Entries are replaced only by a fresh album fetch.
#[derive(Debug, Clone, Default)]
pub struct AlbumArtistCache {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl AlbumArtistCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the canonical artist from a freshly fetched listing.
    ///
    /// Uses the album-level artists, then the first track's artists.
    pub fn refresh(&self, listing: &AlbumListing) -> String {
        let name = listing
            .album
            .artist
            .clone()
            .filter(|a| !a.trim().is_empty())
            .or_else(|| {
                listing
                    .tracks
                    .first()
                    .filter(|t| !t.artists.is_empty())
                    .map(|t| t.artist_names())
            })
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

        tracing::debug!(album_id = %listing.album.id, artist = %name, "Cached album artist");
        self.inner
            .write()
            .insert(listing.album.id.clone(), name.clone());
        name
    }

    /// Cached artist for an album, inserting `fallback` if there is none.
    pub fn resolve(&self, album_id: &str, fallback: impl FnOnce() -> String) -> String {
        if let Some(name) = self.inner.read().get(album_id) {
            return name.clone();
        }
        self.inner
            .write()
            .entry(album_id.to_string())
            .or_insert_with(fallback)
            .clone()
    }
}
