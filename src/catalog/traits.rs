//! Catalog collaborator trait and test doubles.
//!
//! The planner is generic over this trait so tests can drive it with
//! [`mocks::MockCatalog`] instead of the network.

use async_trait::async_trait;

use super::CatalogError;
use crate::model::{Album, AlbumListing, Artist, Playlist, Track};

/// Read-only catalog access.
///
/// Every sequence is returned in catalog order.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// The account's favorite tracks, most recent first as the catalog lists them.
    async fn favorite_tracks(&self) -> Result<Vec<Track>, CatalogError>;

    /// The account's favorite albums.
    async fn favorite_albums(&self) -> Result<Vec<Album>, CatalogError>;

    /// The account's favorite artists.
    async fn favorite_artists(&self) -> Result<Vec<Artist>, CatalogError>;

    /// A playlist with its ordered tracks.
    async fn playlist(&self, playlist_id: &str) -> Result<Playlist, CatalogError>;

    /// An album and its full track listing.
    async fn album(&self, album_id: &str) -> Result<AlbumListing, CatalogError>;

    /// An artist's albums, optionally including EPs and singles.
    async fn artist_albums(
        &self,
        artist_id: &str,
        include_eps_and_singles: bool,
    ) -> Result<Vec<Album>, CatalogError>;
}

#[async_trait]
impl CatalogApi for super::http::HttpCatalog {
    async fn favorite_tracks(&self) -> Result<Vec<Track>, CatalogError> {
        self.favorite_tracks().await
    }

    async fn favorite_albums(&self) -> Result<Vec<Album>, CatalogError> {
        self.favorite_albums().await
    }

    async fn favorite_artists(&self) -> Result<Vec<Artist>, CatalogError> {
        self.favorite_artists().await
    }

    async fn playlist(&self, playlist_id: &str) -> Result<Playlist, CatalogError> {
        self.playlist(playlist_id).await
    }

    async fn album(&self, album_id: &str) -> Result<AlbumListing, CatalogError> {
        self.album(album_id).await
    }

    async fn artist_albums(
        &self,
        artist_id: &str,
        include_eps_and_singles: bool,
    ) -> Result<Vec<Album>, CatalogError> {
        self.artist_albums(artist_id, include_eps_and_singles).await
    }
}
