//! HTTP client for the v1 REST catalog.
//!
//! Collection endpoints are paged with `limit`/`offset` and report
//! `totalNumberOfItems`; [`HttpCatalog::get_all`] walks every page.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{adapter, dto};
use crate::catalog::CatalogError;
use crate::model::{Album, AlbumListing, Artist, Playlist, Track};

/// Items requested per page
const PAGE_SIZE: u32 = 50;

const USER_AGENT: &str = concat!("music-mirror/", env!("CARGO_PKG_VERSION"));

/// Session values needed for every catalog request.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
    pub country_code: String,
}

/// Catalog API client
#[derive(Clone)]
pub struct HttpCatalog {
    http_client: reqwest::Client,
    base_url: String,
    session: Session,
    /// Whole-request limit for API calls. Media streams are bounded per chunk
    /// instead, so the shared client carries no total timeout.
    request_timeout: Duration,
}

impl HttpCatalog {
    /// Create a client against `base_url`.
    pub fn new(base_url: impl Into<String>, session: Session, connect_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            request_timeout: connect_timeout * 2,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub async fn favorite_tracks(&self) -> Result<Vec<Track>, CatalogError> {
        let path = format!("users/{}/favorites/tracks", self.session.user_id);
        let items = self
            .get_all::<dto::Wrapped<dto::TrackDto>>(&path, &[("order", "DATE"), ("orderDirection", "DESC")])
            .await?;
        adapter::unwrap_tracks(items)
    }

    pub async fn favorite_albums(&self) -> Result<Vec<Album>, CatalogError> {
        let path = format!("users/{}/favorites/albums", self.session.user_id);
        let items = self.get_all::<dto::Wrapped<dto::AlbumDto>>(&path, &[]).await?;
        items
            .into_iter()
            .filter_map(|w| w.item)
            .map(adapter::to_album)
            .collect()
    }

    pub async fn favorite_artists(&self) -> Result<Vec<Artist>, CatalogError> {
        let path = format!("users/{}/favorites/artists", self.session.user_id);
        let items = self.get_all::<dto::Wrapped<dto::ArtistDto>>(&path, &[]).await?;
        items
            .into_iter()
            .filter_map(|w| w.item)
            .map(adapter::to_artist)
            .collect()
    }

    pub async fn playlist(&self, playlist_id: &str) -> Result<Playlist, CatalogError> {
        let info: dto::PlaylistDto = self.get(&format!("playlists/{playlist_id}"), &[]).await?;
        let items = self
            .get_all::<dto::Wrapped<dto::TrackDto>>(&format!("playlists/{playlist_id}/items"), &[])
            .await?;
        let tracks = adapter::unwrap_tracks(items)?;

        if let Some(expected) = info.number_of_tracks
            && tracks.len() as u32 > expected
        {
            tracing::debug!(playlist_id, expected, got = tracks.len(), "Playlist item count exceeds track count");
        }

        Ok(Playlist {
            id: info.uuid.unwrap_or_else(|| playlist_id.to_string()),
            title: info.title.unwrap_or_else(|| playlist_id.to_string()),
            tracks,
        })
    }

    pub async fn album(&self, album_id: &str) -> Result<AlbumListing, CatalogError> {
        let album: dto::AlbumDto = self.get(&format!("albums/{album_id}"), &[]).await?;
        let album = adapter::to_album(album)?;
        let tracks = self
            .get_all::<dto::TrackDto>(&format!("albums/{album_id}/tracks"), &[])
            .await?;
        let tracks = adapter::to_tracks(tracks)?;

        if album.track_count as usize != tracks.len() {
            tracing::debug!(
                album_id,
                expected = album.track_count,
                got = tracks.len(),
                "Album listing size differs from numberOfTracks"
            );
        }
        Ok(AlbumListing { album, tracks })
    }

    pub async fn artist_albums(
        &self,
        artist_id: &str,
        include_eps_and_singles: bool,
    ) -> Result<Vec<Album>, CatalogError> {
        let path = format!("artists/{artist_id}/albums");
        let mut albums: Vec<Album> = self
            .get_all::<dto::AlbumDto>(&path, &[])
            .await?
            .into_iter()
            .map(adapter::to_album)
            .collect::<Result<_, _>>()?;

        if include_eps_and_singles {
            let extra = self
                .get_all::<dto::AlbumDto>(&path, &[("filter", "EPSANDSINGLES")])
                .await?;
            for album in extra {
                let album = adapter::to_album(album)?;
                if !albums.iter().any(|a| a.id == album.id) {
                    albums.push(album);
                }
            }
        } else {
            albums.retain(|a| !a.release_type.is_ep_or_single());
        }
        Ok(albums)
    }

    /// GET a single object.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CatalogError> {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!(%url, "GET");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.session.access_token)
            .query(&[("countryCode", self.session.country_code.as_str())])
            .query(query)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<dto::ApiError>().await.ok();
            return Err(map_status(status, path, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Parse(format!("{path}: {e}")))
    }

    /// GET every page of a collection endpoint.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, CatalogError> {
        let mut items = Vec::new();
        let mut offset: u32 = 0;
        let limit = PAGE_SIZE.to_string();

        loop {
            let offset_str = offset.to_string();
            let mut params: Vec<(&str, &str)> = query.to_vec();
            params.push(("limit", &limit));
            params.push(("offset", &offset_str));

            let page: dto::Page<T> = self.get(path, &params).await?;
            let batch = page.items.ok_or_else(|| {
                CatalogError::InvalidResponse(format!("{path}: page without items"))
            })?;
            let batch_len = batch.len() as u32;
            items.extend(batch);

            tracing::debug!(path, offset, batch_len, total = ?page.total_number_of_items, "Fetched page");

            let done = match page.total_number_of_items {
                Some(total) => items.len() as u32 >= total,
                None => batch_len < PAGE_SIZE,
            };
            if done || batch_len == 0 {
                break;
            }
            offset += batch_len;
        }
        Ok(items)
    }
}

/// Map an error status to a catalog error.
fn map_status(status: StatusCode, path: &str, body: Option<dto::ApiError>) -> CatalogError {
    let message = body
        .as_ref()
        .and_then(|b| b.user_message.clone())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string());
    match status {
        StatusCode::NOT_FOUND => CatalogError::NotFound(format!("{path}: {message}")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CatalogError::Unauthorized(format!("{path}: {message}"))
        }
        StatusCode::TOO_MANY_REQUESTS => CatalogError::RateLimited,
        s if s.is_server_error() => CatalogError::Network(format!("HTTP {s}: {message}")),
        s => CatalogError::Api(format!("HTTP {s} on {path}: {message}")),
    }
}
