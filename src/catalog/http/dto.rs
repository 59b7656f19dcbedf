//! Catalog API Data Transfer Objects
//!
//! These types mirror what the v1 REST catalog returns. Fields are optional
//! wherever the service is known to omit them; validation happens in the
//! adapter. DO NOT use these types outside the `catalog::http` module.

use serde::Deserialize;

/// Ids arrive as numbers for tracks/albums/artists and strings for playlists.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    pub fn into_string(self) -> String {
        match self {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

/// One page of a paged collection endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub total_number_of_items: Option<u32>,
    pub items: Option<Vec<T>>,
}

/// Wrapper used by favorites and playlist item collections
#[derive(Debug, Clone, Deserialize)]
pub struct Wrapped<T> {
    pub item: Option<T>,
    /// `track` or `video` for playlist items
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistDto {
    pub id: Option<RawId>,
    pub name: Option<String>,
}

/// Album summary embedded in a track
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumRef {
    pub id: Option<RawId>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDto {
    pub id: Option<RawId>,
    pub title: Option<String>,
    pub version: Option<String>,
    pub duration: Option<u32>,
    pub track_number: Option<u32>,
    pub volume_number: Option<u32>,
    pub isrc: Option<String>,
    #[serde(default)]
    pub explicit: bool,
    pub audio_quality: Option<String>,
    #[serde(default)]
    pub allow_streaming: Option<bool>,
    #[serde(default)]
    pub stream_ready: Option<bool>,
    pub artist: Option<ArtistDto>,
    #[serde(default)]
    pub artists: Vec<ArtistDto>,
    pub album: Option<AlbumRef>,
    #[serde(default)]
    pub media_metadata: MediaMetadata,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumDto {
    pub id: Option<RawId>,
    pub title: Option<String>,
    pub cover: Option<String>,
    pub release_date: Option<String>,
    pub number_of_tracks: Option<u32>,
    /// `ALBUM`, `EP`, `SINGLE`, `COMPILATION`
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub artist: Option<ArtistDto>,
    #[serde(default)]
    pub artists: Vec<ArtistDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistDto {
    pub uuid: Option<String>,
    pub title: Option<String>,
    pub number_of_tracks: Option<u32>,
}

/// Response of `tracks/{id}/playbackinfopostpaywall`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackInfo {
    pub track_id: Option<RawId>,
    pub audio_quality: Option<String>,
    pub manifest_mime_type: String,
    /// Base64-encoded manifest
    pub manifest: String,
}

/// Decoded `application/vnd.tidal.bts` manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtsManifest {
    pub mime_type: Option<String>,
    pub codecs: Option<String>,
    pub encryption_type: Option<String>,
    pub key_id: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub status: Option<u16>,
    pub sub_status: Option<u32>,
    pub user_message: Option<String>,
}
