//! Adapter layer: convert catalog DTOs to domain models.
//!
//! This is the ONLY place where DTO types become model types. Missing
//! identifiers or titles are rejected with `InvalidResponse`.

use smallvec::SmallVec;

use super::dto;
use crate::catalog::CatalogError;
use crate::model::{Album, Artist, Quality, ReleaseType, Track};

fn required<T>(value: Option<T>, what: &str) -> Result<T, CatalogError> {
    value.ok_or_else(|| CatalogError::InvalidResponse(format!("missing {what}")))
}

fn artist_names(primary: Option<&dto::ArtistDto>, all: &[dto::ArtistDto]) -> SmallVec<[String; 2]> {
    let names: SmallVec<[String; 2]> = all
        .iter()
        .filter_map(|a| a.name.clone())
        .filter(|n| !n.trim().is_empty())
        .collect();
    if !names.is_empty() {
        return names;
    }
    primary
        .and_then(|a| a.name.clone())
        .filter(|n| !n.trim().is_empty())
        .into_iter()
        .collect()
}

/// Qualities available up to the best the catalog advertises.
fn available_qualities(dto: &dto::TrackDto) -> SmallVec<[Quality; 4]> {
    let hires_tag = dto
        .media_metadata
        .tags
        .iter()
        .any(|t| t == "HIRES_LOSSLESS" || t == "HI_RES_LOSSLESS");
    let best = dto
        .audio_quality
        .as_deref()
        .and_then(Quality::from_api_str)
        .map(|q| if q == Quality::Max { Quality::HiRes } else { q })
        .map(|q| if hires_tag { Quality::HiRes } else { q });

    match best {
        Some(best) => [Quality::Low, Quality::High, Quality::Lossless, Quality::HiRes]
            .into_iter()
            .filter(|q| *q <= best)
            .collect(),
        None => SmallVec::new(),
    }
}

/// Convert a track. `ordinal` is the track's position in the listing it came from.
pub fn to_track(dto: dto::TrackDto, ordinal: u32) -> Result<Track, CatalogError> {
    let qualities = available_qualities(&dto);
    let artists = artist_names(dto.artist.as_ref(), &dto.artists);
    let id = required(dto.id, "track id")?.into_string();
    let title = required(dto.title, "track title")?;
    let album = required(dto.album, "track album")?;
    let album_id = required(album.id, "track album id")?.into_string();

    Ok(Track {
        id,
        title,
        version: dto.version.filter(|v| !v.trim().is_empty()),
        artists,
        album_id,
        album_title: album.title,
        disc_number: dto.volume_number.unwrap_or(1),
        track_number: dto.track_number.unwrap_or(0),
        ordinal,
        duration_secs: dto.duration.unwrap_or(0),
        isrc: dto.isrc.filter(|i| !i.is_empty()),
        explicit: dto.explicit,
        qualities,
    })
}

pub fn to_tracks(dtos: Vec<dto::TrackDto>) -> Result<Vec<Track>, CatalogError> {
    dtos.into_iter()
        .enumerate()
        .map(|(i, dto)| to_track(dto, i as u32 + 1))
        .collect()
}

/// Unwrap `{item: ...}` collections, keeping only tracks.
pub fn unwrap_tracks(items: Vec<dto::Wrapped<dto::TrackDto>>) -> Result<Vec<Track>, CatalogError> {
    let tracks = items
        .into_iter()
        .filter(|w| w.kind.as_deref().is_none_or(|k| k.eq_ignore_ascii_case("track")))
        .map(|w| required(w.item, "wrapped item"))
        .collect::<Result<Vec<_>, _>>()?;
    to_tracks(tracks)
}

pub fn to_release_type(kind: Option<&str>) -> ReleaseType {
    match kind.map(str::to_ascii_uppercase).as_deref() {
        Some("ALBUM") | None => ReleaseType::Album,
        Some("EP") => ReleaseType::Ep,
        Some("SINGLE") => ReleaseType::Single,
        Some("COMPILATION") => ReleaseType::Compilation,
        Some(_) => ReleaseType::Other,
    }
}

pub fn to_album(dto: dto::AlbumDto) -> Result<Album, CatalogError> {
    let artists = artist_names(dto.artist.as_ref(), &dto.artists);
    Ok(Album {
        id: required(dto.id, "album id")?.into_string(),
        title: required(dto.title, "album title")?,
        artist: (!artists.is_empty()).then(|| artists.join(", ")),
        track_count: dto.number_of_tracks.unwrap_or(0),
        release_date: dto.release_date,
        release_type: to_release_type(dto.kind.as_deref()),
        cover: dto.cover,
    })
}

pub fn to_artist(dto: dto::ArtistDto) -> Result<Artist, CatalogError> {
    Ok(Artist {
        id: required(dto.id, "artist id")?.into_string(),
        name: dto.name.unwrap_or_default(),
    })
}
