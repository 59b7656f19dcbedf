//! Pure scheduling of expanded requests.

use std::collections::{HashMap, HashSet};

use crate::model::{
    AlbumArtistCache, AlbumContext, AlbumListing, DownloadUnit, Quality, Track, UnitOrigin,
};
use crate::tracker::{AlbumProgress, AlbumStatus};

/// One step of an expanded request, in source order.
#[derive(Debug, Clone)]
pub enum Segment {
    /// A whole album. `seed` is the request track that pulled it in.
    Album {
        album_id: String,
        seed: Option<Track>,
    },
    /// A single track without its album.
    Track(Track),
}

impl Segment {
    pub fn album(album_id: &str) -> Self {
        Segment::Album {
            album_id: album_id.to_string(),
            seed: None,
        }
    }

    pub fn album_seeded(track: Track) -> Self {
        Segment::Album {
            album_id: track.album_id.clone(),
            seed: Some(track),
        }
    }

    pub fn album_id(&self) -> &str {
        match self {
            Segment::Album { album_id, .. } => album_id,
            Segment::Track(track) => &track.album_id,
        }
    }

    /// The request track carried by this segment, if any.
    pub fn track(&self) -> Option<&Track> {
        match self {
            Segment::Album { seed, .. } => seed.as_ref(),
            Segment::Track(track) => Some(track),
        }
    }
}

/// Output of [`schedule`].
#[derive(Debug, Default)]
pub struct Scheduled {
    pub units: Vec<DownloadUnit>,
    pub already_present: Vec<Track>,
}

struct Scheduler<'a> {
    listings: &'a HashMap<String, AlbumListing>,
    present: &'a HashSet<String>,
    artists: &'a AlbumArtistCache,
    quality: Quality,
    seen: HashSet<String>,
    emitted_albums: HashSet<String>,
    out: Scheduled,
}

impl Scheduler<'_> {
    fn album_context(&self, listing: &AlbumListing) -> AlbumContext {
        let album = &listing.album;
        let artist = self.artists.resolve(&album.id, || {
            album
                .artist
                .clone()
                .unwrap_or_else(|| crate::model::UNKNOWN_ARTIST.to_string())
        });
        AlbumContext::from_album(album, artist)
    }

    fn track_context(&self, track: &Track) -> AlbumContext {
        match self.listings.get(&track.album_id) {
            Some(listing) => self.album_context(listing),
            None => {
                let artist = self
                    .artists
                    .resolve(&track.album_id, || track.artist_names());
                AlbumContext::from_track(track, artist)
            }
        }
    }

    /// Emit one track unless already seen. The first context wins.
    fn emit(&mut self, track: &Track, context: &AlbumContext, origin: UnitOrigin) {
        if !self.seen.insert(track.id.clone()) {
            return;
        }
        if self.present.contains(&track.id) {
            self.out.already_present.push(track.clone());
            return;
        }
        self.out.units.push(DownloadUnit {
            track: track.clone(),
            context: context.clone(),
            quality: self.quality,
            origin,
        });
    }

    /// Emit every track of an album in disc/track order.
    fn emit_album(&mut self, listing: &AlbumListing, origin: UnitOrigin) {
        if !self.emitted_albums.insert(listing.album.id.clone()) {
            return;
        }
        let context = self.album_context(listing);
        let mut tracks: Vec<&Track> = listing.tracks.iter().collect();
        tracks.sort_by_key(|t| t.order_key());
        for track in tracks {
            self.emit(track, &context, origin);
        }
    }

    fn emit_bare(&mut self, track: &Track) {
        let context = self.track_context(track);
        self.emit(track, &context, UnitOrigin::Track);
    }
}

/// Order the work for a request.
///
/// * `resumable` lists the album ids eligible for the resume tier, in order.
/// * `listings` holds the albums that were fetched successfully.
/// * `present` holds the track ids the index satisfies.
///
/// With `resume_first`, every Partial album in `resumable` is emitted before
/// anything else. Then segments follow in order: albums are emitted whole,
/// bare tracks on their own. An album whose listing is missing degrades to
/// its seed track.
pub fn schedule(
    segments: &[Segment],
    resumable: &[String],
    listings: &HashMap<String, AlbumListing>,
    present: &HashSet<String>,
    artists: &AlbumArtistCache,
    quality: Quality,
    resume_first: bool,
) -> Scheduled {
    let mut s = Scheduler {
        listings,
        present,
        artists,
        quality,
        seen: HashSet::new(),
        emitted_albums: HashSet::new(),
        out: Scheduled::default(),
    };

    if resume_first {
        for album_id in resumable {
            let Some(listing) = listings.get(album_id) else {
                continue;
            };
            if AlbumProgress::compute(listing, present).status() == AlbumStatus::Partial {
                tracing::debug!(%album_id, "Resuming partial album first");
                s.emit_album(listing, UnitOrigin::Resume);
            }
        }
    }

    for segment in segments {
        match segment {
            Segment::Album { album_id, seed } => {
                match listings.get(album_id) {
                    Some(listing) => s.emit_album(listing, UnitOrigin::Album),
                    None => {
                        if let Some(seed) = seed {
                            s.emit_bare(seed);
                        }
                        continue;
                    }
                }
                // A seed missing from its own listing is still requested
                if let Some(seed) = seed {
                    s.emit_bare(seed);
                }
            }
            Segment::Track(track) => s.emit_bare(track),
        }
    }

    s.out
}
