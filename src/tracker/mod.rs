//! Album completion tracking.
//!
//! Album progress is never stored. It is derived on demand from a freshly
//! fetched album listing and the library index, so it cannot drift from
//! what is actually on disk and recorded.

use std::collections::HashSet;

use crate::index::{IndexError, LibraryIndex};
use crate::model::{AlbumListing, Track};

/// Completion state of an album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlbumStatus {
    /// No track recorded
    Pending,
    /// Some but not all tracks recorded
    Partial,
    /// Nothing remaining
    Complete,
}

/// Derived progress of one album.
#[derive(Debug, Clone)]
pub struct AlbumProgress {
    pub album_id: String,
    /// Listing track ids present in the index
    pub completed: HashSet<String>,
    /// Listing tracks not present, in album order
    pub remaining: Vec<Track>,
    pub total: usize,
}

impl AlbumProgress {
    /// Compute progress from a listing and the set of satisfied track ids.
    ///
    /// `present` may contain ids from other albums; only listing tracks count.
    pub fn compute(listing: &AlbumListing, present: &HashSet<String>) -> Self {
        let mut completed = HashSet::new();
        let mut remaining = Vec::new();
        for track in &listing.tracks {
            if present.contains(&track.id) {
                completed.insert(track.id.clone());
            } else if !remaining.iter().any(|t: &Track| t.id == track.id) {
                remaining.push(track.clone());
            }
        }
        remaining.sort_by_key(Track::order_key);

        Self {
            album_id: listing.album.id.clone(),
            completed,
            remaining,
            total: listing.tracks.len(),
        }
    }

    pub fn status(&self) -> AlbumStatus {
        if self.remaining.is_empty() {
            AlbumStatus::Complete
        } else if self.completed.is_empty() {
            AlbumStatus::Pending
        } else {
            AlbumStatus::Partial
        }
    }
}

/// Index-backed completion tracker. Holds no state of its own.
#[derive(Debug, Clone)]
pub struct AlbumCompletionTracker {
    index: LibraryIndex,
}

impl AlbumCompletionTracker {
    pub fn new(index: LibraryIndex) -> Self {
        Self { index }
    }

    /// Listing track ids satisfied by the index under its match mode.
    pub async fn present_tracks(&self, listing: &AlbumListing) -> Result<HashSet<String>, IndexError> {
        let mut present = HashSet::new();
        for track in &listing.tracks {
            if self.index.contains_track(track).await? {
                present.insert(track.id.clone());
            }
        }
        Ok(present)
    }

    pub async fn progress(&self, listing: &AlbumListing) -> Result<AlbumProgress, IndexError> {
        let present = self.present_tracks(listing).await?;
        Ok(AlbumProgress::compute(listing, &present))
    }

    pub async fn status(&self, listing: &AlbumListing) -> Result<AlbumStatus, IndexError> {
        Ok(self.progress(listing).await?.status())
    }

    /// Remaining tracks ordered by disc, track number, then catalog ordinal.
    pub async fn remaining_tracks(&self, listing: &AlbumListing) -> Result<Vec<Track>, IndexError> {
        Ok(self.progress(listing).await?.remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mock_album, mock_track, new_entry, temp_index};

    fn ids(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_status_transitions() {
        let listing = mock_album("a1", "Artist", 3);
        let mut present = HashSet::new();
        assert_eq!(AlbumProgress::compute(&listing, &present).status(), AlbumStatus::Pending);

        present.insert("a1-2".to_string());
        let progress = AlbumProgress::compute(&listing, &present);
        assert_eq!(progress.status(), AlbumStatus::Partial);
        assert_eq!(ids(&progress.remaining), ["a1-1", "a1-3"]);

        present.insert("a1-1".to_string());
        present.insert("a1-3".to_string());
        assert_eq!(AlbumProgress::compute(&listing, &present).status(), AlbumStatus::Complete);
    }

    #[test]
    fn test_empty_album_is_complete() {
        let listing = mock_album("a1", "Artist", 0);
        let progress = AlbumProgress::compute(&listing, &HashSet::new());
        assert_eq!(progress.status(), AlbumStatus::Complete);
    }

    #[test]
    fn test_remaining_ordered_by_disc_then_track() {
        let mut listing = mock_album("a1", "Artist", 0);
        listing.tracks = vec![
            Track { disc_number: 2, ..mock_track("d2t1", "a1", 1) },
            Track { disc_number: 1, ..mock_track("d1t2", "a1", 2) },
            Track { disc_number: 1, ..mock_track("d1t1", "a1", 1) },
            Track { disc_number: 2, ordinal: 0, ..mock_track("d2t1-early", "a1", 1) },
        ];
        let progress = AlbumProgress::compute(&listing, &HashSet::new());
        assert_eq!(ids(&progress.remaining), ["d1t1", "d1t2", "d2t1-early", "d2t1"]);
    }

    #[test]
    fn test_unrelated_present_ids_ignored() {
        let listing = mock_album("a1", "Artist", 2);
        let present: HashSet<String> = ["other".to_string()].into();
        let progress = AlbumProgress::compute(&listing, &present);
        assert_eq!(progress.status(), AlbumStatus::Pending);
        assert!(progress.completed.is_empty());
    }

    #[tokio::test]
    async fn test_tracker_reads_index() {
        let (index, _dir) = temp_index().await;
        let tracker = AlbumCompletionTracker::new(index.clone());
        let listing = mock_album("a1", "Artist", 10);

        for n in 1..=3 {
            index.record(&new_entry(&format!("a1-{n}"), "a1")).await.unwrap();
        }

        let progress = tracker.progress(&listing).await.unwrap();
        assert_eq!(progress.status(), AlbumStatus::Partial);
        assert_eq!(progress.completed.len(), 3);
        assert_eq!(tracker.remaining_tracks(&listing).await.unwrap().len(), 7);
    }
}
