//! Library index: the persisted record of completed tracks.
//!
//! Backed by SQLite through SQLx. One row per completed track, keyed by the
//! catalog track id. Rows are written only after the audio file has been
//! promoted to its final path, and each insert is a single autocommitted
//! statement with `synchronous = FULL`, so a row never exists for a file that
//! was not fully transferred.
//!
//! # Example
//!
//! ```ignore
//! let index = LibraryIndex::open(&path, MatchMode::Id).await?;
//! if !index.contains("12345").await? {
//!     // download, promote, then:
//!     index.record(&entry).await?;
//! }
//! ```

mod hash;
mod normalize;

pub use hash::sampled_digest;
pub use normalize::normalize_text;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::model::{Quality, Track};

/// Library index errors
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a catalog track is matched against existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Track id only
    #[default]
    Id,
    /// Track id, or an entry with the same ISRC
    IdOrIsrc,
    /// Track id, ISRC, or the same artist and title. When both sides know
    /// the album title it has to match as well.
    IdOrMetadata,
}

/// A completed track ready to be recorded.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub track_id: String,
    pub album_id: String,
    pub path: PathBuf,
    pub quality: Quality,
    pub isrc: Option<String>,
    pub title: String,
    pub artist: String,
    pub album_title: Option<String>,
    pub file_hash: Option<String>,
}

/// A row of the library index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub track_id: String,
    pub album_id: String,
    pub path: PathBuf,
    /// `None` if the stored value is not a known quality
    pub quality: Option<Quality>,
    pub isrc: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_title: Option<String>,
    pub file_hash: Option<String>,
    /// RFC 3339 timestamp
    pub completed_at: String,
}

#[derive(FromRow)]
struct EntryRow {
    track_id: String,
    album_id: String,
    path: String,
    quality: String,
    isrc: Option<String>,
    title: Option<String>,
    artist: Option<String>,
    album_title: Option<String>,
    file_hash: Option<String>,
    completed_at: String,
}

impl From<EntryRow> for IndexEntry {
    fn from(row: EntryRow) -> Self {
        Self {
            track_id: row.track_id,
            album_id: row.album_id,
            path: PathBuf::from(row.path),
            quality: Quality::from_api_str(&row.quality),
            isrc: row.isrc,
            title: row.title,
            artist: row.artist,
            album_title: row.album_title,
            file_hash: row.file_hash,
            completed_at: row.completed_at,
        }
    }
}

/// Aggregate counts for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexCounts {
    pub tracks: i64,
    pub albums: i64,
}

const SELECT_ENTRY: &str = "SELECT track_id, album_id, path, quality, isrc, title, artist, \
                            album_title, file_hash, completed_at FROM library_entries";

/// Handle to the library index database.
#[derive(Debug, Clone)]
pub struct LibraryIndex {
    pool: SqlitePool,
    match_mode: MatchMode,
}

impl LibraryIndex {
    /// Open (creating if needed) the index at `path` and run migrations.
    pub async fn open(path: &Path, match_mode: MatchMode) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::debug!(path = %path.display(), ?match_mode, "Opened library index");
        Ok(Self { pool, match_mode })
    }

    pub fn match_mode(&self) -> MatchMode {
        self.match_mode
    }

    /// Whether a track id has a completed entry.
    pub async fn contains(&self, track_id: &str) -> Result<bool, IndexError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM library_entries WHERE track_id = ? LIMIT 1")
                .bind(track_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Whether a catalog track is satisfied, honoring the match mode.
    pub async fn contains_track(&self, track: &Track) -> Result<bool, IndexError> {
        if self.contains(&track.id).await? {
            return Ok(true);
        }
        if self.match_mode == MatchMode::Id {
            return Ok(false);
        }
        if let Some(isrc) = track.isrc.as_deref().filter(|i| !i.is_empty()) {
            let row: Option<(i64,)> =
                sqlx::query_as("SELECT 1 FROM library_entries WHERE isrc = ? LIMIT 1")
                    .bind(isrc)
                    .fetch_optional(&self.pool)
                    .await?;
            if row.is_some() {
                return Ok(true);
            }
        }
        if self.match_mode == MatchMode::IdOrMetadata {
            return self.contains_metadata(track).await;
        }
        Ok(false)
    }

    /// Artist + title match, plus album title when both sides have one.
    async fn contains_metadata(&self, track: &Track) -> Result<bool, IndexError> {
        let title_key = normalize_text(&track.formatted_title());
        if title_key.is_empty() {
            return Ok(false);
        }
        // The stored artist is the album's canonical artist, which may be
        // any of the track's credited artists.
        let mut artists: Vec<String> = track.artists.iter().map(|a| normalize_text(a)).collect();
        artists.push(normalize_text(&track.artist_names()));
        artists.retain(|a| !a.is_empty());
        let album = track
            .album_title
            .as_deref()
            .map(normalize_text)
            .filter(|a| !a.is_empty());

        let rows: Vec<(Option<String>, Option<String>)> =
            sqlx::query_as("SELECT artist, album_title FROM library_entries WHERE title_key = ?")
                .bind(&title_key)
                .fetch_all(&self.pool)
                .await?;

        let matched = rows.into_iter().any(|(artist, album_title)| {
            let artist_matches = artist
                .map(|a| normalize_text(&a))
                .is_some_and(|a| !a.is_empty() && artists.contains(&a));
            let stored_album = album_title.map(|a| normalize_text(&a)).filter(|a| !a.is_empty());
            let album_matches = match (&album, &stored_album) {
                (Some(wanted), Some(stored)) => wanted == stored,
                _ => true,
            };
            artist_matches && album_matches
        });
        if matched {
            tracing::debug!(track_id = %track.id, title = %track.title, "Matched by artist and title");
        }
        Ok(matched)
    }

    /// Record a completed track.
    ///
    /// Returns `true` if a row was inserted, `false` if the track was already
    /// present (the existing row is left untouched). The statement has
    /// committed by the time this returns.
    pub async fn record(&self, entry: &NewEntry) -> Result<bool, IndexError> {
        let completed_at = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO library_entries
                (track_id, album_id, path, quality, isrc, title, artist, album_title,
                 title_key, file_hash, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(track_id) DO NOTHING
            "#,
        )
        .bind(&entry.track_id)
        .bind(&entry.album_id)
        .bind(entry.path.to_string_lossy().as_ref())
        .bind(entry.quality.as_api_str())
        .bind(&entry.isrc)
        .bind(&entry.title)
        .bind(&entry.artist)
        .bind(&entry.album_title)
        .bind(Some(normalize_text(&entry.title)).filter(|k| !k.is_empty()))
        .bind(&entry.file_hash)
        .bind(&completed_at)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;
        if inserted {
            tracing::debug!(track_id = %entry.track_id, album_id = %entry.album_id, "Recorded track");
        } else {
            tracing::debug!(track_id = %entry.track_id, "Track already recorded, left unchanged");
        }
        Ok(inserted)
    }

    /// Track ids recorded under an album.
    pub async fn entries_for_album(&self, album_id: &str) -> Result<HashSet<String>, IndexError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT track_id FROM library_entries WHERE album_id = ?")
                .bind(album_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Single entry by track id.
    pub async fn entry(&self, track_id: &str) -> Result<Option<IndexEntry>, IndexError> {
        let row: Option<EntryRow> = sqlx::query_as(&format!("{SELECT_ENTRY} WHERE track_id = ?"))
            .bind(track_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// Every album id with at least one entry, oldest activity first.
    pub async fn album_ids(&self) -> Result<Vec<String>, IndexError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT album_id FROM library_entries GROUP BY album_id \
             ORDER BY MIN(completed_at), album_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn counts(&self) -> Result<IndexCounts, IndexError> {
        let (tracks, albums): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT album_id) FROM library_entries",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(IndexCounts { tracks, albums })
    }

    /// Entries whose file no longer exists on disk.
    pub async fn missing_files(&self) -> Result<Vec<IndexEntry>, IndexError> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!("{SELECT_ENTRY} ORDER BY path"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(IndexEntry::from)
            .filter(|e| !e.path.exists())
            .collect())
    }

    /// Remove an entry. Only used by explicit maintenance commands.
    pub async fn remove(&self, track_id: &str) -> Result<bool, IndexError> {
        let result = sqlx::query("DELETE FROM library_entries WHERE track_id = ?")
            .bind(track_id)
            .execute(&self.pool)
            .await?;
        tracing::info!(track_id = %track_id, removed = result.rows_affected(), "Removed entry");
        Ok(result.rows_affected() > 0)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mock_track, new_entry, temp_index};

    #[tokio::test]
    async fn test_record_and_contains() {
        let (index, _dir) = temp_index().await;
        assert!(!index.contains("t1").await.unwrap());

        assert!(index.record(&new_entry("t1", "a1")).await.unwrap());
        assert!(index.contains("t1").await.unwrap());
    }

    #[tokio::test]
    async fn test_record_is_insert_or_ignore() {
        let (index, _dir) = temp_index().await;
        let first = new_entry("t1", "a1");
        assert!(index.record(&first).await.unwrap());

        let second = NewEntry {
            quality: Quality::Low,
            path: PathBuf::from("/elsewhere.m4a"),
            ..new_entry("t1", "a1")
        };
        assert!(!index.record(&second).await.unwrap());

        let stored = index.entry("t1").await.unwrap().unwrap();
        assert_eq!(stored.quality, Some(first.quality));
        assert_eq!(stored.path, first.path);
        assert_eq!(index.counts().await.unwrap().tracks, 1);
    }

    #[tokio::test]
    async fn test_entries_for_album() {
        let (index, _dir) = temp_index().await;
        index.record(&new_entry("t1", "a1")).await.unwrap();
        index.record(&new_entry("t2", "a1")).await.unwrap();
        index.record(&new_entry("t3", "a2")).await.unwrap();

        let ids = index.entries_for_album("a1").await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("t1") && ids.contains("t2"));

        let counts = index.counts().await.unwrap();
        assert_eq!(counts, IndexCounts { tracks: 3, albums: 2 });
        assert_eq!(index.album_ids().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_isrc_match_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        let index = LibraryIndex::open(&path, MatchMode::IdOrIsrc).await.unwrap();

        let entry = NewEntry {
            isrc: Some("USRC17607839".into()),
            ..new_entry("old-id", "a1")
        };
        index.record(&entry).await.unwrap();

        let mut reissue = mock_track("new-id", "a9", 1);
        reissue.isrc = Some("USRC17607839".into());
        assert!(index.contains_track(&reissue).await.unwrap());
        assert!(!index.contains("new-id").await.unwrap());

        let id_only = LibraryIndex::open(&path, MatchMode::Id).await.unwrap();
        assert!(!id_only.contains_track(&reissue).await.unwrap());
    }

    #[tokio::test]
    async fn test_metadata_match_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        let index = LibraryIndex::open(&path, MatchMode::IdOrMetadata).await.unwrap();
        index
            .record(&NewEntry {
                title: "Blue Monday (2015 Remaster)".into(),
                artist: "New Order".into(),
                album_title: Some("Power, Corruption & Lies".into()),
                ..new_entry("old-id", "a1")
            })
            .await
            .unwrap();

        let mut same = mock_track("new-id", "a9", 1);
        same.title = "Blue Monday".into();
        same.artists = smallvec::smallvec!["NEW ORDER".to_string()];
        same.album_title = Some("Power Corruption and Lies".into());
        // "&" vs "and" differs, so the album check fails
        assert!(!index.contains_track(&same).await.unwrap());

        same.album_title = Some("Power, Corruption & Lies (Deluxe)".into());
        assert!(index.contains_track(&same).await.unwrap());

        // No album on the candidate: artist + title is enough
        same.album_title = None;
        assert!(index.contains_track(&same).await.unwrap());

        let mut other_artist = same.clone();
        other_artist.artists = smallvec::smallvec!["Joy Division".to_string()];
        assert!(!index.contains_track(&other_artist).await.unwrap());

        let isrc_only = LibraryIndex::open(&path, MatchMode::IdOrIsrc).await.unwrap();
        assert!(!isrc_only.contains_track(&same).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_files_and_remove() {
        let (index, dir) = temp_index().await;
        let present = dir.path().join("present.flac");
        std::fs::write(&present, b"x").unwrap();

        index
            .record(&NewEntry { path: present, ..new_entry("t1", "a1") })
            .await
            .unwrap();
        index
            .record(&NewEntry { path: dir.path().join("gone.flac"), ..new_entry("t2", "a1") })
            .await
            .unwrap();

        let missing = index.missing_files().await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].track_id, "t2");

        assert!(index.remove("t2").await.unwrap());
        assert!(!index.remove("t2").await.unwrap());
        assert!(!index.contains("t2").await.unwrap());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("library.db");
        {
            let index = LibraryIndex::open(&path, MatchMode::Id).await.unwrap();
            index.record(&new_entry("t1", "a1")).await.unwrap();
            index.close().await;
        }
        let reopened = LibraryIndex::open(&path, MatchMode::Id).await.unwrap();
        assert!(reopened.contains("t1").await.unwrap());
    }
}
