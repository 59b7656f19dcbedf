//! Serialized execution of a plan.
//!
//! Exactly one unit is in flight at a time. For each unit:
//!
//! 1. re-check the library index (a previous unit or run may have recorded it)
//! 2. walk the quality ladder, retrying transient errors with backoff
//! 3. promote `<stem>.part` to `<stem>.<ext>` and hash it
//! 4. record the entry; only then report `Success`
//!
//! A failure to record in the index aborts the run with
//! [`Error::IndexPersistence`] before the result is reported.

use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{CancelToken, TransferApi, TransferError, TransferredFile};
use crate::error::{Error, Result, ResultExt};
use crate::index::{LibraryIndex, NewEntry, sampled_digest};
use crate::model::{DownloadResult, DownloadUnit, Failure, FailureKind, Quality, SkipReason};
use crate::organizer;
use crate::planner::Plan;
use crate::progress::{ProgressEvent, ProgressReporter, RunReport};

/// Retry settings for transient transfer errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub attempts: u32,
    /// Delay before the first retry; doubles after each
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), with up to 25% jitter.
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << (retry.saturating_sub(1)).min(16));
        let capped = exp.min(self.max_delay);
        let jitter_ms = (capped.as_millis() as u64) / 4;
        let jitter = if jitter_ms > 0 {
            rand::rng().random_range(0..=jitter_ms)
        } else {
            0
        };
        capped + Duration::from_millis(jitter)
    }
}

/// Executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub download_root: PathBuf,
    pub track_path_format: String,
    pub retry: RetryPolicy,
    pub quality_fallback: bool,
}

/// Outcome of trying one unit, before the index is touched.
enum Attempt {
    Done(TransferredFile),
    Skipped(String),
    Failed(Failure),
}

/// Runs plans one unit at a time.
pub struct TransferExecutor {
    transfer: Arc<dyn TransferApi>,
    index: LibraryIndex,
    reporter: Arc<dyn ProgressReporter>,
    config: ExecutorConfig,
    cancel: CancelToken,
}

impl TransferExecutor {
    pub fn new(
        transfer: Arc<dyn TransferApi>,
        index: LibraryIndex,
        reporter: Arc<dyn ProgressReporter>,
        config: ExecutorConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            transfer,
            index,
            reporter,
            config,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Execute a plan in order and summarize it.
    ///
    /// Stops before the next unit once cancelled. Returns an error only when
    /// the library index cannot be read or written.
    pub async fn run(&self, plan: &Plan) -> Result<RunReport> {
        let mut report = RunReport {
            already_present: plan.already_present.len(),
            ..Default::default()
        };
        report.add_planning_failures(&plan.failures);

        let plan_len = plan.units.len();
        tracing::info!(plan = %plan.label, units = plan_len, "Starting run");

        for (i, unit) in plan.units.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::info!(remaining = plan_len - i, "Cancelled before next unit");
                report.cancelled = true;
                break;
            }

            let position = i + 1;
            self.reporter.unit_started(unit, position, plan_len);
            let result = self.execute(unit).await?;

            report.record(unit, &result);
            self.reporter.unit_finished(&ProgressEvent {
                unit,
                result: &result,
                position,
                plan_len,
            });

            if matches!(&result, DownloadResult::Failed(f) if f.kind == FailureKind::Cancelled) {
                report.cancelled = true;
                break;
            }
        }

        tracing::info!(
            succeeded = report.succeeded,
            skipped = report.skipped(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "Run finished"
        );
        Ok(report)
    }

    /// Run one unit to a terminal result.
    pub async fn execute(&self, unit: &DownloadUnit) -> Result<DownloadResult> {
        let track_id = &unit.track.id;
        if self
            .index
            .contains_track(&unit.track)
            .await
            .with_context(format!("checking track {track_id}"))?
        {
            return Ok(DownloadResult::Skipped(SkipReason::AlreadyDownloaded));
        }

        let stem = organizer::track_stem(
            &self.config.download_root,
            &self.config.track_path_format,
            unit,
        );
        let part = organizer::part_path(&stem);
        if let Some(parent) = part.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(DownloadResult::Failed(Failure {
                kind: FailureKind::Permanent,
                message: format!("could not create {}: {e}", parent.display()),
                attempts: 0,
            }));
        }

        let file = match self.attempt(unit, &part).await {
            Attempt::Done(file) => file,
            Attempt::Skipped(why) => {
                organizer::discard(&part);
                return Ok(DownloadResult::Skipped(SkipReason::Unavailable(why)));
            }
            Attempt::Failed(failure) => {
                organizer::discard(&part);
                return Ok(DownloadResult::Failed(failure));
            }
        };

        let destination = organizer::with_appended_extension(&stem, file.extension());
        let file_hash = match promote_and_hash(file.temp_path.clone(), destination.clone()).await {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(track_id = %track_id, error = %e, "Failed to place file");
                return Ok(DownloadResult::Failed(Failure {
                    kind: FailureKind::Permanent,
                    message: format!("could not write {}: {e}", destination.display()),
                    attempts: 1,
                }));
            }
        };

        let entry = NewEntry {
            track_id: track_id.clone(),
            album_id: unit.track.album_id.clone(),
            path: destination.clone(),
            quality: file.quality,
            isrc: unit.track.isrc.clone(),
            title: unit.track.formatted_title(),
            artist: unit.context.artist_name.clone(),
            album_title: Some(unit.context.album_title.clone()).filter(|t| !t.is_empty()),
            file_hash: Some(file_hash),
        };
        self.index
            .record(&entry)
            .await
            .map_err(|e| Error::index_persistence(track_id.clone(), e))?;
        tracing::debug!(track_id = %track_id, bytes = file.bytes, quality = %file.quality, "Track complete");

        Ok(DownloadResult::Success {
            path: destination,
            quality: file.quality,
        })
    }

    /// Walk the quality ladder, retrying transient errors at each rung.
    async fn attempt(&self, unit: &DownloadUnit, part: &Path) -> Attempt {
        let track_id = &unit.track.id;
        let mut attempts = 0;
        let mut last_unavailable = None;

        for quality in unit
            .track
            .quality_ladder(unit.quality, self.config.quality_fallback)
        {
            let mut retry = 0;
            loop {
                attempts += 1;
                let error = match self.transfer_once(unit, quality, part).await {
                    Ok(file) => return Attempt::Done(file),
                    Err(e) => e,
                };

                match error {
                    TransferError::QualityUnavailable(_) => {
                        tracing::debug!(track_id = %track_id, %quality, "Quality unavailable, stepping down");
                        last_unavailable = Some(quality);
                        break;
                    }
                    TransferError::EntitlementDenied(why) => {
                        tracing::info!(track_id = %track_id, reason = %why, "Not entitled");
                        return Attempt::Skipped(why);
                    }
                    TransferError::Cancelled => {
                        return Attempt::Failed(Failure {
                            kind: FailureKind::Cancelled,
                            message: "cancelled".to_string(),
                            attempts,
                        });
                    }
                    e if e.is_transient() && retry < self.config.retry.attempts => {
                        retry += 1;
                        let delay = self.config.retry.delay(retry);
                        tracing::warn!(
                            track_id = %track_id,
                            attempt = retry,
                            max_attempts = self.config.retry.attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Transient error, retrying"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = self.cancel.cancelled() => {
                                return Attempt::Failed(Failure {
                                    kind: FailureKind::Cancelled,
                                    message: "cancelled".to_string(),
                                    attempts,
                                });
                            }
                        }
                    }
                    e => {
                        let kind = if e.is_transient() {
                            FailureKind::Transient
                        } else {
                            FailureKind::Permanent
                        };
                        tracing::warn!(track_id = %track_id, attempts, error = %e, "Transfer failed");
                        return Attempt::Failed(Failure {
                            kind,
                            message: e.to_string(),
                            attempts,
                        });
                    }
                }
            }
        }

        let message = match last_unavailable {
            Some(q) => format!("no quality available (lowest tried: {q})"),
            None => "no quality to try".to_string(),
        };
        Attempt::Failed(Failure {
            kind: FailureKind::Permanent,
            message,
            attempts,
        })
    }

    async fn transfer_once(
        &self,
        unit: &DownloadUnit,
        quality: Quality,
        part: &Path,
    ) -> std::result::Result<TransferredFile, TransferError> {
        tracing::debug!(track_id = %unit.track.id, %quality, "Transferring");
        let result = self
            .transfer
            .transfer(&unit.track, quality, part, &self.cancel)
            .await;
        if result.is_err() {
            organizer::discard(part);
        }
        result
    }
}

async fn promote_and_hash(temp: PathBuf, destination: PathBuf) -> std::io::Result<String> {
    tokio::task::spawn_blocking(move || place_file(&temp, &destination, sampled_digest))
        .await
        .map_err(std::io::Error::other)?
}

/// Promote `temp` to `destination` and hash the result. On failure neither
/// the temp file nor a half-placed destination is left behind.
fn place_file(
    temp: &Path,
    destination: &Path,
    digest: impl FnOnce(&Path) -> std::io::Result<String>,
) -> std::io::Result<String> {
    if let Err(e) = organizer::promote(temp, destination) {
        organizer::discard(temp);
        return Err(e);
    }
    digest(destination).inspect_err(|_| organizer::discard(destination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::traits::mocks::MockCatalog;
    use crate::model::{AlbumArtistCache, Track};
    use crate::planner::{PlannerConfig, Request, WorkPlanner};
    use crate::progress::recording::RecordingReporter;
    use crate::test_utils::{mock_album, mock_track, mock_unit, temp_index};
    use crate::transfer::traits::mocks::MockTransfer;
    use tempfile::TempDir;

    const TEMPLATE: &str = "{artist_name}/{album_name}/{track_number} - {track_title}";

    struct Harness {
        index: LibraryIndex,
        reporter: Arc<RecordingReporter>,
        transfer: Arc<MockTransfer>,
        executor: TransferExecutor,
        _index_dir: TempDir,
        root: TempDir,
    }

    async fn harness(transfer: MockTransfer, fallback: bool) -> Harness {
        let (index, index_dir) = temp_index().await;
        let root = tempfile::tempdir().unwrap();
        let reporter = Arc::new(RecordingReporter::default());
        let transfer = Arc::new(transfer);
        let config = ExecutorConfig {
            download_root: root.path().to_path_buf(),
            track_path_format: TEMPLATE.to_string(),
            retry: RetryPolicy {
                attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
            quality_fallback: fallback,
        };
        let executor = TransferExecutor::new(
            transfer.clone(),
            index.clone(),
            reporter.clone(),
            config,
            CancelToken::new(),
        );
        Harness {
            index,
            reporter,
            transfer,
            executor,
            _index_dir: index_dir,
            root,
        }
    }

    fn plan_of(tracks: Vec<Track>) -> Plan {
        Plan {
            label: "test".into(),
            units: tracks.into_iter().map(mock_unit).collect(),
            ..Default::default()
        }
    }

    fn part_files(root: &Path) -> Vec<PathBuf> {
        fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
            for entry in std::fs::read_dir(dir).unwrap().flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, out);
                } else if path.extension().is_some_and(|e| e == "part") {
                    out.push(path);
                }
            }
        }
        let mut out = Vec::new();
        walk(root, &mut out);
        out
    }

    #[tokio::test]
    async fn test_success_promotes_and_records() {
        let h = harness(MockTransfer::new(), true).await;
        let plan = plan_of(vec![mock_track("t1", "a1", 1), mock_track("t2", "a1", 2)]);

        let report = h.executor.run(&plan).await.unwrap();

        assert_eq!(report.succeeded, 2);
        let events = h.reporter.events.lock().clone();
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].2, events[0].3), (1, 2));
        assert_eq!((events[1].2, events[1].3), (2, 2));

        let entry = h.index.entry("t1").await.unwrap().unwrap();
        assert!(entry.path.exists());
        assert_eq!(entry.path.extension().unwrap(), "flac");
        assert!(entry.path.starts_with(h.root.path()));
        assert!(entry.file_hash.is_some());
        assert!(part_files(h.root.path()).is_empty());
    }

    #[tokio::test]
    async fn test_already_indexed_unit_is_skipped() {
        let h = harness(MockTransfer::new(), true).await;
        let track = mock_track("t1", "a1", 1);
        h.index
            .record(&crate::test_utils::new_entry("t1", "a1"))
            .await
            .unwrap();

        let result = h.executor.execute(&mock_unit(track)).await.unwrap();

        assert_eq!(result, DownloadResult::Skipped(SkipReason::AlreadyDownloaded));
        assert_eq!(h.transfer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let transfer = MockTransfer::new().with_errors(
            "t1",
            vec![TransferError::Timeout, TransferError::Network("reset".into())],
        );
        let h = harness(transfer, true).await;

        let result = h.executor.execute(&mock_unit(mock_track("t1", "a1", 1))).await.unwrap();

        assert!(result.is_success());
        assert_eq!(h.transfer.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_fails_without_record() {
        let transfer = MockTransfer::new().with_errors("t1", vec![TransferError::RateLimited; 10]);
        let h = harness(transfer, true).await;

        let result = h.executor.execute(&mock_unit(mock_track("t1", "a1", 1))).await.unwrap();

        match result {
            DownloadResult::Failed(f) => {
                assert_eq!(f.kind, FailureKind::Transient);
                assert_eq!(f.attempts, 4);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!h.index.contains("t1").await.unwrap());
        assert!(part_files(h.root.path()).is_empty());
    }

    #[tokio::test]
    async fn test_quality_fallback_steps_down() {
        let transfer = MockTransfer::new().with_max_quality("t1", Quality::Low);
        let h = harness(transfer, true).await;

        let result = h.executor.execute(&mock_unit(mock_track("t1", "a1", 1))).await.unwrap();

        match result {
            DownloadResult::Success { quality, .. } => assert_eq!(quality, Quality::Low),
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(
            h.transfer.calls_for("t1"),
            vec![Quality::Lossless, Quality::High, Quality::Low]
        );
        let entry = h.index.entry("t1").await.unwrap().unwrap();
        assert_eq!(entry.quality, Some(Quality::Low));
    }

    #[tokio::test]
    async fn test_quality_unavailable_without_fallback_fails() {
        let transfer = MockTransfer::new().with_max_quality("t1", Quality::Low);
        let h = harness(transfer, false).await;

        let result = h.executor.execute(&mock_unit(mock_track("t1", "a1", 1))).await.unwrap();

        assert!(matches!(result, DownloadResult::Failed(f) if f.kind == FailureKind::Permanent));
        assert_eq!(h.transfer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_entitlement_denied_is_skipped_unavailable() {
        let transfer = MockTransfer::new().with_errors(
            "t1",
            vec![TransferError::EntitlementDenied("Asset is not ready for playback".into())],
        );
        let h = harness(transfer, true).await;

        let report = h.executor.run(&plan_of(vec![mock_track("t1", "a1", 1)])).await.unwrap();

        assert_eq!(report.unavailable, 1);
        assert!(matches!(
            &h.reporter.results()[0],
            DownloadResult::Skipped(SkipReason::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_removed_track_fails_immediately() {
        let transfer = MockTransfer::new().with_errors("t1", vec![TransferError::Removed]);
        let h = harness(transfer, true).await;

        let report = h
            .executor
            .run(&plan_of(vec![mock_track("t1", "a1", 1), mock_track("t2", "a1", 2)]))
            .await
            .unwrap();

        assert_eq!(h.transfer.calls_for("t1").len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].track_id, "t1");
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_transfer_leaves_no_partial_state() {
        let transfer = MockTransfer::new().cancelling_on_call(2);
        let h = harness(transfer, true).await;
        let plan = plan_of(vec![
            mock_track("t1", "a1", 1),
            mock_track("t2", "a1", 2),
            mock_track("t3", "a1", 3),
        ]);

        let report = h.executor.run(&plan).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.succeeded, 1);
        assert_eq!(h.reporter.track_ids(), ["t1", "t2"]);
        assert!(!h.index.contains("t2").await.unwrap());
        assert!(!h.index.contains("t3").await.unwrap());
        assert!(part_files(h.root.path()).is_empty());
        assert_eq!(h.transfer.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cancel_before_run_starts_nothing() {
        let h = harness(MockTransfer::new(), true).await;
        h.executor.cancel_token().cancel();

        let report = h.executor.run(&plan_of(vec![mock_track("t1", "a1", 1)])).await.unwrap();

        assert!(report.cancelled);
        assert!(h.reporter.track_ids().is_empty());
        assert_eq!(h.transfer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_index_write_failure_aborts_without_success() {
        let h = harness(MockTransfer::new(), true).await;
        sqlx::query(
            "CREATE TRIGGER refuse_insert BEFORE INSERT ON library_entries \
             BEGIN SELECT RAISE(FAIL, 'disk full'); END",
        )
        .execute(h.index.pool())
        .await
        .unwrap();

        let plan = plan_of(vec![mock_track("t1", "a1", 1), mock_track("t2", "a1", 2)]);
        let err = h.executor.run(&plan).await.unwrap_err();

        assert!(matches!(err, Error::IndexPersistence { ref track_id, .. } if track_id == "t1"));
        assert!(err.is_fatal());
        assert!(h.reporter.track_ids().is_empty());

        // Next run re-plans the track and records it exactly once
        sqlx::query("DROP TRIGGER refuse_insert")
            .execute(h.index.pool())
            .await
            .unwrap();
        let report = h.executor.run(&plan).await.unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(h.index.counts().await.unwrap().tracks, 2);
    }

    #[tokio::test]
    async fn test_second_run_is_all_skipped() {
        let catalog = Arc::new(
            MockCatalog::new()
                .with_album(mock_album("A", "Band", 3))
                .with_album(mock_album("B", "Band", 2)),
        );
        let h = harness(MockTransfer::new(), true).await;
        let planner = WorkPlanner::new(
            catalog,
            h.index.clone(),
            AlbumArtistCache::new(),
            PlannerConfig::default(),
        );
        let request = Request::Albums {
            ids: vec!["A".into(), "B".into()],
        };

        let first = h.executor.run(&planner.plan(&request).await.unwrap()).await.unwrap();
        assert_eq!(first.succeeded, 5);

        let plan = planner.plan(&request).await.unwrap();
        let second = h.executor.run(&plan).await.unwrap();
        assert_eq!(second.succeeded, 0);
        assert_eq!(second.already_present, 5);
        assert_eq!(h.transfer.call_count(), 5);
    }

    #[tokio::test]
    async fn test_interrupted_album_resumes_first() {
        let catalog = Arc::new(
            MockCatalog::new()
                .with_album(mock_album("A", "Band", 4))
                .with_album(mock_album("B", "Band", 2)),
        );
        let h = harness(MockTransfer::new().cancelling_on_call(3), true).await;
        let planner = WorkPlanner::new(
            catalog,
            h.index.clone(),
            AlbumArtistCache::new(),
            PlannerConfig::default(),
        );

        let first = h
            .executor
            .run(&planner.plan(&Request::Albums { ids: vec!["A".into()] }).await.unwrap())
            .await
            .unwrap();
        assert!(first.cancelled);
        assert_eq!(first.succeeded, 2);

        // B requested first, but A is now Partial
        let plan = planner
            .plan(&Request::Albums {
                ids: vec!["B".into(), "A".into()],
            })
            .await
            .unwrap();
        let ids: Vec<_> = plan.units.iter().map(|u| u.track.id.as_str()).collect();
        assert_eq!(ids, ["A-3", "A-4", "B-1", "B-2"]);
    }

    #[tokio::test]
    async fn test_ladder_starts_at_best_advertised_quality() {
        let h = harness(MockTransfer::new(), true).await;
        // mock tracks advertise up to Lossless
        let unit = DownloadUnit {
            quality: Quality::HiRes,
            ..mock_unit(mock_track("t1", "a1", 1))
        };

        let result = h.executor.execute(&unit).await.unwrap();

        assert!(result.is_success());
        assert_eq!(h.transfer.calls_for("t1"), vec![Quality::Lossless]);
    }

    #[tokio::test]
    async fn test_without_fallback_requested_quality_is_tried() {
        let h = harness(MockTransfer::new(), false).await;
        let unit = DownloadUnit {
            quality: Quality::HiRes,
            ..mock_unit(mock_track("t1", "a1", 1))
        };

        h.executor.execute(&unit).await.unwrap();

        assert_eq!(h.transfer.calls_for("t1"), vec![Quality::HiRes]);
    }

    #[tokio::test]
    async fn test_success_records_album_title() {
        let h = harness(MockTransfer::new(), true).await;
        let unit = mock_unit(mock_track("t1", "a1", 1));

        h.executor.execute(&unit).await.unwrap();

        let entry = h.index.entry("t1").await.unwrap().unwrap();
        assert_eq!(entry.album_title.as_deref(), Some(unit.context.album_title.as_str()));
    }

    #[test]
    fn test_failed_hash_removes_placed_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("t1.flac.part");
        let destination = dir.path().join("album").join("t1.flac");
        std::fs::write(&temp, b"audio").unwrap();

        let err = place_file(&temp, &destination, |_| {
            Err(std::io::Error::other("read failed"))
        })
        .unwrap_err();

        assert_eq!(err.to_string(), "read failed");
        assert!(!temp.exists());
        assert!(!destination.exists());
    }

    #[test]
    fn test_failed_promote_keeps_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("missing.flac.part");
        let destination = dir.path().join("t1.flac");
        std::fs::write(&destination, b"older file").unwrap();

        assert!(place_file(&temp, &destination, sampled_digest).is_err());
        assert_eq!(std::fs::read(&destination).unwrap(), b"older file");
    }

    #[tokio::test]
    async fn test_bare_favorite_second_run_is_all_skipped() {
        let album = mock_album("A", "Band", 3);
        let favorite = album.tracks[0].clone();
        let catalog = Arc::new(
            MockCatalog::new()
                .with_album(album)
                .with_favorites(vec![favorite]),
        );
        let h = harness(MockTransfer::new(), true).await;
        let planner = WorkPlanner::new(
            catalog,
            h.index.clone(),
            AlbumArtistCache::new(),
            PlannerConfig::default(),
        );

        let first = h
            .executor
            .run(&planner.plan(&Request::Favorites).await.unwrap())
            .await
            .unwrap();
        assert_eq!(first.succeeded, 1);

        // Album A is now Partial; a bare favorite must not pull in the rest
        let plan = planner.plan(&Request::Favorites).await.unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.already_present.len(), 1);
        let second = h.executor.run(&plan).await.unwrap();
        assert_eq!(second.succeeded, 0);
        assert_eq!(h.transfer.call_count(), 1);
    }

    #[test]
    fn test_retry_delay_grows_and_is_capped() {
        let policy = RetryPolicy {
            attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        };
        let first = policy.delay(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        let second = policy.delay(2);
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(250));
        let capped = policy.delay(6);
        assert!(capped >= Duration::from_millis(300) && capped <= Duration::from_millis(375));
    }
}
