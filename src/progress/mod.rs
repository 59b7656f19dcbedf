//! Progress reporting.
//!
//! The executor emits one [`ProgressEvent`] per unit, in plan order, to a
//! [`ProgressReporter`] sink. [`RunReport`] aggregates the outcome of a whole
//! run for the end-of-run summary.

use std::fmt;

use crate::model::{DownloadResult, DownloadUnit, FailureKind, SkipReason};
use crate::planner::PlanningError;

/// Terminal result of one unit with its position in the plan.
#[derive(Debug, Clone)]
pub struct ProgressEvent<'a> {
    pub unit: &'a DownloadUnit,
    pub result: &'a DownloadResult,
    /// 1-based
    pub position: usize,
    pub plan_len: usize,
}

/// Sink for per-unit progress. Nothing it returns is consumed.
pub trait ProgressReporter: Send + Sync {
    /// A unit is about to start.
    fn unit_started(&self, _unit: &DownloadUnit, _position: usize, _plan_len: usize) {}

    /// A unit reached a terminal result.
    fn unit_finished(&self, event: &ProgressEvent<'_>);
}

/// Reports through `tracing`.
#[derive(Debug, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn unit_finished(&self, event: &ProgressEvent<'_>) {
        let track = &event.unit.track;
        match event.result {
            DownloadResult::Success { path, quality } => tracing::info!(
                track_id = %track.id,
                position = event.position,
                plan_len = event.plan_len,
                %quality,
                path = %path.display(),
                "Downloaded"
            ),
            DownloadResult::Skipped(reason) => tracing::info!(
                track_id = %track.id,
                position = event.position,
                plan_len = event.plan_len,
                %reason,
                "Skipped"
            ),
            DownloadResult::Failed(failure) => tracing::warn!(
                track_id = %track.id,
                position = event.position,
                plan_len = event.plan_len,
                attempts = failure.attempts,
                error = %failure.message,
                "Failed"
            ),
        }
    }
}

/// Prints `[pos/len] Artist - Title: result` lines to stdout.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn unit_started(&self, unit: &DownloadUnit, position: usize, plan_len: usize) {
        tracing::debug!(track_id = %unit.track.id, position, plan_len, "Starting");
    }

    fn unit_finished(&self, event: &ProgressEvent<'_>) {
        println!(
            "[{}/{}] {} - {}: {}",
            event.position,
            event.plan_len,
            event.unit.context.artist_name,
            event.unit.track.formatted_title(),
            event.result
        );
    }
}

/// A failed unit, with enough detail to retry by hand.
#[derive(Debug, Clone)]
pub struct FailedItem {
    pub track_id: String,
    pub album_id: String,
    pub title: String,
    pub error: String,
}

/// Summary of a run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub succeeded: usize,
    /// Omitted by the planner or skipped at execution because already indexed
    pub already_present: usize,
    pub unavailable: usize,
    pub failed: Vec<FailedItem>,
    pub planning_failures: Vec<String>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn skipped(&self) -> usize {
        self.already_present + self.unavailable
    }

    /// Count one unit result.
    pub fn record(&mut self, unit: &DownloadUnit, result: &DownloadResult) {
        match result {
            DownloadResult::Success { .. } => self.succeeded += 1,
            DownloadResult::Skipped(SkipReason::AlreadyDownloaded) => self.already_present += 1,
            DownloadResult::Skipped(SkipReason::Unavailable(_)) => self.unavailable += 1,
            DownloadResult::Failed(failure) => {
                let error = match failure.kind {
                    FailureKind::Cancelled => "cancelled".to_string(),
                    _ if failure.attempts > 1 => {
                        format!("{} (after {} attempts)", failure.message, failure.attempts)
                    }
                    _ => failure.message.clone(),
                };
                self.failed.push(FailedItem {
                    track_id: unit.track.id.clone(),
                    album_id: unit.track.album_id.clone(),
                    title: unit.track.formatted_title(),
                    error,
                });
            }
        }
    }

    pub fn add_planning_failures(&mut self, failures: &[PlanningError]) {
        self.planning_failures
            .extend(failures.iter().map(|f| f.to_string()));
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Downloaded: {}, Skipped: {} (already present: {}, unavailable: {}), Failed: {}",
            self.succeeded,
            self.skipped(),
            self.already_present,
            self.unavailable,
            self.failed.len()
        )?;
        for item in &self.failed {
            writeln!(f, "  FAILED {} ({}): {}", item.track_id, item.title, item.error)?;
        }
        for failure in &self.planning_failures {
            writeln!(f, "  NOT PLANNED {failure}")?;
        }
        if self.cancelled {
            writeln!(f, "Run was cancelled before the plan finished")?;
        }
        Ok(())
    }
}
