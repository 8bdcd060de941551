use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::export::{self, ArtifactSink};
use crate::loader::{ChapterLoader, LoadMode, LoadResult};
use crate::model::{BatchProgress, ChapterRange, ChapterStatus};
use crate::store::ManifestStore;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BatchReport {
    pub range: ChapterRange,
    pub selected: usize,
    pub already_completed: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Nothing in the manifest fell inside the range.
    Empty,
    Cancelled { report: BatchReport },
    Exported { report: BatchReport, filename: String, location: String },
    ExportFailed { report: BatchReport, message: String },
}

/// Sequential, paced, cancellable download of a chapter range.
pub struct BatchCoordinator<'a> {
    pub store: &'a ManifestStore,
    pub loader: &'a ChapterLoader,
    pub sink: &'a dyn ArtifactSink,
    pub progress: &'a watch::Sender<Option<BatchProgress>>,
    /// Pause after each fetch before the next one starts.
    pub delay: Duration,
}

/// Clears the published progress when the job ends, however it ends.
struct ProgressGuard<'a>(&'a watch::Sender<Option<BatchProgress>>);

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(None);
    }
}

impl BatchCoordinator<'_> {
    pub async fn run(&self, range: ChapterRange, cancel: &CancellationToken) -> BatchOutcome {
        let selection = self.store.chapters_in(range);
        if selection.is_empty() {
            tracing::info!(%range, "batch range selects no chapters");
            return BatchOutcome::Empty;
        }

        let (done, to_fetch): (Vec<_>, Vec<_>) = selection
            .into_iter()
            .partition(|c| c.status == ChapterStatus::Completed);
        let already_completed = done.len();

        let mut progress = BatchProgress {
            current: already_completed,
            total: already_completed + to_fetch.len(),
            attempted: 0,
            range,
        };
        self.progress.send_replace(Some(progress));
        let guard = ProgressGuard(self.progress);

        let started_at = Utc::now();
        tracing::info!(
            %range,
            total = progress.total,
            to_fetch = to_fetch.len(),
            "batch started"
        );

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut cancelled = false;

        for (index, record) in to_fetch.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            // Waits out any fetch of this record started elsewhere, then
            // claims it only if it still needs one.
            match self
                .loader
                .load(self.store, &record.id, LoadMode::IfNeeded)
                .await
            {
                LoadResult::Missing => {
                    tracing::warn!(%range, "manifest replaced under running batch; stopping");
                    cancelled = true;
                    break;
                }
                LoadResult::Skipped(status) => {
                    if status == ChapterStatus::Completed {
                        progress.current += 1;
                        self.progress.send_replace(Some(progress));
                    }
                    continue;
                }
                LoadResult::Loaded => {
                    succeeded += 1;
                    progress.current += 1;
                }
                LoadResult::Failed => failed += 1,
            }
            progress.attempted += 1;
            self.progress.send_replace(Some(progress));

            if index + 1 < to_fetch.len() {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(self.delay) => {}
                }
            }
        }

        drop(guard);
        let cancelled = cancelled || cancel.is_cancelled();

        let report = BatchReport {
            range,
            selected: progress.total,
            already_completed,
            attempted: progress.attempted,
            succeeded,
            failed,
            started_at,
            finished_at: Utc::now(),
        };

        if cancelled {
            tracing::info!(%range, attempted = report.attempted, "batch cancelled");
            return BatchOutcome::Cancelled { report };
        }

        tracing::info!(
            %range,
            succeeded = report.succeeded,
            failed = report.failed,
            "batch finished; exporting"
        );
        let Some(manifest) = self.store.snapshot() else {
            return BatchOutcome::ExportFailed {
                report,
                message: "manifest is gone".to_owned(),
            };
        };
        let artifact = match export::compile(&manifest, range) {
            Ok(artifact) => artifact,
            Err(err) => {
                tracing::warn!(%range, error = %err, "batch export skipped");
                return BatchOutcome::ExportFailed {
                    report,
                    message: err.to_string(),
                };
            }
        };
        match self.sink.save(&artifact).await {
            Ok(location) => BatchOutcome::Exported {
                report,
                filename: artifact.filename,
                location,
            },
            Err(err) => {
                tracing::error!(%range, ?err, "saving export failed");
                BatchOutcome::ExportFailed {
                    report,
                    message: format!("{err:#}"),
                }
            }
        }
    }
}
