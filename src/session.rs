use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchCoordinator, BatchOutcome};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::{self, ArtifactSink, ExportArtifact};
use crate::loader::{ChapterLoader, LoadMode};
use crate::manifest;
use crate::model::{BatchProgress, ChapterRange, ChapterRecord, Manifest};
use crate::oracle::{ContentOracleClient, validate_name};
use crate::store::ManifestStore;

/// Session controller: owns the live manifest and at most one batch job.
pub struct Session {
    store: ManifestStore,
    loader: ChapterLoader,
    sink: Arc<dyn ArtifactSink>,
    batch_delay: Duration,
    max_chapters: u32,
    progress: watch::Sender<Option<BatchProgress>>,
    active_batch: Mutex<Option<CancellationToken>>,
    last_outcome: Mutex<Option<BatchOutcome>>,
}

/// Releases the batch slot when the job that reserved it ends.
struct BatchSlot<'a>(&'a Session);

impl Drop for BatchSlot<'_> {
    fn drop(&mut self) {
        *self
            .0
            .active_batch
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Session {
    pub fn new(client: ContentOracleClient, sink: Arc<dyn ArtifactSink>, config: &Config) -> Self {
        Self {
            store: ManifestStore::new(),
            loader: ChapterLoader::new(client),
            sink,
            batch_delay: config.batch_delay,
            max_chapters: config.max_chapters,
            progress: watch::Sender::new(None),
            active_batch: Mutex::new(None),
            last_outcome: Mutex::new(None),
        }
    }

    /// Resolves `name` and, on success only, replaces the live manifest.
    /// A running batch is cancelled before the replacement is committed.
    pub async fn search(&self, name: &str) -> Result<Manifest> {
        let name = validate_name(name)?;
        tracing::info!(name, "search");

        let manifest = manifest::build(self.loader.client(), name, self.max_chapters).await?;
        if self.cancel_batch() {
            tracing::info!("cancelled running batch for new manifest");
        }
        self.store.replace(manifest.clone());
        Ok(manifest)
    }

    pub fn manifest(&self) -> Option<Manifest> {
        self.store.snapshot()
    }

    pub fn chapter(&self, id: &str) -> Result<ChapterRecord> {
        if !self.store.is_loaded() {
            return Err(Error::NoManifest);
        }
        self.store
            .chapter(id)
            .ok_or_else(|| Error::UnknownChapter(id.to_owned()))
    }

    /// Selecting a chapter: fetches it unless it is loading or completed.
    /// Waits behind any fetch already in flight, including a batch's.
    pub async fn open_chapter(&self, id: &str) -> Result<ChapterRecord> {
        self.chapter(id)?;
        self.loader.load(&self.store, id, LoadMode::IfNeeded).await;
        self.chapter(id)
    }

    /// User-initiated re-fetch; only an in-flight load is left alone.
    pub async fn retry_chapter(&self, id: &str) -> Result<ChapterRecord> {
        self.chapter(id)?;
        self.loader.load(&self.store, id, LoadMode::Force).await;
        self.chapter(id)
    }

    /// Runs a batch over `[start, end]` to completion on the caller's task.
    pub async fn download_range(&self, start: u32, end: u32) -> Result<BatchOutcome> {
        let token = self.reserve_batch()?;
        Ok(self.run_reserved(ChapterRange::new(start, end), token).await)
    }

    /// Like [`Session::download_range`], but on a spawned task. The slot is
    /// reserved before returning, so a second call fails immediately.
    pub fn spawn_download(
        self: &Arc<Self>,
        start: u32,
        end: u32,
    ) -> Result<JoinHandle<BatchOutcome>> {
        let token = self.reserve_batch()?;
        let session = Arc::clone(self);
        Ok(tokio::spawn(async move {
            session
                .run_reserved(ChapterRange::new(start, end), token)
                .await
        }))
    }

    fn reserve_batch(&self) -> Result<CancellationToken> {
        if !self.store.is_loaded() {
            return Err(Error::NoManifest);
        }
        let mut slot = self
            .active_batch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(Error::BatchInProgress);
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(token)
    }

    async fn run_reserved(&self, range: ChapterRange, token: CancellationToken) -> BatchOutcome {
        let _slot = BatchSlot(self);
        let coordinator = BatchCoordinator {
            store: &self.store,
            loader: &self.loader,
            sink: self.sink.as_ref(),
            progress: &self.progress,
            delay: self.batch_delay,
        };
        let outcome = coordinator.run(range, &token).await;
        *self
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(outcome.clone());
        outcome
    }

    /// Requests cooperative cancellation; returns whether a batch was running.
    pub fn cancel_batch(&self) -> bool {
        let slot = self
            .active_batch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_batch_active(&self) -> bool {
        self.active_batch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn progress(&self) -> Option<BatchProgress> {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Option<BatchProgress>> {
        self.progress.subscribe()
    }

    pub fn last_outcome(&self) -> Option<BatchOutcome> {
        self.last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Compiles the current content of `[start, end]` without fetching.
    pub fn export_range(&self, start: u32, end: u32) -> Result<ExportArtifact> {
        let manifest = self.store.snapshot().ok_or(Error::NoManifest)?;
        export::compile(&manifest, ChapterRange::new(start, end))
    }

    /// Compiles `[start, end]` and hands the artifact to the sink.
    pub async fn save_export(&self, start: u32, end: u32) -> anyhow::Result<String> {
        let artifact = self.export_range(start, end)?;
        self.sink.save(&artifact).await
    }
}
