use tokio::sync::Semaphore;

use crate::model::ChapterStatus;
use crate::oracle::ContentOracleClient;
use crate::store::ManifestStore;

/// Which records a load may claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Only `pending` or `error` records (selection, batch).
    IfNeeded,
    /// Anything not already `loading` (explicit retry).
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadResult {
    Loaded,
    Failed,
    /// The record was not eligible under the mode; carries its status.
    Skipped(ChapterStatus),
    /// No manifest, or the id is not part of the live one.
    Missing,
}

/// Chapter Loader: the one place chapter text is fetched from the oracle.
///
/// Every fetch holds the single permit for its whole duration, so at most one
/// chapter request is in flight per loader and a record is only ever
/// `loading` while its holder runs.
pub struct ChapterLoader {
    client: ContentOracleClient,
    permits: Semaphore,
}

impl ChapterLoader {
    pub fn new(client: ContentOracleClient) -> Self {
        Self {
            client,
            permits: Semaphore::new(1),
        }
    }

    pub fn client(&self) -> &ContentOracleClient {
        &self.client
    }

    /// Fetches the body of chapter `id` and records the outcome in the store.
    ///
    /// Waits for any fetch already in flight, then checks eligibility and
    /// flips the record to `loading` under one store lock. Failures are
    /// written into the record; they never escape.
    pub async fn load(&self, store: &ManifestStore, id: &str, mode: LoadMode) -> LoadResult {
        let Ok(_permit) = self.permits.acquire().await else {
            return LoadResult::Missing;
        };

        let Some(novel_title) = store.novel_title() else {
            return LoadResult::Missing;
        };
        let claimed = store.update(id, |record| {
            let eligible = match mode {
                LoadMode::IfNeeded => record.needs_fetch(),
                LoadMode::Force => record.status != ChapterStatus::Loading,
            };
            if !eligible {
                return Err(record.status);
            }
            record.begin_loading();
            Ok((record.number, record.title.clone()))
        });
        let (number, title_hint) = match claimed {
            None => {
                tracing::warn!(id, "chapter is not part of the live manifest; skipping load");
                return LoadResult::Missing;
            }
            Some(Err(status)) => return LoadResult::Skipped(status),
            Some(Ok(claim)) => claim,
        };

        match self
            .client
            .resolve_chapter(&novel_title, number, &title_hint)
            .await
        {
            Ok(resolved) => {
                tracing::info!(number, title = %resolved.title, "chapter loaded");
                match store.update(id, |record| record.complete(resolved)) {
                    Some(()) => LoadResult::Loaded,
                    None => LoadResult::Missing,
                }
            }
            Err(err) => {
                tracing::warn!(number, error = %err, "chapter load failed");
                match store.update(id, |record| record.fail(err.to_string())) {
                    Some(()) => LoadResult::Failed,
                    None => LoadResult::Missing,
                }
            }
        }
    }
}
