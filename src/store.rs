use std::sync::{PoisonError, RwLock};

use crate::model::{ChapterRange, ChapterRecord, Manifest};

/// The single live manifest of a session.
///
/// Records are only ever mutated through lookup by id, one record at a time,
/// and the lock is never held across an await point. A writer holding an id
/// from a replaced manifest finds nothing and changes nothing.
#[derive(Debug, Default)]
pub struct ManifestStore {
    inner: RwLock<Option<Manifest>>,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<Manifest> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn replace(&self, manifest: Manifest) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(manifest);
    }

    pub fn novel_title(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|m| m.title.clone())
    }

    pub fn chapter(&self, id: &str) -> Option<ChapterRecord> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|m| m.chapter(id).cloned())
    }

    /// Records within `range`, ascending by number.
    pub fn chapters_in(&self, range: ChapterRange) -> Vec<ChapterRecord> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut chapters: Vec<ChapterRecord> = guard
            .as_ref()
            .map(|m| m.in_range(range).cloned().collect())
            .unwrap_or_default();
        chapters.sort_by_key(|c| c.number);
        chapters
    }

    /// Applies `f` to the record with `id`; returns its result, or `None`
    /// when no such record exists in the live manifest.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut ChapterRecord) -> R) -> Option<R> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.as_mut().and_then(|m| m.chapter_mut(id)).map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChapterStatus;

    fn manifest(n: u32) -> Manifest {
        Manifest {
            title: "Novel".to_owned(),
            author: None,
            total_chapters: n,
            chapters: (1..=n).map(|i| ChapterRecord::placeholder(i, None)).collect(),
        }
    }

    #[test]
    fn update_by_id_changes_one_record() {
        let store = ManifestStore::new();
        store.replace(manifest(3));
        let id = store.chapters_in(ChapterRange::new(2, 2))[0].id.clone();

        let updated = store.update(&id, |c| {
            c.fail("boom");
            c.number
        });
        assert_eq!(updated, Some(2));

        let snapshot = store.snapshot().unwrap();
        let statuses: Vec<_> = snapshot.chapters.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                ChapterStatus::Pending,
                ChapterStatus::Error,
                ChapterStatus::Pending
            ]
        );
    }

    #[test]
    fn ids_from_a_replaced_manifest_are_inert() {
        let store = ManifestStore::new();
        store.replace(manifest(2));
        let old_id = store.chapters_in(ChapterRange::new(1, 1))[0].id.clone();

        store.replace(manifest(2));
        assert_eq!(store.update(&old_id, |c| c.fail("late")), None);
        assert!(
            store
                .snapshot()
                .unwrap()
                .chapters
                .iter()
                .all(|c| c.status == ChapterStatus::Pending)
        );
    }

    #[test]
    fn chapters_in_sorts_and_clips_to_manifest() {
        let store = ManifestStore::new();
        assert!(store.chapters_in(ChapterRange::new(1, 5)).is_empty());

        let mut m = manifest(4);
        m.chapters.reverse();
        store.replace(m);

        let numbers: Vec<_> = store
            .chapters_in(ChapterRange::new(2, 10))
            .iter()
            .map(|c| c.number)
            .collect();
        assert_eq!(numbers, vec![2, 3, 4]);
    }
}
